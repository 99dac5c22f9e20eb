//! In-memory reference engine.
//!
//! `BTreeMap`-backed stores with buffered transactional writes: reads merge
//! the transaction's own buffer over the committed state (read-your-writes),
//! commit applies the whole buffer or nothing. Cursors materialize the
//! merged view at open time, so a scan observes writes issued before it was
//! opened and runs to completion regardless of later writes.
//!
//! Auto-generated keys are engine-assigned integers; the counter survives
//! aborts, matching key-ordered engines that never reuse generated keys.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::row::{self, Row};
use crate::table::TableMeta;

use super::errors::{EngineError, EngineResult};
use super::key::Key;
use super::range::KeyRange;
use super::{EngineTransaction, RowCursor, StorageEngine, TxnMode};

#[derive(Default)]
struct EngineState {
    stores: BTreeMap<String, StoreState>,
}

struct StoreState {
    meta: TableMeta,
    rows: BTreeMap<Key, Row>,
    next_auto: u64,
}

/// An in-process storage engine over ordered in-memory stores.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<EngineState>>,
}

impl MemoryEngine {
    /// Creates an engine with no stores
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from its metadata.
    pub fn create_store(&self, meta: TableMeta) -> EngineResult<()> {
        let mut state = lock(&self.state);
        let name = meta.name().to_string();
        if state.stores.contains_key(&name) {
            return Err(EngineError::Backend(format!(
                "Store '{name}' already exists"
            )));
        }
        state.stores.insert(
            name,
            StoreState {
                meta,
                rows: BTreeMap::new(),
                next_auto: 1,
            },
        );
        Ok(())
    }
}

fn lock(state: &Mutex<EngineState>) -> MutexGuard<'_, EngineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    fn store_names(&self) -> Vec<String> {
        lock(&self.state).stores.keys().cloned().collect()
    }

    fn table_meta(&self, store: &str) -> Option<TableMeta> {
        lock(&self.state).stores.get(store).map(|s| s.meta.clone())
    }

    async fn begin_transaction(
        &self,
        scope: &[String],
        mode: TxnMode,
    ) -> EngineResult<Box<dyn EngineTransaction>> {
        {
            let state = lock(&self.state);
            for store in scope {
                if !state.stores.contains_key(store) {
                    return Err(EngineError::NoSuchStore(store.clone()));
                }
            }
        }
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            scope: scope.to_vec(),
            mode,
            buffer: Mutex::new(TxnBuffer::default()),
        }))
    }
}

/// Buffered writes: key -> new row, or `None` for a pending delete
#[derive(Default)]
struct TxnBuffer {
    finished: bool,
    writes: HashMap<String, BTreeMap<Key, Option<Row>>>,
}

struct MemoryTransaction {
    state: Arc<Mutex<EngineState>>,
    scope: Vec<String>,
    mode: TxnMode,
    buffer: Mutex<TxnBuffer>,
}

impl MemoryTransaction {
    fn check_scope(&self, store: &str) -> EngineResult<()> {
        if self.scope.iter().any(|s| s == store) {
            Ok(())
        } else {
            Err(EngineError::OutOfScope(store.to_string()))
        }
    }

    fn check_write(&self) -> EngineResult<()> {
        if self.mode.is_write() {
            Ok(())
        } else {
            Err(EngineError::ReadOnly)
        }
    }

    fn lock_buffer(&self) -> MutexGuard<'_, TxnBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merged view of one store: committed rows with this transaction's
    /// buffered writes applied on top.
    fn merged(state: &EngineState, buffer: &TxnBuffer, store: &str) -> BTreeMap<Key, Row> {
        let mut rows = state
            .stores
            .get(store)
            .map(|s| s.rows.clone())
            .unwrap_or_default();
        if let Some(writes) = buffer.writes.get(store) {
            for (key, write) in writes {
                match write {
                    Some(row) => {
                        rows.insert(key.clone(), row.clone());
                    }
                    None => {
                        rows.remove(key);
                    }
                }
            }
        }
        rows
    }

    /// Resolves the primary key for an incoming row, generating one when
    /// the store does and the row carries none.
    fn resolve_key(store: &mut StoreState, row: &mut Row) -> EngineResult<Value> {
        let store_name = store.meta.name().to_string();
        match store.meta.key_path() {
            Some(path) => match row.get(path) {
                Some(key) if !key.is_null() => Ok(key.clone()),
                _ if store.meta.auto_key() => {
                    let key = Value::from(store.next_auto);
                    store.next_auto += 1;
                    let path = path.to_string();
                    if let Value::Object(map) = row {
                        map.insert(path, key.clone());
                    }
                    Ok(key)
                }
                _ => Err(EngineError::KeyRequired(store_name)),
            },
            None if store.meta.auto_key() => {
                let key = Value::from(store.next_auto);
                store.next_auto += 1;
                Ok(key)
            }
            None => Err(EngineError::KeyRequired(store_name)),
        }
    }

    /// Rejects writes that collide with a unique secondary index.
    fn check_unique(
        meta: &TableMeta,
        merged: &BTreeMap<Key, Row>,
        key: &Key,
        row: &Row,
    ) -> EngineResult<()> {
        for index in meta.indexes().filter(|i| i.unique) {
            let Some(value) = row.get(&index.column) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let collision = merged.iter().any(|(existing_key, existing)| {
                existing_key != key
                    && existing
                        .get(&index.column)
                        .is_some_and(|v| row::loose_eq(v, value))
            });
            if collision {
                return Err(EngineError::UniqueConstraint {
                    store: meta.name().to_string(),
                    index: index.name.clone(),
                    value: row::string_form(value),
                });
            }
        }
        Ok(())
    }

    fn write(&self, store: &str, mut row: Row, fail_on_existing: bool) -> EngineResult<Value> {
        self.check_scope(store)?;
        self.check_write()?;
        let mut state = lock(&self.state);
        let mut buffer = self.lock_buffer();
        if buffer.finished {
            return Err(EngineError::TransactionFinished);
        }

        if !state.stores.contains_key(store) {
            return Err(EngineError::NoSuchStore(store.to_string()));
        }
        let merged = Self::merged(&state, &buffer, store);
        let store_state = state
            .stores
            .get_mut(store)
            .ok_or_else(|| EngineError::NoSuchStore(store.to_string()))?;

        let key_value = Self::resolve_key(store_state, &mut row)?;
        let key = Key(key_value.clone());

        if fail_on_existing && merged.contains_key(&key) {
            return Err(EngineError::KeyAlreadyExists {
                store: store.to_string(),
                key: row::string_form(&key_value),
            });
        }
        Self::check_unique(&store_state.meta, &merged, &key, &row)?;

        buffer
            .writes
            .entry(store.to_string())
            .or_default()
            .insert(key, Some(row));
        Ok(key_value)
    }
}

#[async_trait]
impl EngineTransaction for MemoryTransaction {
    async fn get(&self, store: &str, key: &Value) -> EngineResult<Option<Row>> {
        self.check_scope(store)?;
        let state = lock(&self.state);
        let buffer = self.lock_buffer();
        if buffer.finished {
            return Err(EngineError::TransactionFinished);
        }
        if !state.stores.contains_key(store) {
            return Err(EngineError::NoSuchStore(store.to_string()));
        }
        let key = Key(key.clone());
        if let Some(writes) = buffer.writes.get(store) {
            if let Some(write) = writes.get(&key) {
                return Ok(write.clone());
            }
        }
        Ok(state.stores[store].rows.get(&key).cloned())
    }

    async fn put(&self, store: &str, row: Row) -> EngineResult<Value> {
        self.write(store, row, false)
    }

    async fn add(&self, store: &str, row: Row) -> EngineResult<Value> {
        self.write(store, row, true)
    }

    async fn delete(&self, store: &str, key: &Value) -> EngineResult<()> {
        self.check_scope(store)?;
        self.check_write()?;
        let state = lock(&self.state);
        let mut buffer = self.lock_buffer();
        if buffer.finished {
            return Err(EngineError::TransactionFinished);
        }
        if !state.stores.contains_key(store) {
            return Err(EngineError::NoSuchStore(store.to_string()));
        }
        buffer
            .writes
            .entry(store.to_string())
            .or_default()
            .insert(Key(key.clone()), None);
        Ok(())
    }

    async fn open_cursor(
        &self,
        store: &str,
        range: Option<KeyRange>,
    ) -> EngineResult<Box<dyn RowCursor>> {
        self.check_scope(store)?;
        let state = lock(&self.state);
        let buffer = self.lock_buffer();
        if buffer.finished {
            return Err(EngineError::TransactionFinished);
        }
        if !state.stores.contains_key(store) {
            return Err(EngineError::NoSuchStore(store.to_string()));
        }
        let rows = Self::merged(&state, &buffer, store)
            .into_iter()
            .filter(|(key, _)| range.as_ref().is_none_or(|r| r.contains(key.value())))
            .map(|(_, row)| row)
            .collect();
        Ok(Box::new(MemoryCursor { rows }))
    }

    async fn open_index_cursor(
        &self,
        store: &str,
        index: &str,
        range: Option<KeyRange>,
    ) -> EngineResult<Box<dyn RowCursor>> {
        self.check_scope(store)?;
        let state = lock(&self.state);
        let buffer = self.lock_buffer();
        if buffer.finished {
            return Err(EngineError::TransactionFinished);
        }
        let store_state = state
            .stores
            .get(store)
            .ok_or_else(|| EngineError::NoSuchStore(store.to_string()))?;
        let index_meta = store_state
            .meta
            .index(index)
            .ok_or_else(|| EngineError::NoSuchIndex {
                store: store.to_string(),
                index: index.to_string(),
            })?
            .clone();

        // Rows without the indexed column are absent from the index.
        let mut entries: Vec<(Key, Key, Row)> = Self::merged(&state, &buffer, store)
            .into_iter()
            .filter_map(|(primary, row)| {
                let value = row.get(&index_meta.column)?;
                if value.is_null() {
                    return None;
                }
                if !range.as_ref().is_none_or(|r| r.contains(value)) {
                    return None;
                }
                Some((Key(value.clone()), primary, row))
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        Ok(Box::new(MemoryCursor {
            rows: entries.into_iter().map(|(_, _, row)| row).collect(),
        }))
    }

    async fn commit(&self) -> EngineResult<()> {
        let mut state = lock(&self.state);
        let mut buffer = self.lock_buffer();
        if buffer.finished {
            return Err(EngineError::TransactionFinished);
        }
        let writes = std::mem::take(&mut buffer.writes);
        for (store, store_writes) in writes {
            let Some(store_state) = state.stores.get_mut(&store) else {
                continue;
            };
            for (key, write) in store_writes {
                match write {
                    Some(row) => {
                        store_state.rows.insert(key, row);
                    }
                    None => {
                        store_state.rows.remove(&key);
                    }
                }
            }
        }
        buffer.finished = true;
        Ok(())
    }

    async fn abort(&self) -> EngineResult<()> {
        let mut buffer = self.lock_buffer();
        if buffer.finished {
            return Err(EngineError::TransactionFinished);
        }
        buffer.writes.clear();
        buffer.finished = true;
        Ok(())
    }
}

struct MemoryCursor {
    rows: VecDeque<Row>,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    async fn advance(&mut self) -> EngineResult<Option<Row>> {
        Ok(self.rows.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::IndexMeta;
    use serde_json::json;

    fn engine() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine
            .create_store(
                TableMeta::new("user", Some("id"), false)
                    .with_index(IndexMeta::new("by_email", "email", true))
                    .with_index(IndexMeta::new("by_age", "age", false)),
            )
            .unwrap();
        engine
            .create_store(TableMeta::new("event", Some("seq"), true))
            .unwrap();
        engine
    }

    async fn drain(mut cursor: Box<dyn RowCursor>) -> Vec<Row> {
        let mut rows = Vec::new();
        while let Some(row) = cursor.advance().await.unwrap() {
            rows.push(row);
        }
        rows
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let engine = engine();
        let txn = engine
            .begin_transaction(&["user".into()], TxnMode::ReadWrite)
            .await
            .unwrap();
        let key = txn
            .add("user", json!({"id": 1, "email": "a@x", "age": 30}))
            .await
            .unwrap();
        assert_eq!(key, json!(1));
        let row = txn.get("user", &json!(1)).await.unwrap().unwrap();
        assert_eq!(row["email"], json!("a@x"));
        txn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_auto_key_assignment() {
        let engine = engine();
        let txn = engine
            .begin_transaction(&["event".into()], TxnMode::ReadWrite)
            .await
            .unwrap();
        let k1 = txn.add("event", json!({"kind": "a"})).await.unwrap();
        let k2 = txn.add("event", json!({"kind": "b"})).await.unwrap();
        assert_eq!(k1, json!(1));
        assert_eq!(k2, json!(2));
        // The generated key is written back into the row.
        let row = txn.get("event", &k1).await.unwrap().unwrap();
        assert_eq!(row["seq"], json!(1));
        txn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_without_key_is_rejected() {
        let engine = engine();
        let txn = engine
            .begin_transaction(&["user".into()], TxnMode::ReadWrite)
            .await
            .unwrap();
        let err = txn.add("user", json!({"email": "a@x"})).await.unwrap_err();
        assert_eq!(err, EngineError::KeyRequired("user".into()));
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected_within_transaction() {
        let engine = engine();
        let txn = engine
            .begin_transaction(&["user".into()], TxnMode::ReadWrite)
            .await
            .unwrap();
        txn.add("user", json!({"id": 1, "email": "a@x"})).await.unwrap();
        let err = txn
            .add("user", json!({"id": 1, "email": "b@x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::KeyAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_unique_index_enforced() {
        let engine = engine();
        let txn = engine
            .begin_transaction(&["user".into()], TxnMode::ReadWrite)
            .await
            .unwrap();
        txn.add("user", json!({"id": 1, "email": "a@x"})).await.unwrap();
        let err = txn
            .add("user", json!({"id": 2, "email": "a@x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UniqueConstraint { .. }));
        // Replacing the same row through put is not a collision.
        txn.put("user", json!({"id": 1, "email": "a@x", "age": 9}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cursor_iterates_in_key_order() {
        let engine = engine();
        let txn = engine
            .begin_transaction(&["user".into()], TxnMode::ReadWrite)
            .await
            .unwrap();
        for id in [3, 1, 2] {
            txn.add("user", json!({"id": id, "email": format!("{id}@x")}))
                .await
                .unwrap();
        }
        let rows = drain(txn.open_cursor("user", None).await.unwrap()).await;
        let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cursor_respects_range() {
        let engine = engine();
        let txn = engine
            .begin_transaction(&["user".into()], TxnMode::ReadWrite)
            .await
            .unwrap();
        for id in 1..=5 {
            txn.add("user", json!({"id": id})).await.unwrap();
        }
        let rows = drain(
            txn.open_cursor("user", Some(KeyRange::at_least(json!(4))))
                .await
                .unwrap(),
        )
        .await;
        let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_index_cursor_orders_by_index_key() {
        let engine = engine();
        let txn = engine
            .begin_transaction(&["user".into()], TxnMode::ReadWrite)
            .await
            .unwrap();
        txn.add("user", json!({"id": 1, "age": 40})).await.unwrap();
        txn.add("user", json!({"id": 2, "age": 20})).await.unwrap();
        txn.add("user", json!({"id": 3, "age": 30})).await.unwrap();
        // No indexed column: absent from the index entirely.
        txn.add("user", json!({"id": 4})).await.unwrap();
        let rows = drain(txn.open_index_cursor("user", "by_age", None).await.unwrap()).await;
        let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_read_your_writes_and_abort_discards() {
        let engine = engine();
        let txn = engine
            .begin_transaction(&["user".into()], TxnMode::ReadWrite)
            .await
            .unwrap();
        txn.add("user", json!({"id": 1})).await.unwrap();
        assert!(txn.get("user", &json!(1)).await.unwrap().is_some());
        txn.abort().await.unwrap();

        let txn = engine
            .begin_transaction(&["user".into()], TxnMode::ReadOnly)
            .await
            .unwrap();
        assert!(txn.get("user", &json!(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_is_terminal() {
        let engine = engine();
        let txn = engine
            .begin_transaction(&["user".into()], TxnMode::ReadWrite)
            .await
            .unwrap();
        txn.commit().await.unwrap();
        assert_eq!(
            txn.commit().await.unwrap_err(),
            EngineError::TransactionFinished
        );
        assert_eq!(
            txn.get("user", &json!(1)).await.unwrap_err(),
            EngineError::TransactionFinished
        );
    }

    #[tokio::test]
    async fn test_readonly_rejects_writes() {
        let engine = engine();
        let txn = engine
            .begin_transaction(&["user".into()], TxnMode::ReadOnly)
            .await
            .unwrap();
        let err = txn.add("user", json!({"id": 1})).await.unwrap_err();
        assert_eq!(err, EngineError::ReadOnly);
    }

    #[tokio::test]
    async fn test_scope_enforced() {
        let engine = engine();
        let txn = engine
            .begin_transaction(&["user".into()], TxnMode::ReadWrite)
            .await
            .unwrap();
        let err = txn.get("event", &json!(1)).await.unwrap_err();
        assert_eq!(err, EngineError::OutOfScope("event".into()));
    }

    #[tokio::test]
    async fn test_unknown_scope_store_rejected_at_begin() {
        let engine = engine();
        let err = engine
            .begin_transaction(&["ghost".into()], TxnMode::ReadOnly)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::NoSuchStore("ghost".into()));
    }
}
