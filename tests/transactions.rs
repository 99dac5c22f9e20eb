//! Transaction coordinator tests.
//!
//! Invariants covered:
//! - one active transaction per connection; nested and interleaved begins
//!   reuse it
//! - modes never promote; scopes never widen on reuse
//! - lifecycle handlers fire at most once, after the current-transaction
//!   slot is cleared
//! - a duplicate-key insert aborts the transaction and reports exactly one
//!   error; nothing from the batch commits

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rowstore::{
    BeginOptions, Connection, EngineResult, EngineTransaction, Filter, IndexMeta, MemoryEngine,
    StorageEngine, TableMeta, TxnError, TxnMode, TxnState,
};
use serde_json::json;

// =============================================================================
// Helpers
// =============================================================================

fn stores() -> MemoryEngine {
    let engine = MemoryEngine::new();
    engine
        .create_store(
            TableMeta::new("user", Some("id"), false)
                .with_index(IndexMeta::new("by_email", "email", true)),
        )
        .unwrap();
    engine
        .create_store(TableMeta::new("session", Some("sid"), false))
        .unwrap();
    engine
        .create_store(TableMeta::new("log", Some("seq"), true))
        .unwrap();
    engine
}

fn connection() -> Arc<Connection> {
    Arc::new(Connection::open(Arc::new(stores())))
}

/// Engine wrapper that suspends before opening a native transaction, forcing
/// an interleaving window between the coordinator's slot check and install.
struct SlowBeginEngine {
    inner: MemoryEngine,
}

#[async_trait]
impl StorageEngine for SlowBeginEngine {
    fn store_names(&self) -> Vec<String> {
        self.inner.store_names()
    }

    fn table_meta(&self, store: &str) -> Option<TableMeta> {
        self.inner.table_meta(store)
    }

    async fn begin_transaction(
        &self,
        scope: &[String],
        mode: TxnMode,
    ) -> EngineResult<Box<dyn EngineTransaction>> {
        tokio::task::yield_now().await;
        self.inner.begin_transaction(scope, mode).await
    }
}

// =============================================================================
// Begin / reuse
// =============================================================================

/// Defaults: readwrite over every store.
#[tokio::test]
async fn test_begin_defaults() {
    let conn = connection();
    let txn = conn.begin(BeginOptions::new()).await.unwrap();
    assert_eq!(txn.mode(), TxnMode::ReadWrite);
    assert_eq!(txn.scope().len(), 3);
    txn.store("user").unwrap();
    txn.store("session").unwrap();
    txn.commit().await.unwrap();
}

/// An explicit empty scope list is rejected synchronously.
#[tokio::test]
async fn test_empty_scope_is_an_error() {
    let conn = connection();
    let err = conn
        .begin(BeginOptions::new().with_scope(Vec::<String>::new()))
        .await
        .unwrap_err();
    assert_eq!(err, TxnError::EmptyScope);
}

/// Scoping to an unknown store is rejected before touching the engine.
#[tokio::test]
async fn test_unknown_store_in_scope() {
    let conn = connection();
    let err = conn
        .begin(BeginOptions::new().with_scope(["ghost"]))
        .await
        .unwrap_err();
    assert_eq!(err, TxnError::UnknownTable("ghost".into()));
}

/// Nested begins hand back the same transaction.
#[tokio::test]
async fn test_nested_begin_reuses_transaction() {
    let conn = connection();
    let outer = conn
        .begin(BeginOptions::read_write().with_scope(["user", "session"]))
        .await
        .unwrap();
    let inner = conn
        .begin(BeginOptions::read_only().with_scope(["user"]))
        .await
        .unwrap();
    assert!(outer.same(&inner));
    outer.commit().await.unwrap();
}

/// A readonly transaction cannot serve a readwrite request.
#[tokio::test]
async fn test_mode_promotion_rejected() {
    let conn = connection();
    let _ro = conn.begin(BeginOptions::read_only()).await.unwrap();
    let err = conn.begin(BeginOptions::read_write()).await.unwrap_err();
    assert_eq!(
        err,
        TxnError::IncompatibleModePromotion {
            active: TxnMode::ReadOnly,
            requested: TxnMode::ReadWrite,
        }
    );
}

/// Reuse requires the active scope to cover the request; the error names
/// the first store outside it.
#[tokio::test]
async fn test_scope_not_covered_names_offending_store() {
    let conn = connection();
    let _active = conn
        .begin(BeginOptions::read_only().with_scope(["user"]))
        .await
        .unwrap();
    let err = conn
        .begin(BeginOptions::read_only().with_scope(["session"]))
        .await
        .unwrap_err();
    assert_eq!(err, TxnError::ScopeNotCovered("session".into()));
}

/// Two begins interleaved across the engine's suspension point still
/// resolve to one shared transaction, and the slot holds it.
#[tokio::test]
async fn test_interleaved_begins_share_one_transaction() {
    let conn = Arc::new(Connection::open(Arc::new(SlowBeginEngine {
        inner: stores(),
    })));
    let (a, b) = tokio::join!(
        conn.begin(BeginOptions::read_write()),
        conn.begin(BeginOptions::read_write())
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.same(&b));
    assert!(conn.current_transaction().unwrap().same(&a));
    a.commit().await.unwrap();
    assert_eq!(b.state(), TxnState::Committed);
    assert!(conn.current_transaction().is_none());
}

/// An omitted scope on a nested begin asks for whatever the active
/// transaction covers; it is not expanded to every store first.
#[tokio::test]
async fn test_omitted_scope_reuses_narrow_active_transaction() {
    let conn = connection();
    let outer = conn
        .begin(BeginOptions::read_write().with_scope(["user"]))
        .await
        .unwrap();
    let inner = conn.begin(BeginOptions::new()).await.unwrap();
    assert!(outer.same(&inner));
    assert_eq!(inner.scope().len(), 1);
    outer.commit().await.unwrap();
}

/// Once the active transaction terminates, a wider one may begin.
#[tokio::test]
async fn test_fresh_transaction_after_terminal() {
    let conn = connection();
    let ro = conn.begin(BeginOptions::read_only()).await.unwrap();
    ro.commit().await.unwrap();
    let rw = conn.begin(BeginOptions::read_write()).await.unwrap();
    assert_eq!(rw.mode(), TxnMode::ReadWrite);
    rw.commit().await.unwrap();
}

// =============================================================================
// Store handles
// =============================================================================

/// Stores outside the declared scope are unreachable.
#[tokio::test]
async fn test_store_outside_scope_rejected() {
    let conn = connection();
    let txn = conn
        .begin(BeginOptions::read_write().with_scope(["user"]))
        .await
        .unwrap();
    let err = txn.store("session").unwrap_err();
    assert_eq!(err, TxnError::StoreNotInScope("session".into()));
    txn.commit().await.unwrap();
}

/// Store handles are only valid while the transaction is active.
#[tokio::test]
async fn test_store_handle_invalid_after_commit() {
    let conn = connection();
    let txn = conn.begin(BeginOptions::read_write()).await.unwrap();
    let store = txn.store("user").unwrap();
    txn.commit().await.unwrap();
    assert_eq!(txn.store("user").unwrap_err(), TxnError::NotActive);
    let err = store.get(&json!(1)).await.unwrap_err();
    assert_eq!(err, TxnError::NotActive);
}

// =============================================================================
// Lifecycle dispatch
// =============================================================================

/// Completion handlers fire exactly once, and only after the connection's
/// current-transaction slot is cleared.
#[tokio::test]
async fn test_completion_handlers_fire_once_after_slot_clears() {
    let conn = connection();
    let fired = Arc::new(AtomicUsize::new(0));
    let slot_was_clear = Arc::new(AtomicBool::new(false));

    let txn = {
        let observer = Arc::clone(&conn);
        let fired = Arc::clone(&fired);
        let slot_was_clear = Arc::clone(&slot_was_clear);
        conn.begin(BeginOptions::read_write().on_complete(move || {
            fired.fetch_add(1, Ordering::SeqCst);
            slot_was_clear.store(observer.current_transaction().is_none(), Ordering::SeqCst);
        }))
        .await
        .unwrap()
    };

    txn.commit().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(slot_was_clear.load(Ordering::SeqCst));

    // A second terminal event is rejected and dispatches nothing.
    assert_eq!(txn.commit().await.unwrap_err(), TxnError::NotActive);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

/// Handlers attached through a reusing begin fire on the shared
/// transaction's completion.
#[tokio::test]
async fn test_reuse_attaches_handlers_to_shared_transaction() {
    let conn = connection();
    let outer_fired = Arc::new(AtomicUsize::new(0));
    let inner_fired = Arc::new(AtomicUsize::new(0));

    let outer = {
        let fired = Arc::clone(&outer_fired);
        conn.begin(BeginOptions::read_write().on_complete(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        }))
        .await
        .unwrap()
    };
    {
        let fired = Arc::clone(&inner_fired);
        conn.begin(BeginOptions::read_only().on_complete(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        }))
        .await
        .unwrap()
    };

    outer.commit().await.unwrap();
    assert_eq!(outer_fired.load(Ordering::SeqCst), 1);
    assert_eq!(inner_fired.load(Ordering::SeqCst), 1);
}

/// Abort dispatches abort handlers, not completion handlers.
#[tokio::test]
async fn test_abort_dispatch() {
    let conn = connection();
    let completed = Arc::new(AtomicUsize::new(0));
    let aborted = Arc::new(AtomicUsize::new(0));

    let txn = {
        let completed = Arc::clone(&completed);
        let aborted = Arc::clone(&aborted);
        conn.begin(
            BeginOptions::read_write()
                .on_complete(move || {
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .on_abort(move || {
                    aborted.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await
        .unwrap()
    };

    txn.abort().await.unwrap();
    assert_eq!(completed.load(Ordering::SeqCst), 0);
    assert_eq!(aborted.load(Ordering::SeqCst), 1);
    assert_eq!(txn.state(), TxnState::Aborted);
    assert!(conn.current_transaction().is_none());
}

// =============================================================================
// Insertion key conflicts
// =============================================================================

/// A duplicate key aborts the transaction, reports exactly one error, and
/// commits nothing from the batch.
#[tokio::test]
async fn test_duplicate_key_batch_is_all_or_nothing() {
    let conn = connection();
    let errors = Arc::new(AtomicUsize::new(0));

    let txn = {
        let errors = Arc::clone(&errors);
        conn.begin(
            BeginOptions::read_write()
                .with_scope(["user"])
                .on_error(move |_| {
                    errors.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await
        .unwrap()
    };

    let rows = vec![
        json!({"id": 1, "email": "a@x"}),
        json!({"id": 1, "email": "b@x"}),
    ];
    let mut reported = Vec::new();
    for row in rows {
        if let Err(err) = txn.store("user").unwrap().add(row).await {
            reported.push(err);
            break;
        }
    }

    assert_eq!(reported.len(), 1);
    assert!(matches!(
        reported[0],
        TxnError::Engine(rowstore::EngineError::KeyAlreadyExists { .. })
    ));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(txn.state(), TxnState::Aborted);
    assert!(conn.current_transaction().is_none());

    // Nothing from the batch is visible afterwards.
    let count = conn.query("user").find().await.unwrap().len();
    assert_eq!(count, 0);
}

/// A missing required key is reported synchronously and leaves the
/// transaction usable.
#[tokio::test]
async fn test_missing_key_keeps_transaction_alive() {
    let conn = connection();
    let txn = conn
        .begin(BeginOptions::read_write().with_scope(["user"]))
        .await
        .unwrap();
    let store = txn.store("user").unwrap();

    let err = store.add(json!({"email": "a@x"})).await.unwrap_err();
    assert_eq!(
        err,
        TxnError::Engine(rowstore::EngineError::KeyRequired("user".into()))
    );
    assert_eq!(txn.state(), TxnState::Active);

    store.add(json!({"id": 1, "email": "a@x"})).await.unwrap();
    txn.commit().await.unwrap();
    assert_eq!(conn.query("user").find().await.unwrap().len(), 1);
}

/// A unique-index collision is an engine failure and aborts like a
/// duplicate primary key.
#[tokio::test]
async fn test_unique_index_collision_aborts() {
    let conn = connection();
    let txn = conn
        .begin(BeginOptions::read_write().with_scope(["user"]))
        .await
        .unwrap();
    let store = txn.store("user").unwrap();
    store.add(json!({"id": 1, "email": "dup@x"})).await.unwrap();
    let err = store
        .add(json!({"id": 2, "email": "dup@x"}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TxnError::Engine(rowstore::EngineError::UniqueConstraint { .. })
    ));
    assert_eq!(txn.state(), TxnState::Aborted);
    assert_eq!(conn.query("user").find().await.unwrap().len(), 0);
}

// =============================================================================
// Read-your-writes
// =============================================================================

/// Operations on one reused transaction observe earlier uncommitted writes.
#[tokio::test]
async fn test_same_transaction_read_your_writes() {
    let conn = connection();
    let txn = conn
        .begin(BeginOptions::read_write().with_scope(["user"]))
        .await
        .unwrap();
    let store = txn.store("user").unwrap();
    store.add(json!({"id": 7, "email": "g@x"})).await.unwrap();

    let row = store.get(&json!(7)).await.unwrap().unwrap();
    assert_eq!(row["email"], json!("g@x"));

    let visible = conn
        .query("user")
        .filter(Filter::new().eq("id", json!(7)))
        .find()
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);

    txn.commit().await.unwrap();
}

/// Auto-key stores assign ascending engine keys across adds.
#[tokio::test]
async fn test_auto_key_store() {
    let conn = connection();
    let txn = conn
        .begin(BeginOptions::read_write().with_scope(["log"]))
        .await
        .unwrap();
    let store = txn.store("log").unwrap();
    let k1 = store.add(json!({"msg": "a"})).await.unwrap();
    let k2 = store.add(json!({"msg": "b"})).await.unwrap();
    assert_eq!(k1, json!(1));
    assert_eq!(k2, json!(2));
    txn.commit().await.unwrap();
}
