//! Connection and transaction coordination.
//!
//! A connection owns at most one transaction at any instant. `begin` either
//! opens a fresh native transaction or hands back the active one when its
//! mode and scope can serve the request; nested calls therefore share a
//! single underlying transaction instead of tripping the engine's
//! no-nested-transactions rule.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::engine::{StorageEngine, TxnMode};
use crate::table::TableMeta;

use super::errors::{TxnError, TxnResult};
use super::transaction::{
    AbortHandler, CompleteHandler, ErrorHandler, Slot, Transaction, TxnHandlers, TxnState,
};

/// Options for `Connection::begin`
#[derive(Default)]
pub struct BeginOptions {
    mode: Option<TxnMode>,
    scope: Option<Vec<String>>,
    handlers: TxnHandlers,
}

impl BeginOptions {
    /// Defaults: `readwrite` over every store, no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only transaction
    pub fn read_only() -> Self {
        Self::new().with_mode(TxnMode::ReadOnly)
    }

    /// Read-write transaction
    pub fn read_write() -> Self {
        Self::new().with_mode(TxnMode::ReadWrite)
    }

    /// Sets the mode explicitly
    pub fn with_mode(mut self, mode: TxnMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Restricts the scope to the named stores.
    ///
    /// An explicit empty list is an error at `begin`; omit the scope to
    /// cover every store.
    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = Some(scope.into_iter().map(Into::into).collect());
        self
    }

    /// Attaches a completion handler
    pub fn on_complete(mut self, handler: impl FnOnce() + Send + 'static) -> Self {
        self.handlers.on_complete = Some(Box::new(handler) as CompleteHandler);
        self
    }

    /// Attaches an abort handler
    pub fn on_abort(mut self, handler: impl FnOnce() + Send + 'static) -> Self {
        self.handlers.on_abort = Some(Box::new(handler) as AbortHandler);
        self
    }

    /// Attaches an error handler
    pub fn on_error(
        mut self,
        handler: impl FnOnce(&crate::engine::EngineError) + Send + 'static,
    ) -> Self {
        self.handlers.on_error = Some(Box::new(handler) as ErrorHandler);
        self
    }
}

/// An open connection to a storage engine.
pub struct Connection {
    engine: Arc<dyn StorageEngine>,
    tables: HashMap<String, TableMeta>,
    current: Arc<Slot>,
    /// Serializes `begin` across the engine call's suspension point, so
    /// interleaved begins agree on a single transaction.
    begin_gate: AsyncMutex<()>,
}

impl Connection {
    /// Opens a connection, reading table metadata from the engine.
    pub fn open(engine: Arc<dyn StorageEngine>) -> Self {
        let mut tables = HashMap::new();
        for name in engine.store_names() {
            if let Some(meta) = engine.table_meta(&name) {
                tables.insert(name, meta);
            }
        }
        Self {
            engine,
            tables,
            current: Arc::new(Mutex::new(None)),
            begin_gate: AsyncMutex::new(()),
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Transaction>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Metadata for one table
    pub fn table(&self, name: &str) -> TxnResult<&TableMeta> {
        self.tables
            .get(name)
            .ok_or_else(|| TxnError::UnknownTable(name.to_string()))
    }

    /// Names of every table in the database
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// The active transaction, if any
    pub fn current_transaction(&self) -> Option<Transaction> {
        self.lock_current()
            .as_ref()
            .filter(|t| t.state() == TxnState::Active)
            .cloned()
    }

    /// Begins a transaction, or reuses the active one.
    ///
    /// With no active transaction: mode defaults to `readwrite`, an omitted
    /// scope covers every store, and a fresh native transaction becomes the
    /// connection's current transaction.
    ///
    /// With an active transaction: the request is served by the active
    /// transaction when its mode covers the requested mode and its scope
    /// covers the requested stores (schema-change transactions cover
    /// everything); an omitted scope asks for whatever the active
    /// transaction covers. Handlers attach to the shared transaction. Modes
    /// never promote: a `readonly` transaction cannot serve a `readwrite`
    /// request.
    ///
    /// Concurrent begins on one connection are serialized, so interleaved
    /// calls resolve to a single shared transaction rather than two.
    pub async fn begin(&self, options: BeginOptions) -> TxnResult<Transaction> {
        let mode = options.mode.unwrap_or(TxnMode::ReadWrite);
        let scope = match options.scope {
            Some(scope) if scope.is_empty() => return Err(TxnError::EmptyScope),
            Some(scope) => {
                for name in &scope {
                    if !self.tables.contains_key(name) {
                        return Err(TxnError::UnknownTable(name.clone()));
                    }
                }
                Some(scope)
            }
            None => None,
        };

        // Held across the engine call below; without it two interleaved
        // begins both observe an empty slot and open two native
        // transactions.
        let _gate = self.begin_gate.lock().await;

        {
            let current = self.lock_current();
            if let Some(active) = current.as_ref().filter(|t| t.state() == TxnState::Active) {
                if !active.mode().allows(mode) {
                    return Err(TxnError::IncompatibleModePromotion {
                        active: active.mode(),
                        requested: mode,
                    });
                }
                if let Some(scope) = &scope {
                    if active.mode() != TxnMode::VersionChange {
                        if let Some(missing) = scope.iter().find(|s| !active.scope().contains(*s))
                        {
                            return Err(TxnError::ScopeNotCovered(missing.clone()));
                        }
                    }
                }
                active.register(options.handlers);
                debug!(mode = %mode, "reusing active transaction");
                return Ok(active.clone());
            }
        }

        let scope = scope.unwrap_or_else(|| self.tables.keys().cloned().collect());
        let native = self.engine.begin_transaction(&scope, mode).await?;
        let txn = Transaction::new(
            native,
            mode,
            scope,
            Arc::downgrade(&self.current),
            options.handlers,
        );
        debug!(mode = %mode, scope = ?txn.scope(), "began transaction");
        *self.lock_current() = Some(txn.clone());
        Ok(txn)
    }
}
