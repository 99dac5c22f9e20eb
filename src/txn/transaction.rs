//! Transaction handle and lifecycle dispatch.
//!
//! A [`Transaction`] wraps the engine's native transaction together with its
//! declared mode, fixed scope, and lifecycle state. Lifecycle invariants:
//! - commit, abort, and error are terminal; the state machine never leaves
//!   a terminal state;
//! - the connection's current-transaction slot is cleared before any
//!   handler runs, so a handler can immediately begin a new transaction;
//! - every registered handler fires at most once.
//!
//! Insertion failures are normalized here: a missing key is reported
//! synchronously and leaves the transaction usable, while any other `add`
//! failure (duplicate keys included) aborts the transaction and reaches the
//! caller and the error handlers exactly once.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tracing::debug;

use crate::engine::{EngineError, EngineTransaction, KeyRange, RowCursor, TxnMode};
use crate::row::Row;

use super::errors::{TxnError, TxnResult};

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Open; operations may be issued
    Active,
    /// Terminal: all buffered writes applied
    Committed,
    /// Terminal: all buffered writes discarded
    Aborted,
}

/// Completion handler
pub type CompleteHandler = Box<dyn FnOnce() + Send>;
/// Abort handler; fires on any abort, caller-initiated or not
pub type AbortHandler = Box<dyn FnOnce() + Send>;
/// Error handler; fires when an engine failure terminates the transaction
pub type ErrorHandler = Box<dyn FnOnce(&EngineError) + Send>;

/// Lifecycle handlers attached at `begin` time or later
#[derive(Default)]
pub struct TxnHandlers {
    pub on_complete: Option<CompleteHandler>,
    pub on_abort: Option<AbortHandler>,
    pub on_error: Option<ErrorHandler>,
}

impl TxnHandlers {
    /// No handlers
    pub fn none() -> Self {
        Self::default()
    }

    fn is_empty(&self) -> bool {
        self.on_complete.is_none() && self.on_abort.is_none() && self.on_error.is_none()
    }
}

/// The connection's current-transaction slot
pub(crate) type Slot = Mutex<Option<Transaction>>;

struct Lifecycle {
    state: TxnState,
    on_complete: Vec<CompleteHandler>,
    on_abort: Vec<AbortHandler>,
    on_error: Vec<ErrorHandler>,
}

struct TxnInner {
    native: Box<dyn EngineTransaction>,
    mode: TxnMode,
    scope: BTreeSet<String>,
    /// Requested-order scope, kept for diagnostics
    scope_order: Vec<String>,
    slot: Weak<Slot>,
    lifecycle: Mutex<Lifecycle>,
}

/// A shared handle to the connection's transaction.
///
/// Clones refer to the same underlying transaction; nested calls receive a
/// clone instead of a fresh transaction (see `Connection::begin`).
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TxnInner>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("mode", &self.inner.mode)
            .field("scope", &self.inner.scope_order)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn new(
        native: Box<dyn EngineTransaction>,
        mode: TxnMode,
        scope: Vec<String>,
        slot: Weak<Slot>,
        handlers: TxnHandlers,
    ) -> Self {
        let txn = Self {
            inner: Arc::new(TxnInner {
                native,
                mode,
                scope: scope.iter().cloned().collect(),
                scope_order: scope,
                slot,
                lifecycle: Mutex::new(Lifecycle {
                    state: TxnState::Active,
                    on_complete: Vec::new(),
                    on_abort: Vec::new(),
                    on_error: Vec::new(),
                }),
            }),
        };
        txn.register(handlers);
        txn
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Declared mode
    pub fn mode(&self) -> TxnMode {
        self.inner.mode
    }

    /// Fixed store scope
    pub fn scope(&self) -> &BTreeSet<String> {
        &self.inner.scope
    }

    /// Current lifecycle state
    pub fn state(&self) -> TxnState {
        self.lifecycle().state
    }

    /// Returns true if both handles refer to the same transaction
    pub fn same(&self, other: &Transaction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn ensure_active(&self) -> TxnResult<()> {
        if self.state() == TxnState::Active {
            Ok(())
        } else {
            Err(TxnError::NotActive)
        }
    }

    /// Attaches lifecycle handlers. Handlers attached to an already-terminal
    /// transaction never fire.
    pub fn register(&self, handlers: TxnHandlers) {
        if handlers.is_empty() {
            return;
        }
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != TxnState::Active {
            return;
        }
        if let Some(handler) = handlers.on_complete {
            lifecycle.on_complete.push(handler);
        }
        if let Some(handler) = handlers.on_abort {
            lifecycle.on_abort.push(handler);
        }
        if let Some(handler) = handlers.on_error {
            lifecycle.on_error.push(handler);
        }
    }

    /// Attaches a completion handler
    pub fn on_complete(&self, handler: impl FnOnce() + Send + 'static) {
        self.register(TxnHandlers {
            on_complete: Some(Box::new(handler)),
            ..TxnHandlers::none()
        });
    }

    /// Attaches an abort handler
    pub fn on_abort(&self, handler: impl FnOnce() + Send + 'static) {
        self.register(TxnHandlers {
            on_abort: Some(Box::new(handler)),
            ..TxnHandlers::none()
        });
    }

    /// Attaches an error handler
    pub fn on_error(&self, handler: impl FnOnce(&EngineError) + Send + 'static) {
        self.register(TxnHandlers {
            on_error: Some(Box::new(handler)),
            ..TxnHandlers::none()
        });
    }

    /// Obtains a handle to a store in this transaction's scope.
    ///
    /// Valid only while the transaction is active. Schema-change
    /// transactions cover every store; other modes are held to their
    /// declared scope.
    pub fn store(&self, name: &str) -> TxnResult<StoreHandle> {
        self.ensure_active()?;
        if self.inner.mode != TxnMode::VersionChange && !self.inner.scope.contains(name) {
            return Err(TxnError::StoreNotInScope(name.to_string()));
        }
        Ok(StoreHandle {
            txn: self.clone(),
            name: name.to_string(),
        })
    }

    /// Commits the transaction and dispatches completion handlers.
    pub async fn commit(&self) -> TxnResult<()> {
        self.ensure_active()?;
        match self.inner.native.commit().await {
            Ok(()) => {
                debug!(mode = %self.inner.mode, scope = ?self.inner.scope_order, "transaction committed");
                self.resolve(TxnState::Committed, None);
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, "commit failed, transaction aborted");
                self.resolve(TxnState::Aborted, Some(&err));
                Err(err.into())
            }
        }
    }

    /// Aborts the transaction and dispatches abort handlers.
    pub async fn abort(&self) -> TxnResult<()> {
        self.ensure_active()?;
        let result = self.inner.native.abort().await;
        debug!(mode = %self.inner.mode, "transaction aborted");
        self.resolve(TxnState::Aborted, None);
        result.map_err(Into::into)
    }

    /// Terminates the transaction after an engine failure, dispatching the
    /// error exactly once. If the transaction already reached a terminal
    /// state (the engine aborted it natively, or an earlier failure was
    /// already dispatched) no second report is made.
    pub(crate) async fn fail(&self, error: EngineError) -> TxnError {
        if self.state() == TxnState::Active {
            let _ = self.inner.native.abort().await;
            debug!(error = %error, "transaction aborted by engine failure");
            self.resolve(TxnState::Aborted, Some(&error));
        }
        TxnError::Engine(error)
    }

    /// Moves to a terminal state and dispatches handlers.
    ///
    /// The connection slot is cleared before any handler runs. The guard on
    /// the current state makes dispatch idempotent: a second terminal event
    /// finds the state already terminal and does nothing.
    fn resolve(&self, next: TxnState, error: Option<&EngineError>) {
        let (on_complete, on_abort, on_error) = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state != TxnState::Active {
                return;
            }
            lifecycle.state = next;
            (
                std::mem::take(&mut lifecycle.on_complete),
                std::mem::take(&mut lifecycle.on_abort),
                std::mem::take(&mut lifecycle.on_error),
            )
        };

        if let Some(slot) = self.inner.slot.upgrade() {
            let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if current.as_ref().is_some_and(|t| t.same(self)) {
                *current = None;
            }
        }

        match next {
            TxnState::Committed => {
                for handler in on_complete {
                    handler();
                }
            }
            TxnState::Aborted => {
                if let Some(err) = error {
                    for handler in on_error {
                        handler(err);
                    }
                }
                for handler in on_abort {
                    handler();
                }
            }
            TxnState::Active => unreachable!("resolve is only called with terminal states"),
        }
    }
}

/// A per-store view of an active transaction.
pub struct StoreHandle {
    txn: Transaction,
    name: String,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("name", &self.name)
            .field("txn", &self.txn)
            .finish()
    }
}

impl StoreHandle {
    /// Store name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a row by primary key
    pub async fn get(&self, key: &Value) -> TxnResult<Option<Row>> {
        self.txn.ensure_active()?;
        Ok(self.txn.inner.native.get(&self.name, key).await?)
    }

    /// Inserts or replaces a row, returning its key
    pub async fn put(&self, row: Row) -> TxnResult<Value> {
        self.txn.ensure_active()?;
        Ok(self.txn.inner.native.put(&self.name, row).await?)
    }

    /// Inserts a row, failing on an existing key.
    ///
    /// A missing key is an argument-class failure: reported synchronously,
    /// transaction stays usable. Any other failure aborts the transaction
    /// and is reported to the caller and the error handlers exactly once.
    pub async fn add(&self, row: Row) -> TxnResult<Value> {
        self.txn.ensure_active()?;
        match self.txn.inner.native.add(&self.name, row).await {
            Ok(key) => Ok(key),
            Err(err @ EngineError::KeyRequired(_)) => Err(err.into()),
            Err(err) => Err(self.txn.fail(err).await),
        }
    }

    /// Deletes a row by primary key
    pub async fn delete(&self, key: &Value) -> TxnResult<()> {
        self.txn.ensure_active()?;
        Ok(self.txn.inner.native.delete(&self.name, key).await?)
    }

    /// Opens a forward cursor over the store's primary key order
    pub async fn open_cursor(&self, range: Option<KeyRange>) -> TxnResult<Box<dyn RowCursor>> {
        self.txn.ensure_active()?;
        Ok(self.txn.inner.native.open_cursor(&self.name, range).await?)
    }

    /// Opens a forward cursor over a secondary index
    pub async fn open_index_cursor(
        &self,
        index: &str,
        range: Option<KeyRange>,
    ) -> TxnResult<Box<dyn RowCursor>> {
        self.txn.ensure_active()?;
        Ok(self
            .txn
            .inner
            .native
            .open_index_cursor(&self.name, index, range)
            .await?)
    }
}
