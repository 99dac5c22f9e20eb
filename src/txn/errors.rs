//! Transaction-state errors.
//!
//! These are detected synchronously when `begin` or a store lookup cannot
//! satisfy the request; storage-engine failures arrive separately through
//! the `Engine` variant and are propagated unchanged.

use thiserror::Error;

use crate::engine::{EngineError, TxnMode};

/// Result type for coordinator operations
pub type TxnResult<T> = Result<T, TxnError>;

/// Errors raised by the transaction coordinator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxnError {
    /// An explicit scope list with no stores
    #[error("Transaction scope must name at least one store")]
    EmptyScope,

    /// The active transaction's mode cannot serve the requested mode
    #[error("Cannot promote an active {active} transaction to {requested}")]
    IncompatibleModePromotion { active: TxnMode, requested: TxnMode },

    /// The active transaction's scope does not cover a requested store;
    /// names the first offending store
    #[error("Active transaction scope does not cover store '{0}'")]
    ScopeNotCovered(String),

    /// Store requested from a transaction whose scope excludes it
    #[error("Store '{0}' is not in this transaction's scope")]
    StoreNotInScope(String),

    /// Named table does not exist in the database
    #[error("Table '{0}' does not exist")]
    UnknownTable(String),

    /// Operation on a committed or aborted transaction
    #[error("Transaction is not active")]
    NotActive,

    /// Storage-engine failure, propagated as-is
    #[error(transparent)]
    Engine(#[from] EngineError),
}
