//! Storage-engine errors.
//!
//! Raised by engine implementations and propagated to callers unchanged;
//! this layer never reinterprets them. `KeyAlreadyExists` and `KeyRequired`
//! are distinguished because insertion handles them differently: a missing
//! key is reported synchronously and leaves the transaction usable, a
//! duplicate key aborts the transaction.

use thiserror::Error;

/// Result type for storage-engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced at the storage-engine boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Named store does not exist in the database
    #[error("Store '{0}' does not exist")]
    NoSuchStore(String),

    /// Named index does not exist on the store
    #[error("Index '{index}' does not exist on store '{store}'")]
    NoSuchIndex { store: String, index: String },

    /// Insert collided with an existing primary key
    #[error("A row with key {key} already exists in store '{store}'")]
    KeyAlreadyExists { store: String, key: String },

    /// Row carries no key and the store neither declares a key path that
    /// resolves nor generates keys
    #[error("Store '{0}' requires a key and the row provides none")]
    KeyRequired(String),

    /// Write collided with a unique secondary index
    #[error("Unique index '{index}' on store '{store}' already contains {value}")]
    UniqueConstraint {
        store: String,
        index: String,
        value: String,
    },

    /// Operation on a store outside the transaction's declared scope
    #[error("Store '{0}' is outside the transaction scope")]
    OutOfScope(String),

    /// Write attempted through a read-only transaction
    #[error("Write attempted in a read-only transaction")]
    ReadOnly,

    /// Operation on a committed or aborted transaction
    #[error("Transaction is no longer active")]
    TransactionFinished,

    /// Engine-specific failure, propagated as-is
    #[error("{0}")]
    Backend(String),
}
