//! Transaction coordination.
//!
//! Owns the connection's single current-transaction slot, enforces
//! mode/scope compatibility when nested calls ask for a transaction, and
//! dispatches lifecycle notifications exactly once.

mod connection;
mod errors;
mod transaction;

pub use connection::{BeginOptions, Connection};
pub use errors::{TxnError, TxnResult};
pub use transaction::{
    AbortHandler, CompleteHandler, ErrorHandler, StoreHandle, Transaction, TxnHandlers, TxnState,
};
