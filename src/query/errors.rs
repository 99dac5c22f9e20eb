//! Query errors.
//!
//! The query engine adds no error vocabulary of its own: filter problems
//! surface as parse errors, everything else (unknown tables, transaction
//! state, engine failures) arrives through the coordinator unchanged.

use thiserror::Error;

use crate::filter::FilterError;
use crate::txn::TxnError;

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while planning or running a query
#[derive(Debug, Error)]
pub enum QueryError {
    /// Malformed filter
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Coordinator or storage-engine failure, propagated as-is
    #[error(transparent)]
    Txn(#[from] TxnError),
}
