//! Filter parse errors.
//!
//! All malformed-filter conditions are rejected while building the filter,
//! so predicate evaluation itself never fails.

use thiserror::Error;

/// Result type for filter construction
pub type FilterResult<T> = Result<T, FilterError>;

/// Errors raised while parsing or building a filter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Operator key outside the recognized set
    #[error("Unknown filter operator '{0}'")]
    UnknownOperator(String),

    /// Top-level filter shape is not a JSON object
    #[error("Filter must be a JSON object, got {0}")]
    InvalidShape(String),

    /// `$like` / `$notLike` operand does not compile as a regular expression
    #[error("Invalid pattern '{pattern}' for {op}: {reason}")]
    InvalidPattern {
        op: &'static str,
        pattern: String,
        reason: String,
    },

    /// Operand type not accepted by the operator
    #[error("Operator '{op}' requires {expected}, got {got}")]
    InvalidOperand {
        op: &'static str,
        expected: &'static str,
        got: String,
    },
}
