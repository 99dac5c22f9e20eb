//! Query planning and execution.
//!
//! This module provides:
//! - [`Query`] - per-call query builder with optional filter and join
//! - [`plan`] / [`AccessPath`] - the access-path planner
//! - [`left_outer_join`] - the nested-loop join combinator
//! - [`ResultSet`] / [`Provenance`] - immutable results with access-path
//!   provenance and in-memory narrowing

mod errors;
mod executor;
mod join;
mod planner;
mod query;
mod result;

pub use errors::{QueryError, QueryResult};
pub use join::left_outer_join;
pub use planner::{plan, range_for, AccessPath};
pub use query::{JoinSpec, Query};
pub use result::{Provenance, ResultSet};
