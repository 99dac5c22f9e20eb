//! rowstore - client-side table/row access over asynchronous key-ordered
//! storage.
//!
//! The crate provides a filter expression language, an access-path planner
//! (key lookup / index lookup / scan), a nested-loop left-outer join, and a
//! transaction coordinator enforcing a single active transaction per
//! connection. The storage engine itself is an external collaborator behind
//! the traits in [`engine`]; [`engine::MemoryEngine`] is a complete
//! in-process implementation.

pub mod engine;
pub mod filter;
pub mod query;
pub mod row;
pub mod table;
pub mod txn;

pub use engine::{
    EngineError, EngineResult, EngineTransaction, KeyRange, MemoryEngine, RowCursor,
    StorageEngine, TxnMode,
};
pub use filter::{matches, Filter, FilterError};
pub use query::{left_outer_join, AccessPath, Provenance, Query, QueryError, ResultSet};
pub use row::Row;
pub use table::{IndexMeta, TableMeta};
pub use txn::{BeginOptions, Connection, StoreHandle, Transaction, TxnError, TxnState};
