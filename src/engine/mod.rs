//! Storage-engine boundary.
//!
//! The minimal surface this layer consumes from an asynchronous,
//! cursor-oriented, key-ordered storage engine:
//! - synchronous metadata introspection (store names, key paths, indexes);
//! - native transactions over a fixed store scope;
//! - forward-only cursors over primary or index key ranges;
//! - single-row get/put/add/delete, with `add` distinguishing duplicate
//!   keys from missing keys.
//!
//! All operations against an engine are suspension points; nothing blocks.
//! [`MemoryEngine`] is a complete in-process implementation used as the
//! test substrate and as an embedded backend.

mod errors;
mod key;
mod memory;
mod range;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::row::Row;
use crate::table::TableMeta;

pub use errors::{EngineError, EngineResult};
pub use key::{compare_keys, Key};
pub use memory::MemoryEngine;
pub use range::{KeyRange, RangeBound};

/// Transaction mode, ordered by strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TxnMode {
    /// Reads only
    ReadOnly,
    /// Reads and row writes
    ReadWrite,
    /// Reads, writes, and structural changes; scoped to the whole database
    VersionChange,
}

impl TxnMode {
    /// Wire-level mode name
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnMode::ReadOnly => "readonly",
            TxnMode::ReadWrite => "readwrite",
            TxnMode::VersionChange => "versionchange",
        }
    }

    /// Returns true if a transaction in this mode can serve a request for
    /// `requested`. Modes only relax: an active transaction is never
    /// promoted to a stricter mode.
    pub fn allows(&self, requested: TxnMode) -> bool {
        *self >= requested
    }

    /// Returns true if this mode permits row writes
    pub fn is_write(&self) -> bool {
        *self >= TxnMode::ReadWrite
    }
}

impl fmt::Display for TxnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A forward-only cursor over rows in key order.
#[async_trait]
pub trait RowCursor: Send {
    /// Advances to the next row; `None` when the range is exhausted.
    async fn advance(&mut self) -> EngineResult<Option<Row>>;
}

/// A native engine transaction over a fixed store scope.
///
/// Issue-order execution and read-your-writes within one transaction are
/// the engine's contract; ordering across transactions is not.
#[async_trait]
pub trait EngineTransaction: Send + Sync {
    /// Looks up a row by primary key
    async fn get(&self, store: &str, key: &Value) -> EngineResult<Option<Row>>;

    /// Inserts or replaces a row, returning its key
    async fn put(&self, store: &str, row: Row) -> EngineResult<Value>;

    /// Inserts a row, failing on an existing key, returning the new key.
    ///
    /// Failure classes: [`EngineError::KeyRequired`] when no key resolves,
    /// [`EngineError::KeyAlreadyExists`] when the key collides.
    async fn add(&self, store: &str, row: Row) -> EngineResult<Value>;

    /// Deletes a row by primary key
    async fn delete(&self, store: &str, key: &Value) -> EngineResult<()>;

    /// Opens a cursor over the store's primary key order
    async fn open_cursor(
        &self,
        store: &str,
        range: Option<KeyRange>,
    ) -> EngineResult<Box<dyn RowCursor>>;

    /// Opens a cursor over a secondary index, in (index key, primary key)
    /// order
    async fn open_index_cursor(
        &self,
        store: &str,
        index: &str,
        range: Option<KeyRange>,
    ) -> EngineResult<Box<dyn RowCursor>>;

    /// Commits buffered writes; terminal
    async fn commit(&self) -> EngineResult<()>;

    /// Discards buffered writes; terminal
    async fn abort(&self) -> EngineResult<()>;
}

impl std::fmt::Debug for dyn EngineTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EngineTransaction")
    }
}

/// An asynchronous, cursor-oriented, key-ordered storage engine.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Names of every store in the database; read from open metadata
    fn store_names(&self) -> Vec<String>;

    /// Metadata for one store; read from open metadata
    fn table_meta(&self, store: &str) -> Option<TableMeta>;

    /// Begins a native transaction over the given scope and mode
    async fn begin_transaction(
        &self,
        scope: &[String],
        mode: TxnMode,
    ) -> EngineResult<Box<dyn EngineTransaction>>;
}
