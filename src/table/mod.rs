//! Table and index metadata.
//!
//! Metadata is read from the storage engine when a connection opens and is
//! immutable for the lifetime of the handle. The planner relies on the
//! column-to-index map for O(1) "is this column indexed" checks.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata for one secondary index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Index name, unique within its table
    pub name: String,
    /// Indexed column
    pub column: String,
    /// Whether the index enforces uniqueness
    pub unique: bool,
}

impl IndexMeta {
    /// Creates index metadata
    pub fn new(name: impl Into<String>, column: impl Into<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            unique,
        }
    }
}

/// Metadata for one table (store)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    name: String,
    /// Primary-key field, absent for engines using out-of-band keys
    key_path: Option<String>,
    /// Whether the engine generates keys for rows that carry none
    auto_key: bool,
    /// Index name -> index
    indexes: HashMap<String, IndexMeta>,
    /// Indexed column -> index name
    indexed_columns: HashMap<String, String>,
}

impl TableMeta {
    /// Creates table metadata with no indexes
    pub fn new(name: impl Into<String>, key_path: Option<&str>, auto_key: bool) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.map(str::to_string),
            auto_key,
            indexes: HashMap::new(),
            indexed_columns: HashMap::new(),
        }
    }

    /// Adds an index (builder style)
    pub fn with_index(mut self, index: IndexMeta) -> Self {
        self.indexed_columns
            .insert(index.column.clone(), index.name.clone());
        self.indexes.insert(index.name.clone(), index);
        self
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary-key field, if declared
    pub fn key_path(&self) -> Option<&str> {
        self.key_path.as_deref()
    }

    /// Whether missing keys are generated by the engine
    pub fn auto_key(&self) -> bool {
        self.auto_key
    }

    /// Returns true if the field is this table's primary key
    pub fn is_key_path(&self, field: &str) -> bool {
        self.key_path.as_deref() == Some(field)
    }

    /// Looks up an index by name
    pub fn index(&self, name: &str) -> Option<&IndexMeta> {
        self.indexes.get(name)
    }

    /// Looks up the index covering a column, if any
    pub fn index_on(&self, column: &str) -> Option<&IndexMeta> {
        self.indexed_columns
            .get(column)
            .and_then(|name| self.indexes.get(name))
    }

    /// Returns true if the column has a secondary index
    pub fn is_indexed(&self, column: &str) -> bool {
        self.indexed_columns.contains_key(column)
    }

    /// Iterates over all indexes
    pub fn indexes(&self) -> impl Iterator<Item = &IndexMeta> {
        self.indexes.values()
    }
}
