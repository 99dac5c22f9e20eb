//! Query results.
//!
//! An immutable ordered row sequence plus provenance: how the access-path
//! planner resolved it. Row order is the engine's iteration order for key
//! and index resolutions, and stable-but-unspecified for scans.

use crate::filter::{self, Filter};
use crate::row::Row;

/// How a result set was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Full or filtered scan
    Scan,
    /// Key-path range lookup
    ByKey,
    /// Secondary-index range lookup
    ByIndex,
}

impl Provenance {
    /// Diagnostic name
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Scan => "scan",
            Provenance::ByKey => "by_key",
            Provenance::ByIndex => "by_index",
        }
    }
}

/// An immutable, ordered query result.
#[derive(Debug, Clone)]
pub struct ResultSet {
    rows: Vec<Row>,
    provenance: Provenance,
}

impl ResultSet {
    pub(crate) fn new(rows: Vec<Row>, provenance: Provenance) -> Self {
        Self { rows, provenance }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no rows matched
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in result order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Consumes the result, yielding its rows
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// First row, if any
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Iterates over the rows
    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// How the planner resolved this result
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Narrows the result in memory by re-applying the predicate evaluator.
    ///
    /// No storage-engine interaction; row order and provenance are
    /// preserved. `find` composes: narrowing by `f` then `g` equals
    /// narrowing by `f` AND `g`.
    pub fn find(&self, filter: &Filter) -> ResultSet {
        ResultSet {
            rows: self
                .rows
                .iter()
                .filter(|row| filter::matches(row, filter))
                .cloned()
                .collect(),
            provenance: self.provenance,
        }
    }
}
