//! Access-path planning.
//!
//! Classifies a filter against a table's metadata into one of four access
//! paths, in strict order:
//! 1. no fields -> full scan;
//! 2. one field carrying a single range-capable predicate:
//!    a. the table's key path -> key-range lookup,
//!    b. an indexed column -> index-range lookup,
//!    c. anything else -> filtered scan;
//! 3. everything else (multiple fields, multiple operators on a field, or a
//!    non-range operator) -> filtered scan.
//!
//! Exactly five operators have a range representation: `$eq $lt $le $gt
//! $ge`. Falling back to a filtered scan for the rest is normal planning,
//! not error recovery, and the fallback always evaluates the query's full
//! filter.

use crate::engine::KeyRange;
use crate::filter::{Filter, Predicate};
use crate::table::TableMeta;

/// The strategy chosen to resolve a query
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPath {
    /// Cursor over the whole store
    FullScan,
    /// Cursor over a primary-key range
    KeyLookup(KeyRange),
    /// Cursor over a secondary-index range
    IndexLookup {
        /// Index name
        index: String,
        /// Range over the indexed column
        range: KeyRange,
    },
    /// Cursor over the whole store, filtered in memory
    FilteredScan,
}

impl AccessPath {
    /// Diagnostic name
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessPath::FullScan => "full_scan",
            AccessPath::KeyLookup(_) => "key_lookup",
            AccessPath::IndexLookup { .. } => "index_lookup",
            AccessPath::FilteredScan => "filtered_scan",
        }
    }
}

/// Builds the key range for a single range-capable predicate.
pub fn range_for(predicate: &Predicate) -> Option<KeyRange> {
    match predicate {
        Predicate::Eq(v) => Some(KeyRange::only(v.clone())),
        Predicate::Lt(v) => Some(KeyRange::below(v.clone())),
        Predicate::Le(v) => Some(KeyRange::at_most(v.clone())),
        Predicate::Gt(v) => Some(KeyRange::above(v.clone())),
        Predicate::Ge(v) => Some(KeyRange::at_least(v.clone())),
        _ => None,
    }
}

/// Chooses the access path for a filter against a table.
pub fn plan(table: &TableMeta, filter: &Filter) -> AccessPath {
    let fields = filter.fields();
    if fields.is_empty() {
        return AccessPath::FullScan;
    }
    if fields.len() > 1 {
        return AccessPath::FilteredScan;
    }

    let field = fields[0];
    let predicates: Vec<&Predicate> = filter.predicates_for(field).collect();
    // Multiple operators on the one field have no combined range.
    let range = match predicates.as_slice() {
        [single] => range_for(single),
        _ => None,
    };
    let Some(range) = range else {
        return AccessPath::FilteredScan;
    };

    if table.is_key_path(field) {
        return AccessPath::KeyLookup(range);
    }
    if let Some(index) = table.index_on(field) {
        return AccessPath::IndexLookup {
            index: index.name.clone(),
            range,
        };
    }
    AccessPath::FilteredScan
}
