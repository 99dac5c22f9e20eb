//! Nested-loop left-outer join with array aggregation.
//!
//! For bounded per-connection working sets, not bulk analytics: the loop is
//! intentionally O(|source| * |target|).

use serde_json::Value;

use crate::row::{self, Row};

/// Join-key equality. An absent column behaves as null, and null matches
/// null, mirroring the loose equality of the filter grammar.
fn join_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    row::loose_eq(a.unwrap_or(&Value::Null), b.unwrap_or(&Value::Null))
}

/// Left-outer joins two in-memory row sets.
///
/// Every source row appears in the output, in input order, as a shallow
/// copy carrying a new array field `agg_name` with every target row whose
/// `target_col` value loosely equals the source row's `source_col` value,
/// in target input order. Unmatched source rows get an empty array. Target
/// rows are copied into the aggregation, so mutating the output never
/// touches the inputs.
pub fn left_outer_join(
    source: &[Row],
    target: &[Row],
    source_col: &str,
    target_col: &str,
    agg_name: &str,
) -> Vec<Row> {
    source
        .iter()
        .map(|source_row| {
            let key = source_row.get(source_col);
            let matched: Vec<Row> = target
                .iter()
                .filter(|target_row| join_eq(key, target_row.get(target_col)))
                .cloned()
                .collect();
            let mut out = source_row.clone();
            if let Value::Object(fields) = &mut out {
                fields.insert(agg_name.to_string(), Value::Array(matched));
            }
            out
        })
        .collect()
}
