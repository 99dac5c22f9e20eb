//! Row representation and value comparison helpers.
//!
//! Rows are JSON objects. Field values carry the loose-equality and
//! ordering semantics of the filter grammar:
//! - numbers compare across representations (`1 == 1.0`);
//! - ordering is defined for number/number and string/string pairs only,
//!   everything else is unordered;
//! - null never orders against anything.

use std::cmp::Ordering;

use serde_json::Value;

/// A single table row. Expected to be a JSON object; non-object rows are
/// legal at the engine boundary but match no field filters.
pub type Row = Value;

/// Loose equality between two field values.
///
/// Numbers are compared by numeric value regardless of representation;
/// every other pairing falls back to structural equality.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(xf), Some(yf)) => xf == yf,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Orders two field values, if an order is defined for the pair.
///
/// Number/number pairs order numerically, string/string pairs
/// lexicographically. Mixed or non-scalar pairs have no order.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (xf, yf) = (x.as_f64()?, y.as_f64()?);
            Some(xf.total_cmp(&yf))
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// String form of a field value, used by the pattern-match operators.
pub fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
