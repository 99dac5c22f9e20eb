//! Predicate evaluation.
//!
//! Pure functions over a row and a parsed filter. Evaluation is infallible:
//! every malformed-filter condition is rejected at parse time.
//!
//! Semantics:
//! - the empty filter matches every row;
//! - a null operand matches only a *present* null field (absent fields and
//!   null are distinct);
//! - ordering operators with a null operand are always false, never errors;
//! - `$like` with a null operand degrades to equality against null;
//! - `$in` with an empty list is false, `$notIn` with an empty list is true.

use std::cmp::Ordering;

use serde_json::Value;

use crate::row::{self, Row};

use super::ast::{Filter, Matcher, Predicate};

/// Returns true if the row satisfies every predicate in the filter.
pub fn matches(row: &Row, filter: &Filter) -> bool {
    filter
        .predicates()
        .iter()
        .all(|fp| matches_field(row.get(&fp.field), &fp.predicate))
}

fn matches_field(value: Option<&Value>, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Eq(operand) => eq_match(value, operand),
        Predicate::Ne(operand) => !eq_match(value, operand),
        Predicate::Lt(operand) => cmp_match(value, operand, Ordering::is_lt),
        Predicate::Le(operand) => cmp_match(value, operand, Ordering::is_le),
        Predicate::Gt(operand) => cmp_match(value, operand, Ordering::is_gt),
        Predicate::Ge(operand) => cmp_match(value, operand, Ordering::is_ge),
        Predicate::Like(matcher) => like_match(value, matcher),
        Predicate::NotLike(matcher) => !like_match(value, matcher),
        Predicate::In(list) => list.iter().any(|operand| eq_match(value, operand)),
        Predicate::NotIn(list) => !list.iter().any(|operand| eq_match(value, operand)),
    }
}

/// Equality between a (possibly absent) field value and an operand.
///
/// Null compares by identity: a null operand matches only a present null
/// field. An absent field equals nothing the wire grammar can express.
fn eq_match(value: Option<&Value>, operand: &Value) -> bool {
    match (value, operand) {
        (None, _) => false,
        (Some(Value::Null), Value::Null) => true,
        (Some(Value::Null), _) | (Some(_), Value::Null) => false,
        (Some(actual), expected) => row::loose_eq(actual, expected),
    }
}

/// Ordering comparison. A null operand, an absent field, or an unordered
/// pair all evaluate to false.
fn cmp_match(value: Option<&Value>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    if operand.is_null() {
        return false;
    }
    let Some(actual) = value else {
        return false;
    };
    row::compare(actual, operand).is_some_and(accept)
}

fn like_match(value: Option<&Value>, matcher: &Matcher) -> bool {
    match matcher {
        Matcher::Null => eq_match(value, &Value::Null),
        Matcher::Pattern(regex) => match value {
            Some(actual) if !actual.is_null() => regex.is_match(&row::string_form(actual)),
            _ => false,
        },
    }
}
