//! Key ranges.
//!
//! A contiguous interval of keys limiting a cursor scan: exact, bounded
//! above, bounded below, or bounded on both sides. Built by the planner
//! from a single field's range-capable predicate.

use std::cmp::Ordering;

use serde_json::Value;

use super::key::compare_keys;

/// One end of a key range
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBound {
    /// Boundary key
    pub key: Value,
    /// Whether the boundary key itself is inside the range
    pub inclusive: bool,
}

/// A contiguous key interval
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyRange {
    lower: Option<RangeBound>,
    upper: Option<RangeBound>,
}

impl KeyRange {
    /// Exact-match range containing a single key
    pub fn only(key: Value) -> Self {
        Self {
            lower: Some(RangeBound {
                key: key.clone(),
                inclusive: true,
            }),
            upper: Some(RangeBound {
                key,
                inclusive: true,
            }),
        }
    }

    /// Keys >= `key`
    pub fn at_least(key: Value) -> Self {
        Self {
            lower: Some(RangeBound {
                key,
                inclusive: true,
            }),
            upper: None,
        }
    }

    /// Keys > `key`
    pub fn above(key: Value) -> Self {
        Self {
            lower: Some(RangeBound {
                key,
                inclusive: false,
            }),
            upper: None,
        }
    }

    /// Keys <= `key`
    pub fn at_most(key: Value) -> Self {
        Self {
            lower: None,
            upper: Some(RangeBound {
                key,
                inclusive: true,
            }),
        }
    }

    /// Keys < `key`
    pub fn below(key: Value) -> Self {
        Self {
            lower: None,
            upper: Some(RangeBound {
                key,
                inclusive: false,
            }),
        }
    }

    /// Lower bound, if any
    pub fn lower(&self) -> Option<&RangeBound> {
        self.lower.as_ref()
    }

    /// Upper bound, if any
    pub fn upper(&self) -> Option<&RangeBound> {
        self.upper.as_ref()
    }

    /// Returns true if the key falls inside the range.
    pub fn contains(&self, key: &Value) -> bool {
        if let Some(lower) = &self.lower {
            match compare_keys(key, &lower.key) {
                Ordering::Less => return false,
                Ordering::Equal if !lower.inclusive => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match compare_keys(key, &upper.key) {
                Ordering::Greater => return false,
                Ordering::Equal if !upper.inclusive => return false,
                _ => {}
            }
        }
        true
    }
}
