//! Filter expression tree.
//!
//! A [`Filter`] is an ordered, AND-composed list of field predicates. The
//! operator set is closed: anything outside it is rejected when the filter
//! is built, never at evaluation time.

use regex::Regex;
use serde_json::Value;

use super::errors::{FilterError, FilterResult};

/// Compiled operand of `$like` / `$notLike`.
///
/// A null operand degrades the operator to plain (in)equality against null.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Null operand; matches rows whose field is a present null
    Null,
    /// Compiled regular expression tested against the field's string form
    Pattern(Regex),
}

impl Matcher {
    /// Compiles an operand into a matcher.
    pub fn compile(op: &'static str, operand: &Value) -> FilterResult<Self> {
        if operand.is_null() {
            return Ok(Matcher::Null);
        }
        let pattern = crate::row::string_form(operand);
        let regex = Regex::new(&pattern).map_err(|e| FilterError::InvalidPattern {
            op,
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        Ok(Matcher::Pattern(regex))
    }
}

/// A single predicate applied to one field's value
#[derive(Debug, Clone)]
pub enum Predicate {
    /// `$eq` or a bare literal value
    Eq(Value),
    /// `$ne`
    Ne(Value),
    /// `$lt`
    Lt(Value),
    /// `$le`
    Le(Value),
    /// `$gt`
    Gt(Value),
    /// `$ge`
    Ge(Value),
    /// `$like`
    Like(Matcher),
    /// `$notLike`
    NotLike(Matcher),
    /// `$in`; a null operand parses as an empty list (matches nothing)
    In(Vec<Value>),
    /// `$notIn`; a null operand parses as an empty list (matches everything)
    NotIn(Vec<Value>),
}

impl Predicate {
    /// Returns the wire-level operator name
    pub fn op_name(&self) -> &'static str {
        match self {
            Predicate::Eq(_) => "$eq",
            Predicate::Ne(_) => "$ne",
            Predicate::Lt(_) => "$lt",
            Predicate::Le(_) => "$le",
            Predicate::Gt(_) => "$gt",
            Predicate::Ge(_) => "$ge",
            Predicate::Like(_) => "$like",
            Predicate::NotLike(_) => "$notLike",
            Predicate::In(_) => "$in",
            Predicate::NotIn(_) => "$notIn",
        }
    }
}

/// A predicate bound to the field it applies to
#[derive(Debug, Clone)]
pub struct FieldPredicate {
    /// Field name in the row
    pub field: String,
    /// Predicate on that field's value
    pub predicate: Predicate,
}

/// An AND-composed filter over row fields.
///
/// The empty filter matches every row. Predicate order is preserved from
/// construction; evaluation is order-insensitive but planning looks at the
/// first-appearance order of fields.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    predicates: Vec<FieldPredicate>,
}

impl Filter {
    /// Creates the empty filter (matches every row)
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias for [`Filter::new`]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if this filter has no predicates
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// All field predicates, in construction order
    pub fn predicates(&self) -> &[FieldPredicate] {
        &self.predicates
    }

    /// Distinct field names, in first-appearance order
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for fp in &self.predicates {
            if !fields.contains(&fp.field.as_str()) {
                fields.push(&fp.field);
            }
        }
        fields
    }

    /// Predicates applying to one field
    pub fn predicates_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a Predicate> {
        self.predicates
            .iter()
            .filter(move |fp| fp.field == field)
            .map(|fp| &fp.predicate)
    }

    /// Appends a predicate
    pub fn push(&mut self, field: impl Into<String>, predicate: Predicate) {
        self.predicates.push(FieldPredicate {
            field: field.into(),
            predicate,
        });
    }

    /// AND-composes two filters by concatenating their predicates
    pub fn and(mut self, other: Filter) -> Self {
        self.predicates.extend(other.predicates);
        self
    }

    // Builder-style constructors for Rust callers. The JSON wire grammar
    // goes through `Filter::parse` instead.

    /// Adds an equality predicate
    pub fn eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.push(field, Predicate::Eq(value));
        self
    }

    /// Adds an inequality predicate
    pub fn ne(mut self, field: impl Into<String>, value: Value) -> Self {
        self.push(field, Predicate::Ne(value));
        self
    }

    /// Adds a strict less-than predicate
    pub fn lt(mut self, field: impl Into<String>, value: Value) -> Self {
        self.push(field, Predicate::Lt(value));
        self
    }

    /// Adds a less-or-equal predicate
    pub fn le(mut self, field: impl Into<String>, value: Value) -> Self {
        self.push(field, Predicate::Le(value));
        self
    }

    /// Adds a strict greater-than predicate
    pub fn gt(mut self, field: impl Into<String>, value: Value) -> Self {
        self.push(field, Predicate::Gt(value));
        self
    }

    /// Adds a greater-or-equal predicate
    pub fn ge(mut self, field: impl Into<String>, value: Value) -> Self {
        self.push(field, Predicate::Ge(value));
        self
    }

    /// Adds a pattern-match predicate; fails if the pattern does not compile
    pub fn like(mut self, field: impl Into<String>, operand: Value) -> FilterResult<Self> {
        let matcher = Matcher::compile("$like", &operand)?;
        self.push(field, Predicate::Like(matcher));
        Ok(self)
    }

    /// Adds a negated pattern-match predicate
    pub fn not_like(mut self, field: impl Into<String>, operand: Value) -> FilterResult<Self> {
        let matcher = Matcher::compile("$notLike", &operand)?;
        self.push(field, Predicate::NotLike(matcher));
        Ok(self)
    }

    /// Adds a membership predicate
    pub fn is_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.push(field, Predicate::In(values));
        self
    }

    /// Adds a negated membership predicate
    pub fn not_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.push(field, Predicate::NotIn(values));
        self
    }
}
