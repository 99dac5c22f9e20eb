//! Wire-grammar parser for filters.
//!
//! Accepts the JSON shape `{field: literal | {$op: operand, ...}}`:
//! - a non-object operand is an implicit `$eq`;
//! - an object operand is a set of operators, all AND-ed;
//! - multiple top-level fields are AND-ed;
//! - `{}` parses to the empty filter.
//!
//! Unknown operators, non-object top levels, bad `$like` patterns, and
//! non-array `$in`/`$notIn` operands are all rejected here, so downstream
//! evaluation never fails.

use serde_json::Value;

use super::ast::{Filter, Matcher, Predicate};
use super::errors::{FilterError, FilterResult};

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parses a membership operand. A null operand becomes the empty list, which
/// makes `$in` constant-false and `$notIn` constant-true.
fn parse_membership(op: &'static str, operand: &Value) -> FilterResult<Vec<Value>> {
    match operand {
        Value::Null => Ok(Vec::new()),
        Value::Array(values) => Ok(values.clone()),
        other => Err(FilterError::InvalidOperand {
            op,
            expected: "an array or null",
            got: shape_name(other).to_string(),
        }),
    }
}

fn parse_operator(name: &str, operand: &Value) -> FilterResult<Predicate> {
    match name {
        "$eq" => Ok(Predicate::Eq(operand.clone())),
        "$ne" => Ok(Predicate::Ne(operand.clone())),
        "$lt" => Ok(Predicate::Lt(operand.clone())),
        "$le" => Ok(Predicate::Le(operand.clone())),
        "$gt" => Ok(Predicate::Gt(operand.clone())),
        "$ge" => Ok(Predicate::Ge(operand.clone())),
        "$like" => Ok(Predicate::Like(Matcher::compile("$like", operand)?)),
        "$notLike" => Ok(Predicate::NotLike(Matcher::compile("$notLike", operand)?)),
        "$in" => Ok(Predicate::In(parse_membership("$in", operand)?)),
        "$notIn" => Ok(Predicate::NotIn(parse_membership("$notIn", operand)?)),
        unknown => Err(FilterError::UnknownOperator(unknown.to_string())),
    }
}

impl Filter {
    /// Parses the JSON wire grammar into a filter.
    pub fn parse(value: &Value) -> FilterResult<Filter> {
        let Value::Object(fields) = value else {
            return Err(FilterError::InvalidShape(shape_name(value).to_string()));
        };

        let mut filter = Filter::new();
        for (field, operand) in fields {
            match operand {
                // Any object value is an operator set; there is no literal
                // equality against object values in the grammar.
                Value::Object(ops) => {
                    for (name, op_operand) in ops {
                        filter.push(field.clone(), parse_operator(name, op_operand)?);
                    }
                }
                literal => filter.push(field.clone(), Predicate::Eq(literal.clone())),
            }
        }
        Ok(filter)
    }
}
