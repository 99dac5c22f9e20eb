//! Filter expression language.
//!
//! A small operator-based grammar over row fields:
//! `$eq $ne $lt $le $gt $ge $like $notLike $in $notIn`, with bare literals
//! as implicit equality. Fields and operators are AND-composed.
//!
//! This module provides:
//! - [`Filter`] / [`Predicate`] - the parsed expression tree
//! - [`Filter::parse`] - the JSON wire-grammar parser
//! - [`matches`] - the pure row-level evaluator

mod ast;
mod errors;
mod eval;
mod parse;

pub use ast::{FieldPredicate, Filter, Matcher, Predicate};
pub use errors::{FilterError, FilterResult};
pub use eval::matches;
