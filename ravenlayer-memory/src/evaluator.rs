//! Query expression evaluation for in-memory document filtering.
//!
//! This module provides the evaluation engine for parsed filter expressions,
//! enabling comparison, full-text and ordering operations on JSON documents.

use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap};

use ravenlayer_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Type-erased, comparable representation of JSON values.
///
/// It normalizes every number to f64 for easy comparison.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Bool(value) => Comparable::Bool(*value),
            Value::Number(value) => value
                .as_f64()
                .map(Comparable::Number)
                .unwrap_or(Comparable::Null),
            Value::String(value) => Comparable::String(value),
            Value::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Value::Object(map) => Comparable::Map(
                map
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl<'a> Comparable<'a> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Bool(_) => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Map(_) => 5,
        }
    }

    /// Total order used for `ORDER BY`: values of different kinds sort by kind, missing
    /// and null values first.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

/// Resolves a dot-separated path against a JSON value. Numeric segments index arrays.
pub(crate) fn get_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if !path.contains('.') {
        return document.get(path);
    }

    let mut value = document;
    for part in path.split('.') {
        match value {
            Value::Object(map) => value = map.get(part)?,
            Value::Array(arr) => value = arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        }
    }

    Some(value)
}

/// Splits text into lowercase terms on anything that is not alphanumeric.
///
/// `*` is kept inside terms so search patterns survive tokenization.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '*'))
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
}

fn collect_terms(value: &Value, terms: &mut Vec<String>) {
    match value {
        Value::String(text) => terms.extend(tokenize(text)),
        Value::Number(number) => terms.push(number.to_string()),
        Value::Bool(flag) => terms.push(flag.to_string()),
        Value::Array(items) => items.iter().for_each(|item| collect_terms(item, terms)),
        Value::Null | Value::Object(_) => {}
    }
}

/// Matches one search term against one indexed term. `*` matches any run of characters.
fn wildcard_match(pattern: &str, term: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == term;
    }

    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    let rest = parts.collect::<Vec<_>>();

    let Some(mut remaining) = term.strip_prefix(first) else {
        return false;
    };

    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };

    for part in middle {
        match remaining.find(*part) {
            Some(index) => remaining = &remaining[index + part.len()..],
            None => return false,
        }
    }

    remaining.len() >= last.len() && remaining.ends_with(last)
}

/// Case-insensitive full-text match: true if any term of `query` matches any term of
/// `field_value`.
pub(crate) fn search_matches(field_value: &Value, query: &Value) -> bool {
    let mut indexed = Vec::new();
    collect_terms(field_value, &mut indexed);

    let mut wanted = Vec::new();
    collect_terms(query, &mut wanted);

    wanted.iter().any(|pattern| {
        indexed
            .iter()
            .any(|term| wildcard_match(pattern, term))
    })
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Value,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Value) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(get_path(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Value) -> Result<Self::Output, Self::Error> {
        let Some(field_value) = get_path(self.document, field) else {
            // A missing field only satisfies inequality, as it would against null.
            return Ok(matches!(op, FieldOp::Ne) && !value.is_null());
        };

        match op {
            FieldOp::Eq => Ok(Comparable::from(field_value) == Comparable::from(value)),
            FieldOp::Ne => Ok(Comparable::from(field_value) != Comparable::from(value)),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                match Comparable::from(field_value).partial_cmp(&Comparable::from(value)) {
                    Some(ordering) => Ok(match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    }),
                    None => Ok(false),
                }
            },
            FieldOp::StartsWith => match (field_value, value) {
                (Value::String(left), Value::String(right)) => {
                    Ok(left.to_lowercase().starts_with(&right.to_lowercase()))
                },
                _ => Ok(false),
            },
            FieldOp::EndsWith => match (field_value, value) {
                (Value::String(left), Value::String(right)) => {
                    Ok(left.to_lowercase().ends_with(&right.to_lowercase()))
                },
                _ => Ok(false),
            },
            FieldOp::Search => Ok(search_matches(field_value, value)),
            FieldOp::AnyOf => match (Comparable::from(field_value), Comparable::from(value)) {
                (Comparable::Array(array), Comparable::Array(values)) => Ok(
                    values
                        .iter()
                        .any(|val| array.contains(val))
                ),
                (single_value, Comparable::Array(values)) => Ok(values.contains(&single_value)),
                (Comparable::Array(array), single_value) => Ok(array.contains(&single_value)),
                (left, right) => Ok(left == right),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn user() -> Value {
        json!({
            "name": "John Doe",
            "email": "john.doe@example.com",
            "age": 30,
            "tags": ["admin", "ops"],
            "address": { "city": "Oslo" },
        })
    }

    #[rstest]
    #[case(Expr::field("age", FieldOp::Eq, 30), true)]
    #[case(Expr::field("age", FieldOp::Eq, 30.0), true)]
    #[case(Expr::field("age", FieldOp::Gte, 30), true)]
    #[case(Expr::field("age", FieldOp::Gt, 30), false)]
    #[case(Expr::field("age", FieldOp::Lt, "40"), false)]
    #[case(Expr::field("address.city", FieldOp::Eq, "Oslo"), true)]
    #[case(Expr::field("missing", FieldOp::Eq, 1), false)]
    #[case(Expr::field("missing", FieldOp::Ne, 1), true)]
    #[case(Expr::field("tags", FieldOp::AnyOf, json!(["ops", "dev"])), true)]
    #[case(Expr::field("age", FieldOp::AnyOf, json!([1, 30])), true)]
    #[case(Expr::field("name", FieldOp::StartsWith, "john"), true)]
    #[case(Expr::field("email", FieldOp::EndsWith, ".org"), false)]
    #[case(Expr::Exists("address.city".into(), true), true)]
    #[case(Expr::field("age", FieldOp::Eq, 30).and(Expr::field("name", FieldOp::Eq, "x")), false)]
    #[case(Expr::field("age", FieldOp::Eq, 1).or(Expr::field("name", FieldOp::Eq, "John Doe")), true)]
    #[case(Expr::field("age", FieldOp::Eq, 30).not(), false)]
    fn evaluates_expressions(#[case] expr: Expr, #[case] expected: bool) {
        let document = user();

        assert_eq!(DocumentEvaluator::new(&document).evaluate(&expr).unwrap(), expected);
    }

    #[rstest]
    #[case("john", true)]
    #[case("JOHN", true)]
    #[case("jane doe", true)]
    #[case("jo*", true)]
    #[case("*oe", true)]
    #[case("j*n", true)]
    #[case("jane", false)]
    #[case("jo", false)]
    fn search_is_case_insensitive_term_matching(#[case] term: &str, #[case] expected: bool) {
        assert_eq!(search_matches(&json!("John Doe"), &json!(term)), expected);
    }

    #[test]
    fn sort_order_puts_nulls_first() {
        let values = [json!(null), json!(2), json!("a")];
        let comparables = values.iter().map(Comparable::from).collect::<Vec<_>>();

        assert_eq!(comparables[0].sort_cmp(&comparables[1]), Ordering::Less);
        assert_eq!(comparables[1].sort_cmp(&comparables[2]), Ordering::Less);
    }
}
