// Inspectable document filters. A Filter is a pure predicate over a
// document's field data; evaluation never depends on which indexes exist.

use crate::error::{EduHubError, Result};
use crate::validation::parse_date;
use serde_json::Value;
use std::cmp::Ordering;

/// A filter expression evaluated against a document's data.
/// Field paths are dot-separated (`profile.bio`); a missing path reads
/// as null and fails every comparison except `Exists(_, false)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// Field value is one of the given values
    In(String, Vec<Value>),
    /// Array field contains at least one of the given values (set semantics)
    AnyIn(String, Vec<Value>),
    /// Substring/regex match on a string field
    Regex {
        field: String,
        pattern: String,
        case_insensitive: bool,
    },
    Exists(String, bool),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gte(field.into(), value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lte(field.into(), value.into())
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    /// Case-insensitive substring match against a string field.
    pub fn contains(field: impl Into<String>, text: &str) -> Self {
        Filter::Regex {
            field: field.into(),
            pattern: regex::escape(text),
            case_insensitive: true,
        }
    }

    /// Evaluate this filter against a document's data.
    /// A malformed regex surfaces as `InvalidQuery`.
    pub fn matches(&self, data: &Value) -> Result<bool> {
        match self {
            Filter::Eq(field, expected) => Ok(values_equal(lookup(data, field), expected)),
            Filter::Ne(field, expected) => Ok(!values_equal(lookup(data, field), expected)),
            Filter::Gt(field, bound) => Ok(matches_ordering(lookup(data, field), bound, |o| {
                o == Ordering::Greater
            })),
            Filter::Gte(field, bound) => Ok(matches_ordering(lookup(data, field), bound, |o| {
                o != Ordering::Less
            })),
            Filter::Lt(field, bound) => Ok(matches_ordering(lookup(data, field), bound, |o| {
                o == Ordering::Less
            })),
            Filter::Lte(field, bound) => Ok(matches_ordering(lookup(data, field), bound, |o| {
                o != Ordering::Greater
            })),
            Filter::In(field, values) => {
                let actual = lookup(data, field);
                Ok(values.iter().any(|v| values_equal(actual, v)))
            }
            Filter::AnyIn(field, values) => match lookup(data, field) {
                Some(Value::Array(items)) => Ok(items
                    .iter()
                    .any(|item| values.iter().any(|v| values_equal(Some(item), v)))),
                _ => Ok(false),
            },
            Filter::Regex {
                field,
                pattern,
                case_insensitive,
            } => {
                let re = regex::RegexBuilder::new(pattern)
                    .case_insensitive(*case_insensitive)
                    .build()
                    .map_err(|e| EduHubError::InvalidQuery(format!("bad regex '{pattern}': {e}")))?;
                match lookup(data, field) {
                    Some(Value::String(s)) => Ok(re.is_match(s)),
                    _ => Ok(false),
                }
            }
            Filter::Exists(field, expected) => {
                let present = lookup(data, field).map(|v| !v.is_null()).unwrap_or(false);
                Ok(present == *expected)
            }
            Filter::And(filters) => {
                for f in filters {
                    if !f.matches(data)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(filters) => {
                for f in filters {
                    if f.matches(data)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// Resolve a dot-separated field path against a JSON value.
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn matches_ordering(actual: Option<&Value>, bound: &Value, pred: impl Fn(Ordering) -> bool) -> bool {
    match actual {
        Some(v) => compare_values(v, bound).map(pred).unwrap_or(false),
        None => false,
    }
}

fn values_equal(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(v) => compare_values(v, expected) == Some(Ordering::Equal) || v == expected,
        None => expected.is_null(),
    }
}

/// Ordering between two JSON values. Numbers compare as f64, strings that
/// both parse as dates compare as instants, other strings lexicographically.
/// Cross-type comparisons yield None and thus never match.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_date(x), parse_date(y)) {
            (Some(dx), Some(dy)) => Some(dx.cmp(&dy)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}
