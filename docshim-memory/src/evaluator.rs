//! Filter evaluation for in-memory document matching.
//!
//! This module evaluates MongoDB-style filter documents against stored documents,
//! and provides the value ordering used for sorting.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use docshim_core::driver::{DriverError, DriverResult};

/// Server code for malformed filters and operands.
pub const BAD_VALUE: i32 = 2;

/// Type-erased, comparable representation of BSON values.
///
/// This enum wraps BSON values and provides comparison operations for
/// filtering queries. It normalizes numeric types to f64 for easy comparison.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// DateTime value
    DateTime(DateTime),
    /// String value
    String(&'a str),
    /// Identifier value
    ObjectId(ObjectId),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Null, // Other types are not comparable
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
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
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the server's cross-type sort order.
    fn type_rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting: by type first, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.type_rank()
            .cmp(&other.type_rank())
            .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal))
    }
}

/// Resolves a dotted path (`a.b.0.c`) inside a document.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(elements) => elements.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Truthiness of projection flags and `$exists` operands.
pub(crate) fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(value) => *value,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// Orders two documents by a sort specification (`{ path: 1 | -1 }`).
pub(crate) fn sort_order(left: &Document, right: &Document, sort: &Document) -> Ordering {
    for (path, direction) in sort {
        let a = lookup(left, path).map(Comparable::from).unwrap_or(Comparable::Null);
        let b = lookup(right, path).map(Comparable::from).unwrap_or(Comparable::Null);

        let ordering = match direction {
            Bson::Int32(n) if *n < 0 => b.sort_cmp(&a),
            Bson::Int64(n) if *n < 0 => b.sort_cmp(&a),
            Bson::Double(n) if *n < 0.0 => b.sort_cmp(&a),
            _ => a.sort_cmp(&b),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

fn bad_value(message: String) -> DriverError {
    DriverError::new(Some(BAD_VALUE), message)
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns whether the document satisfies every clause of `filter`.
    ///
    /// # Errors
    ///
    /// Returns a [`BAD_VALUE`] error for unknown operators or malformed operands.
    pub fn evaluate(&self, filter: &Document) -> DriverResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => {
                    let mut all = true;
                    for clause in clauses(key, condition)? {
                        if !self.evaluate(clause)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                "$or" => self.any(clauses(key, condition)?)?,
                "$nor" => !self.any(clauses(key, condition)?)?,
                operator if operator.starts_with('$') => {
                    return Err(bad_value(format!("unknown top level operator: {operator}")));
                }
                path => self.evaluate_field(path, condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn any(&self, clauses: Vec<&Document>) -> DriverResult<bool> {
        for clause in clauses {
            if self.evaluate(clause)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn evaluate_field(&self, path: &str, condition: &Bson) -> DriverResult<bool> {
        let value = lookup(self.document, path);

        match condition {
            Bson::Document(operators)
                if operators.keys().next().is_some_and(|key| key.starts_with('$')) =>
            {
                for (operator, operand) in operators {
                    if !field_operator(value, operator, operand)? {
                        return Ok(false);
                    }
                }

                Ok(true)
            }
            expected => Ok(equals(value, expected)),
        }
    }
}

fn clauses<'f>(operator: &str, condition: &'f Bson) -> DriverResult<Vec<&'f Document>> {
    match condition {
        Bson::Array(elements) if !elements.is_empty() => elements
            .iter()
            .map(|element| {
                element
                    .as_document()
                    .ok_or_else(|| bad_value(format!("{operator} argument's entries must be objects")))
            })
            .collect(),
        _ => Err(bad_value(format!("{operator} must be a nonempty array"))),
    }
}

fn field_operator(value: Option<&Bson>, operator: &str, operand: &Bson) -> DriverResult<bool> {
    Ok(match operator {
        "$eq" => equals(value, operand),
        "$ne" => !equals(value, operand),
        "$gt" => compare(value, operand, |ordering| ordering == Ordering::Greater),
        "$gte" => compare(value, operand, |ordering| ordering != Ordering::Less),
        "$lt" => compare(value, operand, |ordering| ordering == Ordering::Less),
        "$lte" => compare(value, operand, |ordering| ordering != Ordering::Greater),
        "$in" => candidates(operator, operand)?
            .iter()
            .any(|candidate| equals(value, candidate)),
        "$nin" => !candidates(operator, operand)?
            .iter()
            .any(|candidate| equals(value, candidate)),
        "$exists" => value.is_some() == truthy(operand),
        other => return Err(bad_value(format!("unknown operator: {other}"))),
    })
}

fn candidates<'o>(operator: &str, operand: &'o Bson) -> DriverResult<&'o [Bson]> {
    match operand {
        Bson::Array(elements) => Ok(elements),
        _ => Err(bad_value(format!("{operator} needs an array"))),
    }
}

/// Equality as the server applies it: a missing field equals null, and an array field
/// matches if it equals the value or any of its elements does.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    let Some(value) = value else {
        return matches!(expected, Bson::Null);
    };
    let expected = Comparable::from(expected);

    if Comparable::from(value) == expected {
        return true;
    }

    match value {
        Bson::Array(elements) => elements
            .iter()
            .any(|element| Comparable::from(element) == expected),
        _ => false,
    }
}

fn compare(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };
    let operand = Comparable::from(operand);
    let test = |candidate: &Bson| {
        Comparable::from(candidate)
            .partial_cmp(&operand)
            .is_some_and(|ordering| accept(ordering))
    };

    match value {
        Bson::Array(elements) => elements.iter().any(|element| test(element)),
        other => test(other),
    }
}
