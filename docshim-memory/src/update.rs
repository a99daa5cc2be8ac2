//! Update operators and projections applied to stored documents.

use bson::{Bson, Document};

use docshim_core::driver::{DriverError, DriverResult};

use crate::evaluator::{lookup, truthy};

/// Server code for malformed update documents.
pub const FAILED_TO_PARSE: i32 = 9;
/// Server code for operators applied to values of the wrong type.
pub const TYPE_MISMATCH: i32 = 14;
/// Server code for paths that cannot be created.
pub const PATH_NOT_VIABLE: i32 = 28;

/// Applies an operator update document (`$set`, `$unset`, `$inc`) in place.
///
/// # Errors
///
/// Fails with [`FAILED_TO_PARSE`] for plain fields or unknown modifiers, and with
/// [`TYPE_MISMATCH`] or [`PATH_NOT_VIABLE`] when a modifier cannot be applied.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> DriverResult<()> {
    if update.is_empty() {
        return Err(DriverError::new(Some(FAILED_TO_PARSE), "Update document must not be empty"));
    }

    for (operator, fields) in update {
        if !operator.starts_with('$') {
            return Err(DriverError::new(
                Some(FAILED_TO_PARSE),
                "Update document requires atomic operators",
            ));
        }

        let Bson::Document(fields) = fields else {
            return Err(DriverError::new(
                Some(FAILED_TO_PARSE),
                format!("Modifiers operate on fields but we found {fields} instead"),
            ));
        };

        match operator.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone())?;
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    unset_path(document, path);
                }
            }
            "$inc" => {
                for (path, amount) in fields {
                    increment(document, path, amount)?;
                }
            }
            other => {
                return Err(DriverError::new(Some(FAILED_TO_PARSE), format!("Unknown modifier: {other}")));
            }
        }
    }

    Ok(())
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> DriverResult<()> {
    match path.rsplit_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((parent, key)) => {
            container_mut(document, parent)?.insert(key, value);
        }
    }

    Ok(())
}

/// Walks to the document at `path`, creating missing levels.
fn container_mut<'a>(document: &'a mut Document, path: &str) -> DriverResult<&'a mut Document> {
    let mut current = document;

    for segment in path.split('.') {
        if !current.contains_key(segment) {
            current.insert(segment, Document::new());
        }

        current = match current.get_mut(segment) {
            Some(Bson::Document(inner)) => inner,
            _ => {
                return Err(DriverError::new(
                    Some(PATH_NOT_VIABLE),
                    format!("Cannot create field in element {{{segment}}} of path '{path}'"),
                ));
            }
        };
    }

    Ok(current)
}

fn unset_path(document: &mut Document, path: &str) {
    match path.rsplit_once('.') {
        None => {
            document.remove(path);
        }
        Some((parent, key)) => {
            if let Some(Bson::Document(parent)) = lookup_mut(document, parent) {
                parent.remove(key);
            }
        }
    }
}

fn lookup_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    let mut segments = path.split('.');
    let mut current = document.get_mut(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get_mut(segment)?,
            _ => return None,
        };
    }

    Some(current)
}

fn increment(document: &mut Document, path: &str, amount: &Bson) -> DriverResult<()> {
    if !matches!(amount, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) {
        return Err(DriverError::new(
            Some(TYPE_MISMATCH),
            format!("Cannot increment with non-numeric argument: {{{path}: {amount}}}"),
        ));
    }

    let next = match lookup(document, path) {
        None => amount.clone(),
        Some(current) => add(current, amount).ok_or_else(|| {
            DriverError::new(
                Some(TYPE_MISMATCH),
                format!("Cannot apply $inc to a value of non-numeric type at '{path}'"),
            )
        })?,
    };

    set_path(document, path, next)
}

fn add(left: &Bson, right: &Bson) -> Option<Bson> {
    let as_f64 = |value: &Bson| match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    };

    Some(match (left, right) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).checked_add(*b)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(i64::from(*b))?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b)?),
        (left, right) => Bson::Double(as_f64(left)? + as_f64(right)?),
    })
}

/// Applies a top-level projection.
///
/// A projection with any truthy field other than `_id` is an inclusion projection, which
/// keeps `_id` unless it is explicitly excluded; otherwise listed fields are removed.
pub(crate) fn project(document: Document, projection: Option<&Document>) -> Document {
    let Some(projection) = projection.filter(|projection| !projection.is_empty()) else {
        return document;
    };
    let inclusion = projection
        .iter()
        .any(|(key, value)| key != "_id" && truthy(value));

    document
        .into_iter()
        .filter(|(key, _)| match projection.get(key) {
            Some(flag) => truthy(flag),
            None => !inclusion || key == "_id",
        })
        .collect()
}
