//! Recognition, parsing and deep coercion of document identifiers.
//!
//! Identifiers are BSON [`ObjectId`]s: 12-byte values with a canonical 24 character
//! lowercase hexadecimal encoding. Payloads arriving from JSON carry identifiers as
//! plain strings, so this module provides:
//!
//! - shape checks ([`is_valid_object_id`], [`is_object_id_str`]) that never fail,
//! - strict parsing ([`parse_object_id`]) that reports [`StoreError::InvalidIdentifier`],
//! - best-effort deep coercion ([`coerce_deep`]) that rewrites every identifier-shaped
//!   string of a payload in place, whatever its field name or nesting depth.
//!
//! Detection is purely shape based: any 24 character hex string is converted, even if
//! the field semantically holds something else.

use bson::{Bson, Document, oid::ObjectId};
use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// Nesting depth past which [`coerce_deep`] stops descending.
pub const MAX_COERCION_DEPTH: usize = 64;

const OBJECT_ID_HEX_LEN: usize = 24;

/// Returns `true` if `s` is exactly 24 hexadecimal characters (either case).
pub fn is_object_id_str(s: &str) -> bool {
    s.len() == OBJECT_ID_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Returns `true` if `value` is a string holding a valid identifier encoding.
///
/// Any other BSON type, including an already typed [`ObjectId`], returns `false`.
pub fn is_valid_object_id(value: &Bson) -> bool {
    matches!(value, Bson::String(s) if is_object_id_str(s))
}

/// Returns `true` if `value` already is a typed [`ObjectId`].
pub fn is_object_id(value: &Bson) -> bool {
    matches!(value, Bson::ObjectId(_))
}

/// Converts a value to an [`ObjectId`].
///
/// Typed identifiers are returned unchanged, identifier-shaped strings are parsed.
///
/// # Errors
///
/// Returns [`StoreError::InvalidIdentifier`] carrying the offending value for anything else.
pub fn parse_object_id(value: &Bson) -> StoreResult<ObjectId> {
    match value {
        Bson::ObjectId(oid) => Ok(*oid),
        Bson::String(s) => parse_object_id_str(s),
        other => Err(StoreError::InvalidIdentifier { value: other.to_string() }),
    }
}

/// Parses the textual encoding of an identifier.
///
/// # Errors
///
/// Returns [`StoreError::InvalidIdentifier`] if `s` is not exactly 24 hex characters.
pub fn parse_object_id_str(s: &str) -> StoreResult<ObjectId> {
    if !is_object_id_str(s) {
        return Err(StoreError::InvalidIdentifier { value: s.to_string() });
    }

    ObjectId::parse_str(s).map_err(|_| StoreError::InvalidIdentifier { value: s.to_string() })
}

/// Generates a fresh identifier from the current time, a process-unique value and a counter.
pub fn create_object_id() -> ObjectId {
    ObjectId::new()
}

/// Replaces every identifier-shaped string in `payload` with a typed [`ObjectId`], in place.
///
/// Nested documents are walked recursively, as are arrays and their elements. Values of
/// any other type are left untouched. Conversion failures are ignored: this function is
/// best-effort and never fails. Passing `None` is a no-op.
///
/// # Example
///
/// ```ignore
/// use bson::doc;
/// use docshim_core::identifier::coerce_deep;
///
/// let mut payload = doc! { "_id": "5f1b2c3d4e5f6a7b8c9d0e1f", "name": "plain" };
/// coerce_deep(&mut payload);
/// assert!(payload.get_object_id("_id").is_ok());
/// ```
pub fn coerce_deep<'a>(payload: impl Into<Option<&'a mut Document>>) {
    if let Some(document) = payload.into() {
        coerce_document(document, 0);
    }
}

fn coerce_document(document: &mut Document, depth: usize) {
    if depth >= MAX_COERCION_DEPTH {
        warn!(depth, "payload nesting too deep, skipping identifier coercion below this level");
        return;
    }

    for (_, value) in document.iter_mut() {
        coerce_value(value, depth + 1);
    }
}

fn coerce_array(array: &mut [Bson], depth: usize) {
    if depth >= MAX_COERCION_DEPTH {
        warn!(depth, "payload nesting too deep, skipping identifier coercion below this level");
        return;
    }

    for element in array.iter_mut() {
        coerce_value(element, depth + 1);
    }
}

fn coerce_value(value: &mut Bson, depth: usize) {
    match value {
        Bson::Document(document) => coerce_document(document, depth),
        Bson::Array(array) => coerce_array(array, depth),
        Bson::String(s) if is_object_id_str(s) => {
            // shape already checked, a failure here leaves the string as it was
            if let Ok(oid) = ObjectId::parse_str(s.as_str()) {
                *value = Bson::ObjectId(oid);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{DateTime, doc};

    const ID: &str = "5f1b2c3d4e5f6a7b8c9d0e1f";

    #[test]
    fn test_invalid_shapes_are_rejected() {
        for s in [
            "",
            "5f1b2c3d4e5f6a7b8c9d0e1",
            "5f1b2c3d4e5f6a7b8c9d0e1f0",
            "5f1b2c3d4e5f6a7b8c9d0e1g",
            "zzzzzzzzzzzzzzzzzzzzzzzz",
            "5f1b2c3d-4e5f-6a7b-8c9d-0e",
        ] {
            assert!(!is_object_id_str(s), "{s} should not be an identifier");
            assert!(!is_valid_object_id(&Bson::from(s)));
        }

        assert!(!is_valid_object_id(&Bson::Int32(24)));
        assert!(!is_valid_object_id(&Bson::Null));
        assert!(!is_valid_object_id(&Bson::ObjectId(ObjectId::new())));
    }

    #[test]
    fn test_valid_shapes_accept_either_case() {
        assert!(is_object_id_str(ID));
        assert!(is_object_id_str(&ID.to_uppercase()));
    }

    #[test]
    fn test_parse_canonicalises_to_lowercase() {
        let upper = ID.to_uppercase();
        let oid = parse_object_id(&Bson::String(upper)).unwrap();

        assert_eq!(oid.to_hex(), ID);
        assert_eq!(oid.to_string(), ID);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let once = parse_object_id(&Bson::from(ID)).unwrap();
        let twice = parse_object_id(&Bson::ObjectId(once)).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_reports_offending_value() {
        match parse_object_id(&Bson::from("bad")) {
            Err(StoreError::InvalidIdentifier { value }) => assert_eq!(value, "bad"),
            other => panic!("unexpected result: {other:?}"),
        }

        assert!(parse_object_id(&Bson::Int64(7)).is_err());
    }

    #[test]
    fn test_created_ids_are_distinct() {
        let a = create_object_id();
        let b = create_object_id();

        assert_ne!(a, b);
        assert!(is_object_id(&Bson::ObjectId(a)));
        assert!(!is_object_id(&Bson::from(a.to_hex())));
    }

    #[test]
    fn test_coerce_absent_payload_is_noop() {
        coerce_deep(None::<&mut Document>);
    }

    #[test]
    fn test_coerce_top_level_fields() {
        let mut payload = doc! { "_id": ID, "name": "plain" };
        coerce_deep(&mut payload);

        assert_eq!(payload.get_object_id("_id").unwrap().to_hex(), ID);
        assert_eq!(payload.get_str("name").unwrap(), "plain");
    }

    #[test]
    fn test_coerce_is_not_limited_to_id_fields() {
        let mut payload = doc! { "courseId": ID, "ownerRef": ID };
        coerce_deep(&mut payload);

        assert!(payload.get_object_id("courseId").is_ok());
        assert!(payload.get_object_id("ownerRef").is_ok());
    }

    #[test]
    fn test_coerce_array_elements() {
        let mut payload = doc! { "items": [ID, "notanid", 3] };
        coerce_deep(&mut payload);

        let items = payload.get_array("items").unwrap();
        assert!(matches!(items[0], Bson::ObjectId(_)));
        assert_eq!(items[1], Bson::from("notanid"));
        assert_eq!(items[2], Bson::Int32(3));
    }

    #[test]
    fn test_coerce_nested_documents() {
        let mut payload = doc! { "a": { "b": { "_id": ID } } };
        coerce_deep(&mut payload);

        let inner = payload.get_document("a").unwrap().get_document("b").unwrap();
        assert!(inner.get_object_id("_id").is_ok());
    }

    #[test]
    fn test_coerce_documents_and_arrays_inside_arrays() {
        let mut payload = doc! { "items": [{ "_id": ID }, [ID]] };
        coerce_deep(&mut payload);

        let items = payload.get_array("items").unwrap();
        assert!(items[0].as_document().unwrap().get_object_id("_id").is_ok());
        assert!(matches!(items[1].as_array().unwrap()[0], Bson::ObjectId(_)));
    }

    #[test]
    fn test_coerce_leaves_other_types_untouched() {
        let oid = ObjectId::new();
        let now = DateTime::now();
        let mut payload = doc! {
            "count": 24,
            "flag": true,
            "nothing": Bson::Null,
            "typed": oid,
            "when": now,
        };
        let expected = payload.clone();
        coerce_deep(&mut payload);

        assert_eq!(payload, expected);
    }

    #[test]
    fn test_coerce_converts_hex_lookalikes() {
        let mut payload = doc! { "colour": "aaaaaaaaaaaaaaaaaaaaaaaa" };
        coerce_deep(&mut payload);

        assert!(payload.get_object_id("colour").is_ok());
    }

    #[test]
    fn test_coerce_stops_at_depth_bound() {
        let mut payload = doc! { "_id": ID };
        for _ in 0..(MAX_COERCION_DEPTH + 4) {
            payload = doc! { "next": payload };
        }
        coerce_deep(&mut payload);

        let mut current = &payload;
        while let Ok(next) = current.get_document("next") {
            current = next;
        }
        assert_eq!(current.get_str("_id").unwrap(), ID);
    }
}
