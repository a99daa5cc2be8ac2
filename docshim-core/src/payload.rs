//! Conversions between caller data and BSON payloads.
//!
//! Payloads handed to the [`DataStore`](crate::store::DataStore) are plain
//! [`bson::Document`]s. Host applications usually hold JSON or their own typed structs;
//! the helpers here convert both ways, reporting failures as
//! [`StoreError::InvalidData`] or [`StoreError::Serialization`].

use bson::{Bson, Document, deserialize_from_bson, serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Converts a JSON object into a payload.
///
/// Identifier-shaped strings are left as strings; the store coerces them on write.
///
/// # Errors
///
/// Returns [`StoreError::InvalidData`] if `value` is not a JSON object.
pub fn payload_from_json(value: Value) -> StoreResult<Document> {
    if !value.is_object() {
        return Err(StoreError::InvalidData(format!("expected a JSON object, got {value}")));
    }

    to_payload(&value)
}

/// Serializes any value into a payload.
///
/// # Errors
///
/// Returns [`StoreError::InvalidData`] if `value` does not serialize to a document, and
/// [`StoreError::Serialization`] if serialization itself fails.
pub fn to_payload<T: Serialize + ?Sized>(value: &T) -> StoreResult<Document> {
    match serialize_to_bson(value)? {
        Bson::Document(document) => Ok(document),
        other => Err(StoreError::InvalidData(format!(
            "expected a document, got {:?}",
            other.element_type()
        ))),
    }
}

/// Deserializes a stored document into a typed value.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the document does not fit `T`.
pub fn from_payload<T: DeserializeOwned>(document: Document) -> StoreResult<T> {
    Ok(deserialize_from_bson(Bson::Document(document))?)
}
