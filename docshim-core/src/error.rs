//! Error types, result types and driver error classification.
//!
//! This module provides the closed error taxonomy returned by every docshim operation.
//! Use [`StoreResult<T>`] as the return type for fallible operations, and
//! [`StoreError::kind`] to inspect an error without matching on its message.
//!
//! Failures raised by a storage driver never reach callers directly: they are passed
//! through an [`ErrorClassifier`], a table mapping numeric server codes to semantic
//! error kinds.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use std::{collections::HashMap, fmt};
use thiserror::Error;

use crate::driver::DriverError;

/// The storage operation a failure was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreAction {
    Insert,
    Find,
    Update,
    Replace,
    Delete,
    DeleteMany,
    SetIndex,
}

impl fmt::Display for StoreAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreAction::Insert => "insert",
            StoreAction::Find => "find",
            StoreAction::Update => "update",
            StoreAction::Replace => "replace",
            StoreAction::Delete => "delete",
            StoreAction::DeleteMany => "delete many",
            StoreAction::SetIndex => "set index",
        })
    }
}

/// Structured context attached to every classified storage failure.
///
/// Carries enough data for an outer layer (for example an HTTP responder) to build
/// its own response without parsing the error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageFailure {
    /// The collection the operation targeted.
    pub collection: String,
    /// The attempted action.
    pub action: StoreAction,
    /// The message reported by the driver.
    pub message: String,
    /// The offending field path, when the driver message names one.
    pub field: Option<String>,
    /// The driver's numeric error code, if any.
    pub code: Option<i32>,
}

impl fmt::Display for StorageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to {} in collection {}: {}", self.action, self.collection, self.message)
    }
}

/// Represents all possible errors returned by docshim operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A value was expected to be an identifier but is not a valid encoding of one.
    #[error("Invalid identifier: {value}")]
    InvalidIdentifier {
        /// The offending value, rendered for diagnostics.
        value: String,
    },
    /// The query descriptor is missing or malformed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// The payload handed to a write operation is missing or not a document.
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// The driver refused to modify an immutable field such as `_id`.
    #[error("Immutable field violation, {0}")]
    ImmutableFieldViolation(StorageFailure),
    /// A uniqueness constraint was violated.
    #[error("Duplicate key violation, {0}")]
    DuplicateKeyViolation(StorageFailure),
    /// Any other driver failure.
    #[error("Storage error, {0}")]
    StorageError(StorageFailure),
    /// The store could not be connected during startup.
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),
    /// Conversion between JSON, BSON and typed values failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Inspectable discriminant of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    InvalidIdentifier,
    InvalidQuery,
    InvalidData,
    ImmutableFieldViolation,
    DuplicateKeyViolation,
    StorageError,
    ConnectionFailure,
    Serialization,
}

impl StoreError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::InvalidIdentifier { .. } => StoreErrorKind::InvalidIdentifier,
            StoreError::InvalidQuery(_) => StoreErrorKind::InvalidQuery,
            StoreError::InvalidData(_) => StoreErrorKind::InvalidData,
            StoreError::ImmutableFieldViolation(_) => StoreErrorKind::ImmutableFieldViolation,
            StoreError::DuplicateKeyViolation(_) => StoreErrorKind::DuplicateKeyViolation,
            StoreError::StorageError(_) => StoreErrorKind::StorageError,
            StoreError::ConnectionFailure(_) => StoreErrorKind::ConnectionFailure,
            StoreError::Serialization(_) => StoreErrorKind::Serialization,
        }
    }

    /// Returns the storage context of a classified driver failure.
    pub fn failure(&self) -> Option<&StorageFailure> {
        match self {
            StoreError::ImmutableFieldViolation(failure)
            | StoreError::DuplicateKeyViolation(failure)
            | StoreError::StorageError(failure) => Some(failure),
            _ => None,
        }
    }
}

/// A specialized `Result` type for docshim operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<BsonError> for StoreError {
    fn from(err: BsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for StoreError {
    fn from(err: SerdeJsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Semantic kinds a driver error code can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// An attempt to mutate an immutable field.
    ImmutableField,
    /// A unique index rejected the write.
    DuplicateKey,
}

/// Server codes recognised out of the box.
const DEFAULT_CODES: [(i32, Violation); 3] = [
    (66, Violation::ImmutableField),
    (11000, Violation::DuplicateKey),
    (11001, Violation::DuplicateKey),
];

/// Maps low-level driver failures onto the [`StoreError`] taxonomy.
///
/// Classification looks the numeric driver code up in a table; unknown or absent codes
/// become [`StoreError::StorageError`]. New codes are registered with
/// [`ErrorClassifier::with_code`].
///
/// # Example
///
/// ```ignore
/// use docshim_core::error::{ErrorClassifier, StoreAction, Violation};
///
/// let classifier = ErrorClassifier::default().with_code(11002, Violation::DuplicateKey);
/// let error = classifier.classify(driver_error, "users", StoreAction::Insert);
/// ```
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    codes: HashMap<i32, Violation>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            codes: DEFAULT_CODES.into_iter().collect(),
        }
    }
}

impl ErrorClassifier {
    /// Creates a classifier with an empty table; every failure becomes a storage error.
    pub fn empty() -> Self {
        Self { codes: HashMap::new() }
    }

    /// Registers (or overrides) the kind for a driver code.
    pub fn with_code(mut self, code: i32, violation: Violation) -> Self {
        self.codes.insert(code, violation);
        self
    }

    /// Looks up the kind registered for a driver code.
    pub fn lookup(&self, code: Option<i32>) -> Option<Violation> {
        code.and_then(|code| self.codes.get(&code).copied())
    }

    /// Classifies a driver failure raised while performing `action` on `collection`.
    pub fn classify(&self, error: DriverError, collection: &str, action: StoreAction) -> StoreError {
        let violation = self.lookup(error.code);
        let field = match violation {
            Some(Violation::DuplicateKey) => duplicate_key_field(&error.message),
            Some(Violation::ImmutableField) => immutable_field(&error.message),
            None => None,
        };
        let failure = StorageFailure {
            collection: collection.to_string(),
            action,
            message: error.message,
            field,
            code: error.code,
        };

        match violation {
            Some(Violation::ImmutableField) => StoreError::ImmutableFieldViolation(failure),
            Some(Violation::DuplicateKey) => StoreError::DuplicateKeyViolation(failure),
            None => StoreError::StorageError(failure),
        }
    }
}

/// Extracts the first key from a server message of the form `dup key: { email: "a" }`.
fn duplicate_key_field(message: &str) -> Option<String> {
    let (_, rest) = message.split_once("dup key:")?;
    let rest = rest.trim_start().strip_prefix('{')?;
    let (field, _) = rest.split_once(':')?;
    let field = field.trim().trim_matches('"');

    (!field.is_empty()).then(|| field.to_string())
}

/// Extracts `_id` from messages like `... would modify the immutable field '_id'`.
fn immutable_field(message: &str) -> Option<String> {
    let (_, rest) = message.split_once("immutable field '")?;
    let (field, _) = rest.split_once('\'')?;

    Some(field.to_string())
}
