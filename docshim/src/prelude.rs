//! Convenient re-exports of commonly used types from docshim.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docshim::prelude::*;
//! ```
//!
//! This provides access to:
//! - The document store and its builder
//! - Driver traits and options
//! - Query descriptors and their normalized form
//! - Identifier helpers and payload conversions
//! - Error types and the error classifier

pub use docshim_core::{
    config::ConnectionConfig,
    driver::{DriverError, DriverResult, IndexOptions, StoreDriver, StoreDriverBuilder},
    error::{ErrorClassifier, StorageFailure, StoreAction, StoreError, StoreErrorKind, StoreResult, Violation},
    identifier::{coerce_deep, create_object_id, is_object_id, is_valid_object_id, parse_object_id},
    keyword::{DateKeyword, KeywordRegistry, KeywordSet, ObjectIdKeyword, SchemaKeyword},
    payload::{from_payload, payload_from_json, to_payload},
    query::{NormalizedQuery, QueryDescriptor, QueryOptions, SortDirection, normalize, validate},
    store::{DataStore, DataStoreBuilder},
};
