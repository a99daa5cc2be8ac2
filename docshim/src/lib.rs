//! Main docshim crate providing a thin, uniform data-access layer over document databases.
//!
//! This crate is the primary entry point for host applications. It re-exports the core
//! types from the sub-crates and gives access to the available storage drivers.
//!
//! # Features
//!
//! - **Identifier coercion** - Identifier strings anywhere in a payload become typed identifiers
//! - **Query normalization** - Declarative queries become driver filters and options
//! - **Classified errors** - Driver failures map onto a closed, inspectable error taxonomy
//! - **Multiple drivers** - In-memory and MongoDB drivers behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docshim::{prelude::*, memory::InMemoryDriverBuilder};
//! use bson::doc;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> StoreResult<()> {
//!     let mut keywords = KeywordSet::new();
//!     let store = DataStore::builder(InMemoryDriverBuilder::new())
//!         .relation("author", "users")
//!         .build(&mut keywords)
//!         .await?;
//!
//!     let user = store.insert("users", doc! { "name": "Alice" }).await?;
//!     let author = user.get_object_id("_id").unwrap().to_hex();
//!
//!     // identifier strings are stored as typed identifiers
//!     store
//!         .insert("courses", payload_from_json(json!({ "title": "Intro", "author": author }))?)
//!         .await?;
//!
//!     let courses = store
//!         .find(
//!             "courses",
//!             QueryDescriptor::from_json(json!({
//!                 "fieldsMatching": { "title": "Intro" },
//!                 "limitResultsTo": "10",
//!                 "populate": ["author"],
//!             }))?,
//!         )
//!         .await?;
//!
//!     println!("Found courses: {:?}", courses);
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Errors
//!
//! Every operation returns [`StoreResult`]. Use [`StoreError::kind`] to branch on the
//! failure without matching messages:
//!
//! ```ignore
//! match store.insert("users", doc! { "email": "a@b.c" }).await {
//!     Err(e) if e.kind() == StoreErrorKind::DuplicateKeyViolation => { /* 409 */ }
//!     other => { /* ... */ }
//! }
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - In-memory driver for development and testing
//! - [`mongodb`] - MongoDB driver (requires `mongodb` feature)

pub mod prelude;

pub use docshim_core::{config, driver, error, identifier, keyword, payload, query, store};
pub use docshim_core::{
    config::ConnectionConfig,
    error::{ErrorClassifier, StoreError, StoreErrorKind, StoreResult},
    keyword::KeywordSet,
    query::QueryDescriptor,
    store::{DataStore, DataStoreBuilder},
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory driver implementation.
pub mod memory {
    pub use docshim_memory::{InMemoryDriver, InMemoryDriverBuilder};
}

/// MongoDB driver implementation.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docshim_mongodb::{MongoDbDriver, MongoDbDriverBuilder, driver_error};
}
