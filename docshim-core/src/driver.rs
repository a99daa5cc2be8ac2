//! Storage driver abstraction consumed by the [`DataStore`](crate::store::DataStore).
//!
//! This module defines the narrow per-collection surface docshim needs from a document
//! database driver, so the facade can run against MongoDB or the in-memory driver alike.
//!
//! # Overview
//!
//! The [`StoreDriver`] trait mirrors the driver calls used by the facade: `insert_one`,
//! `find`, `find_one_and_update`, `find_one_and_replace`, `delete_one`, `delete_many`
//! and `create_index`, plus `ping` for liveness checks. Every call is a suspension point;
//! implementations are required to be thread-safe (`Send + Sync`) because a single
//! connected driver is shared by all concurrent operations.
//!
//! Failures are reported as a [`DriverError`], which exposes the server's numeric error
//! code when there is one. Drivers never classify errors themselves; that is the job of
//! the [`ErrorClassifier`](crate::error::ErrorClassifier).
//!
//! # Traits
//!
//! - [`StoreDriver`]: The core trait for storage drivers
//! - [`StoreDriverBuilder`]: Factory trait for creating connected driver instances

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{fmt::Debug, sync::Arc};
use thiserror::Error;

use crate::query::QueryOptions;

/// A raw failure reported by a storage driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    /// The server error code, when the failure came from the server.
    pub code: Option<i32>,
    /// The driver's error message.
    pub message: String,
}

impl DriverError {
    /// Creates a new driver error.
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// A specialized `Result` type for driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

/// Options for creating an index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Explicit index name; drivers derive one from the keys when absent.
    pub name: Option<String>,
}

/// Abstract interface for document database drivers.
///
/// All methods address a collection by name and operate on BSON documents. Filters and
/// options arrive already normalized; drivers must not reinterpret them.
///
/// # Thread Safety
///
/// Implementations must support concurrent calls from multiple async tasks. Any
/// connection pooling is the driver's concern; the facade holds no locks.
///
/// # Error Handling
///
/// Operations return [`DriverResult<T>`]. Implementers should fill
/// [`DriverError::code`] with the server code whenever one is known, since error
/// classification depends on it.
#[async_trait]
pub trait StoreDriver: Send + Sync + Debug {
    /// Inserts a single document, returning the identifier it was stored under.
    ///
    /// If the document has no `_id`, the driver assigns one.
    async fn insert_one(&self, collection: &str, document: Document) -> DriverResult<Bson>;

    /// Returns the documents matching `filter`, honouring limit, skip, sort and projection.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: &QueryOptions,
    ) -> DriverResult<Vec<Document>>;

    /// Applies an update document to the first match and returns the updated document.
    ///
    /// Returns `Ok(None)` when nothing matched.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: &QueryOptions,
    ) -> DriverResult<Option<Document>>;

    /// Replaces the first match and returns the replacement as stored.
    ///
    /// Returns `Ok(None)` when nothing matched.
    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: &QueryOptions,
    ) -> DriverResult<Option<Document>>;

    /// Deletes the first match, returning the number of deleted documents.
    async fn delete_one(&self, collection: &str, filter: Document) -> DriverResult<u64>;

    /// Deletes every match, returning the number of deleted documents.
    async fn delete_many(&self, collection: &str, filter: Document) -> DriverResult<u64>;

    /// Creates an index over `keys` (field to direction).
    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
    ) -> DriverResult<()>;

    /// Checks that the underlying connection is alive.
    async fn ping(&self) -> DriverResult<()>;

    /// Cleanly shuts down the driver, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DriverResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<D> StoreDriver for &D
where
    D: StoreDriver,
{
    async fn insert_one(&self, collection: &str, document: Document) -> DriverResult<Bson> {
        (**self).insert_one(collection, document).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: &QueryOptions,
    ) -> DriverResult<Vec<Document>> {
        (**self).find(collection, filter, options).await
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: &QueryOptions,
    ) -> DriverResult<Option<Document>> {
        (**self)
            .find_one_and_update(collection, filter, update, options)
            .await
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: &QueryOptions,
    ) -> DriverResult<Option<Document>> {
        (**self)
            .find_one_and_replace(collection, filter, replacement, options)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DriverResult<u64> {
        (**self).delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DriverResult<u64> {
        (**self).delete_many(collection, filter).await
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
    ) -> DriverResult<()> {
        (**self).create_index(collection, keys, options).await
    }

    async fn ping(&self) -> DriverResult<()> {
        (**self).ping().await
    }
}

#[async_trait]
impl<D> StoreDriver for Arc<D>
where
    D: StoreDriver,
{
    async fn insert_one(&self, collection: &str, document: Document) -> DriverResult<Bson> {
        (**self).insert_one(collection, document).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: &QueryOptions,
    ) -> DriverResult<Vec<Document>> {
        (**self).find(collection, filter, options).await
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: &QueryOptions,
    ) -> DriverResult<Option<Document>> {
        (**self)
            .find_one_and_update(collection, filter, update, options)
            .await
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: &QueryOptions,
    ) -> DriverResult<Option<Document>> {
        (**self)
            .find_one_and_replace(collection, filter, replacement, options)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DriverResult<u64> {
        (**self).delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DriverResult<u64> {
        (**self).delete_many(collection, filter).await
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
    ) -> DriverResult<()> {
        (**self).create_index(collection, keys, options).await
    }

    async fn ping(&self) -> DriverResult<()> {
        (**self).ping().await
    }
}

/// Creates a connected [`StoreDriver`].
///
/// Building is where the connection is established; a failure here aborts startup.
#[async_trait]
pub trait StoreDriverBuilder {
    type Driver: StoreDriver;

    async fn build(self) -> DriverResult<Self::Driver>;
}
