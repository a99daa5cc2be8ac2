//! The document store facade.
//!
//! [`DataStore`] is the entry point host applications use. It owns a connected
//! [`StoreDriver`] and sequences every operation the same way:
//!
//! - writes deep-coerce identifier strings in the payload before dispatch,
//! - reads, updates and deletes normalize their [`QueryDescriptor`] first,
//! - driver failures are classified by the [`ErrorClassifier`] before they reach the
//!   caller, so the raw driver error is never surfaced.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use docshim::{DataStore, KeywordSet, QueryDescriptor};
//! use docshim::memory::InMemoryDriverBuilder;
//!
//! let mut keywords = KeywordSet::new();
//! let store = DataStore::builder(InMemoryDriverBuilder::new())
//!     .relation("author", "users")
//!     .build(&mut keywords)
//!     .await?;
//!
//! let course = store.insert("courses", doc! { "title": "Intro" }).await?;
//! let found = store
//!     .find("courses", QueryDescriptor::new(doc! { "title": "Intro" }))
//!     .await?;
//! ```

use bson::{Bson, Document, doc, oid::ObjectId};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::{
    driver::{DriverError, IndexOptions, StoreDriver, StoreDriverBuilder},
    error::{ErrorClassifier, StoreAction, StoreError, StoreResult, StorageFailure},
    identifier::coerce_deep,
    keyword::{KeywordRegistry, register_builtin_keywords},
    query::{NormalizedQuery, QueryDescriptor, QueryOptions, by_id, normalize},
};

/// A document store bound to a connected driver.
///
/// # Type Parameters
///
/// * `D` - The driver implementation type
#[derive(Debug)]
pub struct DataStore<D: StoreDriver> {
    driver: D,
    classifier: ErrorClassifier,
    relations: HashMap<String, String>,
}

impl<D: StoreDriver> DataStore<D> {
    /// Wraps an already connected driver, using the default error classifier and no
    /// relations.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            classifier: ErrorClassifier::default(),
            relations: HashMap::new(),
        }
    }

    /// Replaces the error classifier.
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Registers a relation used to expand `path` with documents from `collection`.
    pub fn with_relation(mut self, path: impl Into<String>, collection: impl Into<String>) -> Self {
        self.relations.insert(path.into(), collection.into());
        self
    }

    /// Returns a reference to the underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Returns the error classifier in use.
    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Inserts a document and returns it as stored.
    ///
    /// Identifier strings in `data` are coerced first. After the insert the document is
    /// read back by its identifier, so the result carries everything the server stored,
    /// including a generated `_id`. The read-back runs on the same driver but outside
    /// any session; it relies on the store offering read-your-writes consistency.
    ///
    /// # Errors
    ///
    /// Returns a classified driver error, or [`StoreError::StorageError`] if the document
    /// cannot be read back.
    pub async fn insert(&self, collection: &str, mut data: Document) -> StoreResult<Document> {
        coerce_deep(&mut data);

        debug!(collection, "dispatching insert");
        let id = self
            .driver
            .insert_one(collection, data)
            .await
            .map_err(|e| self.classify(e, collection, StoreAction::Insert))?;

        self.driver
            .find(collection, by_id(id.clone()), &QueryOptions::default())
            .await
            .map_err(|e| self.classify(e, collection, StoreAction::Insert))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                StoreError::StorageError(StorageFailure {
                    collection: collection.to_string(),
                    action: StoreAction::Insert,
                    message: format!("inserted document {id} could not be read back"),
                    field: None,
                    code: None,
                })
            })
    }

    /// Returns every document matching the query, with requested relations expanded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] or [`StoreError::InvalidIdentifier`] if the
    /// query does not normalize, or a classified driver error.
    pub async fn find(&self, collection: &str, query: QueryDescriptor) -> StoreResult<Vec<Document>> {
        let NormalizedQuery { filter, options, populate_paths } = normalize(Some(query))?;

        debug!(collection, filter = %filter, "dispatching find");
        let mut documents = self
            .driver
            .find(collection, filter, &options)
            .await
            .map_err(|e| self.classify(e, collection, StoreAction::Find))?;

        for path in populate_paths.as_deref().unwrap_or_default().split_whitespace() {
            self.expand(collection, path, &mut documents).await?;
        }

        Ok(documents)
    }

    /// Updates the first document matching the query and returns it after the update.
    ///
    /// `data` may be an update operator document (`{ "$set": ... }`) or a plain field
    /// document, which is applied as `$set`. A client supplied `_id` is removed from the
    /// top level and from `$set` before dispatch. Returns `Ok(None)` if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidData`] for an empty update or one mixing operators
    /// with plain fields, query normalization errors, or a classified driver error.
    pub async fn update(
        &self,
        collection: &str,
        query: QueryDescriptor,
        data: Document,
    ) -> StoreResult<Option<Document>> {
        let NormalizedQuery { filter, options, .. } = normalize(Some(query))?;
        let update = prepare_update(data)?;

        debug!(collection, filter = %filter, "dispatching update");
        self.driver
            .find_one_and_update(collection, filter, update, &options)
            .await
            .map_err(|e| self.classify(e, collection, StoreAction::Update))
    }

    /// Replaces the first document matching the query and returns the replacement.
    ///
    /// A client supplied `_id` is removed from the replacement, which keeps the matched
    /// document's identifier. Returns `Ok(None)` if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns query normalization errors or a classified driver error.
    pub async fn replace(
        &self,
        collection: &str,
        query: QueryDescriptor,
        mut data: Document,
    ) -> StoreResult<Option<Document>> {
        let NormalizedQuery { filter, options, .. } = normalize(Some(query))?;
        data.remove("_id");
        coerce_deep(&mut data);

        debug!(collection, filter = %filter, "dispatching replace");
        self.driver
            .find_one_and_replace(collection, filter, data, &options)
            .await
            .map_err(|e| self.classify(e, collection, StoreAction::Replace))
    }

    /// Deletes the first document matching the query, returning the number deleted.
    ///
    /// Matching nothing is not an error.
    pub async fn delete(&self, collection: &str, query: QueryDescriptor) -> StoreResult<u64> {
        let NormalizedQuery { filter, .. } = normalize(Some(query))?;

        debug!(collection, filter = %filter, "dispatching delete");
        self.driver
            .delete_one(collection, filter)
            .await
            .map_err(|e| self.classify(e, collection, StoreAction::Delete))
    }

    /// Deletes every document matching the query, returning the number deleted.
    pub async fn delete_many(&self, collection: &str, query: QueryDescriptor) -> StoreResult<u64> {
        let NormalizedQuery { filter, .. } = normalize(Some(query))?;

        debug!(collection, filter = %filter, "dispatching delete many");
        self.driver
            .delete_many(collection, filter)
            .await
            .map_err(|e| self.classify(e, collection, StoreAction::DeleteMany))
    }

    /// Creates an index on `collection`.
    ///
    /// Index creation is best-effort: a failure is logged as a warning and otherwise
    /// ignored.
    pub async fn set_index(&self, collection: &str, keys: Document, options: IndexOptions) {
        debug!(collection, keys = %keys, "dispatching set index");

        if let Err(e) = self.driver.create_index(collection, keys, options).await {
            let error = self.classify(e, collection, StoreAction::SetIndex);
            warn!(collection, error = %error, "failed to create index");
        }
    }

    /// Returns `true` if the driver answers a ping.
    pub async fn is_ready(&self) -> bool {
        self.driver.ping().await.is_ok()
    }

    /// Shuts the store down, releasing the driver.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConnectionFailure`] if the driver fails to shut down cleanly.
    pub async fn shutdown(self) -> StoreResult<()> {
        self.driver
            .shutdown()
            .await
            .map_err(|e| StoreError::ConnectionFailure(e.to_string()))
    }

    fn classify(&self, error: DriverError, collection: &str, action: StoreAction) -> StoreError {
        self.classifier.classify(error, collection, action)
    }

    /// Replaces identifiers stored under `path` with the documents they reference.
    async fn expand(&self, collection: &str, path: &str, documents: &mut [Document]) -> StoreResult<()> {
        let Some(related) = self.relations.get(path) else {
            warn!(collection, path, "no relation registered for expansion path, skipping");
            return Ok(());
        };

        let ids = documents
            .iter()
            .filter_map(|document| document.get(path))
            .flat_map(|value| match value {
                Bson::ObjectId(_) => vec![value.clone()],
                Bson::Array(elements) => elements
                    .iter()
                    .filter(|element| matches!(element, Bson::ObjectId(_)))
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            })
            .collect::<Vec<_>>();

        if ids.is_empty() {
            return Ok(());
        }

        debug!(collection = %related, path, count = ids.len(), "expanding relation");
        let referenced = self
            .driver
            .find(related, doc! { "_id": { "$in": ids } }, &QueryOptions::default())
            .await
            .map_err(|e| self.classify(e, related, StoreAction::Find))?
            .into_iter()
            .filter_map(|document| Some((document.get_object_id("_id").ok()?, document)))
            .collect::<HashMap<_, _>>();

        for document in documents.iter_mut() {
            if let Some(expanded) = document.get(path).and_then(|value| expand_value(value, &referenced)) {
                document.insert(path, expanded);
            }
        }

        Ok(())
    }
}

/// Resolves a stored reference: a missing single reference becomes null, missing
/// array entries are dropped.
fn expand_value(value: &Bson, referenced: &HashMap<ObjectId, Document>) -> Option<Bson> {
    match value {
        Bson::ObjectId(id) => Some(
            referenced
                .get(id)
                .cloned()
                .map(Bson::Document)
                .unwrap_or(Bson::Null),
        ),
        Bson::Array(elements) => Some(Bson::Array(
            elements
                .iter()
                .filter_map(|element| match element {
                    Bson::ObjectId(id) => referenced.get(id).cloned().map(Bson::Document),
                    other => Some(other.clone()),
                })
                .collect(),
        )),
        _ => None,
    }
}

/// Turns caller update data into an operator document without `_id` changes.
fn prepare_update(data: Document) -> StoreResult<Document> {
    if data.is_empty() {
        return Err(StoreError::InvalidData("expected a non-empty update".to_string()));
    }

    let operators = data.keys().filter(|key| key.starts_with('$')).count();
    let mut update = match operators {
        0 => doc! { "$set": data },
        n if n == data.len() => data,
        _ => {
            return Err(StoreError::InvalidData(
                "update mixes operators with plain fields".to_string(),
            ));
        }
    };

    if let Ok(set) = update.get_document_mut("$set") {
        set.remove("_id");
    }
    update.remove("_id");
    coerce_deep(&mut update);

    Ok(update)
}

/// Builds a [`DataStore`] by connecting a driver and registering validator keywords.
///
/// # Example
///
/// ```ignore
/// let store = DataStore::builder(MongoDbDriverBuilder::from_config(config))
///     .classifier(ErrorClassifier::default())
///     .relation("author", "users")
///     .build(&mut keywords)
///     .await?;
/// ```
#[derive(Debug)]
pub struct DataStoreBuilder<B> {
    driver_builder: B,
    classifier: ErrorClassifier,
    relations: HashMap<String, String>,
}

impl<D: StoreDriver> DataStore<D> {
    /// Creates a builder that connects the driver produced by `driver_builder`.
    pub fn builder<B>(driver_builder: B) -> DataStoreBuilder<B>
    where
        B: StoreDriverBuilder<Driver = D>,
    {
        DataStoreBuilder {
            driver_builder,
            classifier: ErrorClassifier::default(),
            relations: HashMap::new(),
        }
    }
}

impl<B: StoreDriverBuilder> DataStoreBuilder<B> {
    /// Sets the error classifier.
    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Registers a relation used to expand `path` with documents from `collection`.
    pub fn relation(mut self, path: impl Into<String>, collection: impl Into<String>) -> Self {
        self.relations.insert(path.into(), collection.into());
        self
    }

    /// Connects the driver, checks it answers, and registers the built-in validator
    /// keywords into `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConnectionFailure`] if the driver cannot be built or does not
    /// answer a ping; the store is never handed out unconnected. Registry failures are
    /// propagated as returned by the registry.
    pub async fn build<R>(self, registry: &mut R) -> StoreResult<DataStore<B::Driver>>
    where
        R: KeywordRegistry + ?Sized,
    {
        let driver = self
            .driver_builder
            .build()
            .await
            .map_err(|e| StoreError::ConnectionFailure(e.to_string()))?;

        driver
            .ping()
            .await
            .map_err(|e| StoreError::ConnectionFailure(e.to_string()))?;
        info!(driver = ?driver, "document store connected");

        register_builtin_keywords(registry)?;
        info!("schema keywords registered");

        Ok(DataStore {
            driver,
            classifier: self.classifier,
            relations: self.relations,
        })
    }
}
