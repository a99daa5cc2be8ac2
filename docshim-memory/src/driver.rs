//! In-memory storage driver.
//!
//! This module provides a driver that keeps collections as ordered vectors of BSON
//! documents behind async-aware read-write locks, reproducing the server behaviour the
//! document store relies on: generated identifiers, unique indexes, immutable `_id` and
//! the server error codes for violations.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document, doc, oid::ObjectId};
use tracing::trace;

use docshim_core::{
    driver::{DriverError, DriverResult, IndexOptions, StoreDriver, StoreDriverBuilder},
    query::QueryOptions,
};

use crate::{
    evaluator::{BAD_VALUE, Comparable, DocumentEvaluator, lookup, sort_order},
    update::{apply_update, project},
};

/// Server code for an attempt to modify `_id`.
pub const IMMUTABLE_FIELD: i32 = 66;
/// Server code for a unique index violation.
pub const DUPLICATE_KEY: i32 = 11000;
/// Server code for an index name reused with a different definition.
pub const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
/// Server code for an index that cannot be created.
pub const CANNOT_CREATE_INDEX: i32 = 67;

const ID_INDEX: &str = "_id_";

#[derive(Debug, Clone, PartialEq)]
struct IndexSpec {
    name: String,
    keys: Document,
    unique: bool,
}

#[derive(Debug, Default)]
struct CollectionData {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

type StoreMap = HashMap<String, CollectionData>;

impl CollectionData {
    /// Positions of the documents matching `filter`, in natural order.
    fn matching(&self, filter: &Document) -> DriverResult<Vec<usize>> {
        let mut positions = Vec::new();

        for (position, document) in self.documents.iter().enumerate() {
            if DocumentEvaluator::new(document).evaluate(filter)? {
                positions.push(position);
            }
        }

        Ok(positions)
    }

    /// Position of the first match once `sort` is applied.
    fn first_match(&self, filter: &Document, sort: Option<&Document>) -> DriverResult<Option<usize>> {
        let mut positions = self.matching(filter)?;

        if let Some(sort) = sort {
            positions.sort_by(|a, b| sort_order(&self.documents[*a], &self.documents[*b], sort));
        }

        Ok(positions.first().copied())
    }

    /// Checks `candidate` against `_id` and every unique index, ignoring the document at
    /// `replacing`.
    fn check_unique(&self, collection: &str, candidate: &Document, replacing: Option<usize>) -> DriverResult<()> {
        let id_index = IndexSpec {
            name: ID_INDEX.to_string(),
            keys: doc! { "_id": 1 },
            unique: true,
        };

        for spec in std::iter::once(&id_index).chain(self.indexes.iter().filter(|spec| spec.unique)) {
            let key = index_key(&spec.keys, candidate);
            let collides = self
                .documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != replacing)
                .any(|(_, existing)| index_key(&spec.keys, existing) == key);

            if collides {
                return Err(duplicate_key(collection, spec, candidate));
            }
        }

        Ok(())
    }
}

fn index_key<'d>(keys: &Document, document: &'d Document) -> Vec<Comparable<'d>> {
    keys.keys()
        .map(|path| lookup(document, path).map(Comparable::from).unwrap_or(Comparable::Null))
        .collect()
}

fn index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(path, direction)| format!("{path}_{direction}"))
        .collect::<Vec<_>>()
        .join("_")
}

fn duplicate_key(collection: &str, spec: &IndexSpec, document: &Document) -> DriverError {
    let values = spec
        .keys
        .keys()
        .map(|path| format!("{path}: {}", lookup(document, path).unwrap_or(&Bson::Null)))
        .collect::<Vec<_>>()
        .join(", ");

    DriverError::new(
        Some(DUPLICATE_KEY),
        format!(
            "E11000 duplicate key error collection: {collection} index: {} dup key: {{ {values} }}",
            spec.name
        ),
    )
}

fn immutable_id() -> DriverError {
    DriverError::new(
        Some(IMMUTABLE_FIELD),
        "Performing an update on the path '_id' would modify the immutable field '_id'",
    )
}

/// Thread-safe in-memory document storage driver.
///
/// `InMemoryDriver` is cloneable and uses an `Arc`-wrapped internal state, allowing it
/// to be safely shared across async tasks. Multiple clones of the same instance share
/// the same underlying data.
///
/// # Performance
///
/// Queries scan every document of a collection; indexes only enforce uniqueness.
///
/// # Example
///
/// ```ignore
/// use docshim_memory::InMemoryDriver;
/// use docshim_core::driver::StoreDriver;
/// use bson::doc;
///
/// let driver = InMemoryDriver::new();
/// let id = driver.insert_one("users", doc! { "name": "Alice" }).await?;
/// let users = driver.find("users", doc! { "_id": id }, &Default::default()).await?;
/// assert_eq!(users.len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryDriver {
    /// collection name -> documents and indexes
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryDriver {
    /// Creates a new empty in-memory driver.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryDriver`.
    pub fn builder() -> InMemoryDriverBuilder {
        InMemoryDriverBuilder::default()
    }

    /// Returns the number of documents stored in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.store
            .read()
            .await
            .get(collection)
            .map_or(0, |data| data.documents.len())
    }

    /// Returns the names of the indexes defined on `collection`, including `_id_`.
    pub async fn index_names(&self, collection: &str) -> Vec<String> {
        let store = self.store.read().await;
        let mut names = vec![ID_INDEX.to_string()];

        if let Some(data) = store.get(collection) {
            names.extend(data.indexes.iter().map(|spec| spec.name.clone()));
        }

        names
    }
}

#[async_trait]
impl StoreDriver for InMemoryDriver {
    async fn insert_one(&self, collection: &str, mut document: Document) -> DriverResult<Bson> {
        let id = match document.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                let mut with_id = doc! { "_id": id.clone() };
                for (key, value) in document {
                    with_id.insert(key, value);
                }
                document = with_id;
                id
            }
        };

        let mut store = self.store.write().await;
        let data = store.entry(collection.to_string()).or_default();

        data.check_unique(collection, &document, None)?;
        data.documents.push(document);
        trace!(collection, id = %id, "inserted document");

        Ok(id)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: &QueryOptions,
    ) -> DriverResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(data) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut positions = data.matching(&filter)?;

        if let Some(sort) = &options.sort {
            positions.sort_by(|a, b| sort_order(&data.documents[*a], &data.documents[*b], sort));
        }

        let skip = options.skip.map_or(0, |skip| skip as usize);
        let limit = options
            .limit
            .filter(|limit| *limit != 0)
            .map_or(usize::MAX, |limit| limit.unsigned_abs() as usize);

        Ok(
            positions
                .into_iter()
                .skip(skip)
                .take(limit)
                .map(|position| project(data.documents[position].clone(), options.projection.as_ref()))
                .collect()
        )
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: &QueryOptions,
    ) -> DriverResult<Option<Document>> {
        let mut store = self.store.write().await;
        let Some(data) = store.get_mut(collection) else {
            return Ok(None);
        };
        let Some(position) = data.first_match(&filter, options.sort.as_ref())? else {
            return Ok(None);
        };

        let mut updated = data.documents[position].clone();
        apply_update(&mut updated, &update)?;

        if updated.get("_id") != data.documents[position].get("_id") {
            return Err(immutable_id());
        }
        data.check_unique(collection, &updated, Some(position))?;
        data.documents[position] = updated.clone();

        Ok(Some(project(updated, options.projection.as_ref())))
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: &QueryOptions,
    ) -> DriverResult<Option<Document>> {
        if let Some(operator) = replacement.keys().find(|key| key.starts_with('$')) {
            return Err(DriverError::new(
                Some(BAD_VALUE),
                format!("Replacement document must not contain atomic operators, found {operator}"),
            ));
        }

        let mut store = self.store.write().await;
        let Some(data) = store.get_mut(collection) else {
            return Ok(None);
        };
        let Some(position) = data.first_match(&filter, options.sort.as_ref())? else {
            return Ok(None);
        };

        let current_id = data.documents[position].get("_id").cloned();
        if let (Some(given), Some(current)) = (replacement.get("_id"), current_id.as_ref()) {
            if given != current {
                return Err(immutable_id());
            }
        }

        let mut stored = Document::new();
        if let Some(id) = current_id {
            stored.insert("_id", id);
        }
        for (key, value) in replacement {
            if key != "_id" {
                stored.insert(key, value);
            }
        }

        data.check_unique(collection, &stored, Some(position))?;
        data.documents[position] = stored.clone();

        Ok(Some(project(stored, options.projection.as_ref())))
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DriverResult<u64> {
        let mut store = self.store.write().await;
        let Some(data) = store.get_mut(collection) else {
            return Ok(0);
        };

        match data.first_match(&filter, None)? {
            Some(position) => {
                data.documents.remove(position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DriverResult<u64> {
        let mut store = self.store.write().await;
        let Some(data) = store.get_mut(collection) else {
            return Ok(0);
        };

        let positions = data.matching(&filter)?;
        for position in positions.iter().rev() {
            data.documents.remove(*position);
        }

        Ok(positions.len() as u64)
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
    ) -> DriverResult<()> {
        if keys.is_empty() {
            return Err(DriverError::new(Some(CANNOT_CREATE_INDEX), "Index keys cannot be empty"));
        }

        let spec = IndexSpec {
            name: options.name.unwrap_or_else(|| index_name(&keys)),
            keys,
            unique: options.unique,
        };

        let mut store = self.store.write().await;
        let data = store.entry(collection.to_string()).or_default();

        match data.indexes.iter().find(|existing| existing.name == spec.name) {
            Some(existing) if *existing == spec => return Ok(()),
            Some(_) => {
                return Err(DriverError::new(
                    Some(INDEX_KEY_SPECS_CONFLICT),
                    format!("An existing index has the same name as the requested index: {}", spec.name),
                ));
            }
            None => {}
        }

        if spec.unique {
            for (position, document) in data.documents.iter().enumerate() {
                let key = index_key(&spec.keys, document);
                if data.documents[position + 1..]
                    .iter()
                    .any(|other| index_key(&spec.keys, other) == key)
                {
                    return Err(duplicate_key(collection, &spec, document));
                }
            }
        }

        trace!(collection, index = %spec.name, "created index");
        data.indexes.push(spec);

        Ok(())
    }

    async fn ping(&self) -> DriverResult<()> {
        Ok(())
    }
}

/// Builder for constructing [`InMemoryDriver`] instances.
///
/// # Example
///
/// ```ignore
/// use docshim_memory::InMemoryDriver;
/// use docshim_core::driver::StoreDriverBuilder;
///
/// let driver = InMemoryDriver::builder().build().await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryDriverBuilder;

impl InMemoryDriverBuilder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StoreDriverBuilder for InMemoryDriverBuilder {
    type Driver = InMemoryDriver;

    /// Builds and returns a new [`InMemoryDriver`] instance.
    ///
    /// This always succeeds and returns a freshly initialized driver.
    async fn build(self) -> DriverResult<Self::Driver> {
        Ok(InMemoryDriver::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_generates_leading_id() {
        let driver = InMemoryDriver::new();
        let id = driver.insert_one("users", doc! { "name": "Ada" }).await.unwrap();

        let users = driver
            .find("users", doc! { "_id": id.clone() }, &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].keys().next().map(String::as_str), Some("_id"));
        assert!(matches!(id, Bson::ObjectId(_)));
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let driver = InMemoryDriver::new();
        let id = ObjectId::new();
        driver.insert_one("users", doc! { "_id": id }).await.unwrap();

        let error = driver.insert_one("users", doc! { "_id": id }).await.unwrap_err();
        assert_eq!(error.code, Some(DUPLICATE_KEY));
        assert!(error.message.contains("index: _id_ dup key: { _id:"));
        assert_eq!(driver.count("users").await, 1);
    }

    #[tokio::test]
    async fn test_unique_index_is_enforced() {
        let driver = InMemoryDriver::new();
        driver
            .create_index("users", doc! { "email": 1 }, IndexOptions { unique: true, name: None })
            .await
            .unwrap();
        driver.insert_one("users", doc! { "email": "a@b.c" }).await.unwrap();
        let other = driver.insert_one("users", doc! { "email": "x@y.z" }).await.unwrap();

        let error = driver.insert_one("users", doc! { "email": "a@b.c" }).await.unwrap_err();
        assert_eq!(error.code, Some(DUPLICATE_KEY));
        assert!(error.message.contains("index: email_1 dup key: { email: \"a@b.c\" }"));

        let error = driver
            .find_one_and_update(
                "users",
                doc! { "_id": other },
                doc! { "$set": { "email": "a@b.c" } },
                &QueryOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(error.code, Some(DUPLICATE_KEY));
        assert_eq!(driver.index_names("users").await, vec!["_id_", "email_1"]);
    }

    #[tokio::test]
    async fn test_unique_index_over_duplicates_fails() {
        let driver = InMemoryDriver::new();
        driver.insert_one("users", doc! { "email": "a@b.c" }).await.unwrap();
        driver.insert_one("users", doc! { "email": "a@b.c" }).await.unwrap();

        let error = driver
            .create_index("users", doc! { "email": 1 }, IndexOptions { unique: true, name: None })
            .await
            .unwrap_err();
        assert_eq!(error.code, Some(DUPLICATE_KEY));
    }

    #[tokio::test]
    async fn test_conflicting_index_name_fails() {
        let driver = InMemoryDriver::new();
        let named = |unique| IndexOptions { unique, name: Some("by_email".to_string()) };

        driver.create_index("users", doc! { "email": 1 }, named(false)).await.unwrap();
        driver.create_index("users", doc! { "email": 1 }, named(false)).await.unwrap();

        let error = driver
            .create_index("users", doc! { "email": 1 }, named(true))
            .await
            .unwrap_err();
        assert_eq!(error.code, Some(INDEX_KEY_SPECS_CONFLICT));
    }

    #[tokio::test]
    async fn test_changing_id_is_immutable_violation() {
        let driver = InMemoryDriver::new();
        let id = driver.insert_one("courses", doc! { "title": "x" }).await.unwrap();

        let error = driver
            .find_one_and_update(
                "courses",
                doc! { "_id": id.clone() },
                doc! { "$set": { "_id": ObjectId::new() } },
                &QueryOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(error.code, Some(IMMUTABLE_FIELD));

        let error = driver
            .find_one_and_replace(
                "courses",
                doc! { "_id": id },
                doc! { "_id": ObjectId::new(), "title": "y" },
                &QueryOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(error.code, Some(IMMUTABLE_FIELD));
    }

    #[tokio::test]
    async fn test_find_applies_options() {
        let driver = InMemoryDriver::new();
        for (title, rank) in [("c", 3), ("a", 1), ("d", 4), ("b", 2)] {
            driver
                .insert_one("courses", doc! { "title": title, "rank": rank, "body": "..." })
                .await
                .unwrap();
        }

        let options = QueryOptions {
            limit: Some(2),
            skip: Some(1),
            sort: Some(doc! { "rank": -1 }),
            projection: Some(doc! { "title": 1, "_id": 0 }),
        };
        let courses = driver.find("courses", doc! {}, &options).await.unwrap();

        assert_eq!(courses, vec![doc! { "title": "c" }, doc! { "title": "b" }]);
    }

    #[tokio::test]
    async fn test_update_returns_post_image_and_replace_keeps_id() {
        let driver = InMemoryDriver::new();
        let id = driver.insert_one("courses", doc! { "title": "x", "views": 1 }).await.unwrap();

        let updated = driver
            .find_one_and_update(
                "courses",
                doc! { "_id": id.clone() },
                doc! { "$inc": { "views": 1 } },
                &QueryOptions::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.get_i32("views").unwrap(), 2);

        let replaced = driver
            .find_one_and_replace(
                "courses",
                doc! { "_id": id.clone() },
                doc! { "title": "y" },
                &QueryOptions::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replaced, doc! { "_id": id, "title": "y" });

        let missing = driver
            .find_one_and_update(
                "courses",
                doc! { "title": "nope" },
                doc! { "$set": { "a": 1 } },
                &QueryOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_delete_counts() {
        let driver = InMemoryDriver::new();
        for status in ["draft", "draft", "published"] {
            driver.insert_one("courses", doc! { "status": status }).await.unwrap();
        }

        assert_eq!(driver.delete_one("courses", doc! { "status": "draft" }).await.unwrap(), 1);
        assert_eq!(driver.delete_many("courses", doc! { "status": "nope" }).await.unwrap(), 0);
        assert_eq!(driver.delete_many("courses", doc! {}).await.unwrap(), 2);
        assert_eq!(driver.delete_one("missing", doc! {}).await.unwrap(), 0);
        assert_eq!(driver.count("courses").await, 0);
    }
}
