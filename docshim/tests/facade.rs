use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use serde_json::json;
use std::sync::Arc;

use docshim::{
    memory::{InMemoryDriver, InMemoryDriverBuilder},
    prelude::*,
    query::QueryOptions,
};

const OWNER: &str = "5f1b2c3d4e5f6a7b8c9d0e1f";

fn store() -> DataStore<InMemoryDriver> {
    DataStore::new(InMemoryDriver::new())
}

#[tokio::test]
async fn test_insert_reads_back_generated_id() {
    let store = store();

    let course = store
        .insert("courses", doc! { "title": "Intro", "ownerId": OWNER, "tags": [OWNER, "plain"] })
        .await
        .unwrap();

    assert!(course.get_object_id("_id").is_ok());
    assert_eq!(course.get_object_id("ownerId").unwrap().to_hex(), OWNER);

    let tags = course.get_array("tags").unwrap();
    assert!(matches!(tags[0], Bson::ObjectId(_)));
    assert_eq!(tags[1], Bson::String("plain".to_string()));
}

/// Stores documents with a server-assigned revision, or drops them entirely.
#[derive(Debug, Default)]
struct StampingDriver {
    inner: InMemoryDriver,
    discard_writes: bool,
}

#[async_trait]
impl StoreDriver for StampingDriver {
    async fn insert_one(&self, collection: &str, mut document: Document) -> DriverResult<Bson> {
        if self.discard_writes {
            return Ok(Bson::ObjectId(ObjectId::new()));
        }

        document.insert("revision", 1);
        self.inner.insert_one(collection, document).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: &QueryOptions,
    ) -> DriverResult<Vec<Document>> {
        self.inner.find(collection, filter, options).await
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: &QueryOptions,
    ) -> DriverResult<Option<Document>> {
        self.inner.find_one_and_update(collection, filter, update, options).await
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: &QueryOptions,
    ) -> DriverResult<Option<Document>> {
        self.inner.find_one_and_replace(collection, filter, replacement, options).await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DriverResult<u64> {
        self.inner.delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DriverResult<u64> {
        self.inner.delete_many(collection, filter).await
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
    ) -> DriverResult<()> {
        self.inner.create_index(collection, keys, options).await
    }

    async fn ping(&self) -> DriverResult<()> {
        self.inner.ping().await
    }
}

#[tokio::test]
async fn test_insert_returns_stored_document() {
    let store = DataStore::new(StampingDriver::default());

    let course = store.insert("courses", doc! { "title": "Intro" }).await.unwrap();

    assert_eq!(course.get_i32("revision").unwrap(), 1);
    assert_eq!(course.get_str("title").unwrap(), "Intro");
    assert!(course.get_object_id("_id").is_ok());
}

#[tokio::test]
async fn test_insert_without_read_back_is_storage_error() {
    let store = DataStore::new(StampingDriver { discard_writes: true, ..Default::default() });

    let error = store.insert("courses", doc! { "title": "Intro" }).await.unwrap_err();

    assert_eq!(error.kind(), StoreErrorKind::StorageError);
    let failure = error.failure().unwrap();
    assert_eq!(failure.collection, "courses");
    assert_eq!(failure.action, StoreAction::Insert);
    assert!(failure.message.contains("could not be read back"));
}

#[tokio::test]
async fn test_shared_and_borrowed_drivers() {
    let driver = Arc::new(InMemoryDriver::new());
    let shared = DataStore::new(Arc::clone(&driver));
    shared.insert("courses", doc! { "title": "Intro" }).await.unwrap();

    let borrowed = DataStore::new(driver.as_ref());
    let found = borrowed
        .find("courses", QueryDescriptor::new(doc! { "title": "Intro" }))
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(driver.count("courses").await, 1);
}

#[tokio::test]
async fn test_insert_keeps_client_id() {
    let store = store();
    let id = ObjectId::new();

    let course = store
        .insert("courses", doc! { "_id": id.to_hex(), "title": "Intro" })
        .await
        .unwrap();

    assert_eq!(course.get_object_id("_id").unwrap(), id);
}

#[tokio::test]
async fn test_duplicate_key_is_classified() {
    let store = store();
    store
        .set_index("users", doc! { "email": 1 }, IndexOptions { unique: true, name: None })
        .await;
    store.insert("users", doc! { "email": "a@b.c" }).await.unwrap();

    let error = store.insert("users", doc! { "email": "a@b.c" }).await.unwrap_err();

    assert_eq!(error.kind(), StoreErrorKind::DuplicateKeyViolation);
    let failure = error.failure().unwrap();
    assert_eq!(failure.collection, "users");
    assert_eq!(failure.action, StoreAction::Insert);
    assert_eq!(failure.field.as_deref(), Some("email"));
    assert_eq!(failure.code, Some(11000));
    assert_eq!(store.driver().count("users").await, 1);
}

#[tokio::test]
async fn test_custom_classifier_table() {
    let store = store().with_classifier(ErrorClassifier::empty());
    store
        .set_index("users", doc! { "email": 1 }, IndexOptions { unique: true, name: None })
        .await;
    store.insert("users", doc! { "email": "a@b.c" }).await.unwrap();

    let error = store.insert("users", doc! { "email": "a@b.c" }).await.unwrap_err();

    assert_eq!(error.kind(), StoreErrorKind::StorageError);
    assert_eq!(error.failure().unwrap().code, Some(11000));
}

#[tokio::test]
async fn test_update_strips_id_and_wraps_plain_data() {
    let store = store();
    let course = store.insert("courses", doc! { "title": "Old" }).await.unwrap();
    let id = course.get_object_id("_id").unwrap();

    let updated = store
        .update(
            "courses",
            QueryDescriptor::new(doc! { "_id": id.to_hex() }),
            doc! { "_id": ObjectId::new(), "title": "New", "ownerId": OWNER },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.get_object_id("_id").unwrap(), id);
    assert_eq!(updated.get_str("title").unwrap(), "New");
    assert!(updated.get_object_id("ownerId").is_ok());
}

#[tokio::test]
async fn test_update_without_match_returns_none() {
    let store = store();

    let updated = store
        .update("courses", QueryDescriptor::new(doc! { "title": "Missing" }), doc! { "title": "New" })
        .await
        .unwrap();

    assert!(updated.is_none());
}

#[tokio::test]
async fn test_unsetting_id_is_an_immutable_field_violation() {
    let store = store();
    store.insert("courses", doc! { "title": "Intro" }).await.unwrap();

    let error = store
        .update(
            "courses",
            QueryDescriptor::new(doc! { "title": "Intro" }),
            doc! { "$unset": { "_id": "" } },
        )
        .await
        .unwrap_err();

    assert_eq!(error.kind(), StoreErrorKind::ImmutableFieldViolation);
    assert_eq!(error.failure().unwrap().field.as_deref(), Some("_id"));
    assert_eq!(error.failure().unwrap().action, StoreAction::Update);
}

#[tokio::test]
async fn test_mixed_update_is_invalid_data() {
    let store = store();

    let error = store
        .update(
            "courses",
            QueryDescriptor::new(doc! { "title": "Intro" }),
            doc! { "$set": { "title": "New" }, "draft": true },
        )
        .await
        .unwrap_err();

    assert_eq!(error.kind(), StoreErrorKind::InvalidData);
}

#[tokio::test]
async fn test_replace_keeps_matched_id() {
    let store = store();
    let course = store
        .insert("courses", doc! { "title": "Old", "draft": true })
        .await
        .unwrap();
    let id = course.get_object_id("_id").unwrap();

    let replaced = store
        .replace(
            "courses",
            QueryDescriptor::new(doc! { "_id": id }),
            doc! { "_id": ObjectId::new(), "title": "New", "ownerId": OWNER, "editors": [{ "userId": OWNER }] },
        )
        .await
        .unwrap()
        .unwrap();

    let owner = OWNER.parse::<ObjectId>().unwrap();
    assert_eq!(
        replaced,
        doc! { "_id": id, "title": "New", "ownerId": owner, "editors": [{ "userId": owner }] }
    );
}

#[tokio::test]
async fn test_delete_and_delete_many_report_counts() {
    let store = store();
    for title in ["a", "b", "c"] {
        store
            .insert("courses", doc! { "title": title, "ownerId": OWNER })
            .await
            .unwrap();
    }

    assert_eq!(
        store.delete("courses", QueryDescriptor::new(doc! { "title": "a" })).await.unwrap(),
        1
    );
    assert_eq!(
        store.delete("courses", QueryDescriptor::new(doc! { "title": "a" })).await.unwrap(),
        0
    );
    assert_eq!(
        store
            .delete_many("courses", QueryDescriptor::new(doc! { "ownerId": OWNER.parse::<ObjectId>().unwrap() }))
            .await
            .unwrap(),
        2
    );
    assert_eq!(store.driver().count("courses").await, 0);
}

#[tokio::test]
async fn test_find_applies_normalized_options() {
    let store = store();
    for (title, position) in [("b", 2), ("a", 1), ("c", 3)] {
        store
            .insert("courses", doc! { "title": title, "position": position, "body": "..." })
            .await
            .unwrap();
    }

    let query = QueryDescriptor::from_json(json!({
        "fieldsMatching": {},
        "limitResultsTo": "2",
        "startResultsFrom": "1",
        "sortResultsBy": { "position": "desc" },
        "includeFields": "title",
    }))
    .unwrap();

    let courses = store.find("courses", query).await.unwrap();
    let titles = courses
        .iter()
        .map(|course| course.get_str("title").unwrap())
        .collect::<Vec<_>>();

    assert_eq!(titles, ["b", "a"]);
    assert!(courses.iter().all(|course| course.contains_key("_id")));
    assert!(courses.iter().all(|course| !course.contains_key("body")));
}

#[tokio::test]
async fn test_find_by_string_id() {
    let store = store();
    let course = store.insert("courses", doc! { "title": "Intro" }).await.unwrap();
    let id = course.get_object_id("_id").unwrap();

    let found = store
        .find("courses", QueryDescriptor::new(doc! { "_id": id.to_hex() }))
        .await
        .unwrap();

    assert_eq!(found, vec![course]);
}

#[tokio::test]
async fn test_find_populates_registered_relations() {
    let store = store().with_relation("author", "users");
    let alice = store.insert("users", doc! { "name": "Alice" }).await.unwrap();
    let alice_id = alice.get_object_id("_id").unwrap();

    store
        .insert("courses", doc! { "title": "Intro", "author": alice_id.to_hex(), "editor": alice_id })
        .await
        .unwrap();
    store
        .insert("courses", doc! { "title": "Orphan", "author": ObjectId::new() })
        .await
        .unwrap();

    let query = QueryDescriptor::builder()
        .match_criteria(doc! {})
        .sort("title", SortDirection::Asc)
        .expand("author")
        .expand("editor")
        .build();
    let courses = store.find("courses", query).await.unwrap();

    assert_eq!(courses[0].get_document("author").unwrap(), &alice);
    // no relation is registered for editor, so it stays an identifier
    assert_eq!(courses[0].get_object_id("editor").unwrap(), alice_id);
    assert_eq!(courses[1].get("author"), Some(&Bson::Null));
}

#[tokio::test]
async fn test_malformed_id_criterion_is_rejected() {
    let store = store();

    let error = store
        .find("courses", QueryDescriptor::new(doc! { "_id": "not-an-id" }))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), StoreErrorKind::InvalidIdentifier);
}

#[tokio::test]
async fn test_missing_match_criteria_is_rejected() {
    let store = store();

    let error = store
        .delete_many("courses", QueryDescriptor::default())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), StoreErrorKind::InvalidQuery);
}

#[tokio::test]
async fn test_index_failures_are_swallowed() {
    let store = store();
    store.insert("users", doc! { "email": "a@b.c" }).await.unwrap();
    store.insert("users", doc! { "email": "a@b.c" }).await.unwrap();

    store
        .set_index("users", doc! { "email": 1 }, IndexOptions { unique: true, name: None })
        .await;
    store.set_index("users", doc! {}, IndexOptions::default()).await;

    assert_eq!(store.driver().index_names("users").await, ["_id_"]);
    assert_eq!(store.driver().count("users").await, 2);
}

#[tokio::test]
async fn test_builder_registers_keywords() {
    let mut keywords = KeywordSet::new();

    let store = DataStore::builder(InMemoryDriverBuilder::new())
        .relation("author", "users")
        .build(&mut keywords)
        .await
        .unwrap();

    assert!(store.is_ready().await);
    assert!(keywords.contains("isObjectId"));
    assert!(keywords.contains("isDate"));

    let mut parent = doc! { "courseId": OWNER, "publishedAt": "2024-03-01" };
    assert_eq!(keywords.check("isObjectId", &mut parent, "courseId"), Some(true));
    assert_eq!(keywords.check("isDate", &mut parent, "publishedAt"), Some(true));
    assert!(parent.get_object_id("courseId").is_ok());
    assert!(parent.get_datetime("publishedAt").is_ok());

    store.shutdown().await.unwrap();
}

#[derive(Debug)]
struct UnreachableDriverBuilder;

#[async_trait]
impl StoreDriverBuilder for UnreachableDriverBuilder {
    type Driver = InMemoryDriver;

    async fn build(self) -> DriverResult<InMemoryDriver> {
        Err(DriverError::new(None, "server selection timed out"))
    }
}

#[tokio::test]
async fn test_builder_connection_failure() {
    let mut keywords = KeywordSet::new();

    let error = DataStore::builder(UnreachableDriverBuilder)
        .build(&mut keywords)
        .await
        .unwrap_err();

    assert_eq!(error.kind(), StoreErrorKind::ConnectionFailure);
    assert!(error.to_string().contains("server selection timed out"));
    assert!(keywords.is_empty());
}

#[tokio::test]
async fn test_json_payloads() {
    #[derive(Debug, PartialEq, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Course {
        title: String,
        owner_id: ObjectId,
    }

    let store = store();
    let course = store
        .insert("courses", payload_from_json(json!({ "title": "Intro", "ownerId": OWNER })).unwrap())
        .await
        .unwrap();

    let course: Course = from_payload(course).unwrap();
    assert_eq!(course.owner_id.to_hex(), OWNER);

    let error = payload_from_json(json!(["not", "an", "object"])).unwrap_err();
    assert_eq!(error.kind(), StoreErrorKind::InvalidData);
}
