//! In-memory storage implementation of the store backend.
//!
//! This module provides a simple in-process backend that keeps databases of JSON
//! documents in HashMaps behind async-safe read-write locks, and sessions that stage
//! changes until they are saved.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use serde_json::{Value, json};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;
use uuid::Uuid;

use ravenlayer_core::{
    backend::{DatabaseStatistics, DocumentSession, EMPTY_COLLECTION, StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    query::RawQuery,
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, get_path},
    parser,
};

const METADATA: &str = "@metadata";
const METADATA_COLLECTION: &str = "@collection";

/// A stored document: its collection, body and a change counter used for result order.
#[derive(Debug, Clone)]
struct StoredDocument {
    collection: String,
    body: Value,
    etag: u64,
}

impl StoredDocument {
    /// The body as the query engine sees it, with `@metadata` describing the document.
    fn indexed_view(&self, id: &str) -> Value {
        let mut view = self.body.clone();
        if let Value::Object(map) = &mut view {
            map.insert(
                METADATA.to_string(),
                json!({ METADATA_COLLECTION: self.collection, "@id": id }),
            );
        }
        view
    }
}

#[derive(Debug, Default)]
struct Database {
    documents: HashMap<String, StoredDocument>,
    last_etag: u64,
}

type DatabaseMap = HashMap<String, Database>;

/// Thread-safe in-memory document database server.
///
/// This struct implements the [`StoreBackend`] trait to provide a fully functional
/// document store that operates entirely in memory using async-aware read-write locks.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Queries scan every document in the database (no indexing). Fine for development and
/// tests, not meant for large datasets.
///
/// # Example
///
/// ```ignore
/// use ravenlayer_memory::InMemoryStore;
/// use ravenlayer::backend::{StoreBackend, DocumentSession};
/// use serde_json::json;
///
/// let store = InMemoryStore::new();
/// store.create_database("ExampleDB", 1).await?;
///
/// let mut session = store.open_session("ExampleDB").await?;
/// session.store(Some("users/1"), Some("Users"), json!({ "name": "Alice" }))?;
/// session.save_changes().await?;
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    databases: Arc<RwLock<DatabaseMap>>,
    urls: Vec<String>,
}

impl InMemoryStore {
    /// Creates a new store with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryStore` with custom options.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use ravenlayer_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder()
    ///     .with_database("ExampleDB")
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Returns the names of every database in the store.
    pub async fn database_names(&self) -> Vec<String> {
        let mut names = self
            .databases
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    type Session = InMemorySession;

    async fn open_session(&self, database: &str) -> DocumentStoreResult<Self::Session> {
        if !self.databases.read().await.contains_key(database) {
            return Err(DocumentStoreError::Connection(format!(
                "database '{database}' does not exist"
            )));
        }

        Ok(InMemorySession {
            databases: self.databases.clone(),
            database: database.to_string(),
            pending: Vec::new(),
        })
    }

    async fn create_database(&self, database: &str, _replication_factor: u32) -> DocumentStoreResult<()> {
        let mut databases = self.databases.write().await;

        if databases.contains_key(database) {
            return Err(DocumentStoreError::DatabaseAlreadyExists(database.to_string()));
        }

        databases.insert(database.to_string(), Database::default());
        Ok(())
    }

    async fn database_statistics(&self, database: &str) -> DocumentStoreResult<DatabaseStatistics> {
        let databases = self.databases.read().await;
        let db = databases
            .get(database)
            .ok_or_else(|| DocumentStoreError::Backend(format!("database '{database}' does not exist")))?;

        Ok(DatabaseStatistics {
            document_count: db.documents.len() as u64,
            index_count: 0,
        })
    }

    fn urls(&self) -> &[String] {
        &self.urls
    }
}

#[derive(Debug)]
enum PendingChange {
    Store {
        collection: Option<String>,
        body: Value,
    },
    Delete,
}

/// A unit of work against one in-memory database.
///
/// Stores and deletes are staged in the session, visible to its own loads, and applied
/// under a single write lock by [`DocumentSession::save_changes`].
#[derive(Debug)]
pub struct InMemorySession {
    databases: Arc<RwLock<DatabaseMap>>,
    database: String,
    pending: Vec<(String, PendingChange)>,
}

impl InMemorySession {
    fn stage(&mut self, id: String, change: PendingChange) {
        self.pending.retain(|(staged, _)| *staged != id);
        self.pending.push((id, change));
    }

    fn staged(&self, id: &str) -> Option<&PendingChange> {
        self.pending
            .iter()
            .find(|(staged, _)| staged == id)
            .map(|(_, change)| change)
    }
}

/// Splits `@metadata.@collection` out of a document body, removing the metadata.
fn take_metadata_collection(body: &mut Value) -> Option<String> {
    let metadata = body.as_object_mut()?.remove(METADATA)?;

    metadata
        .get(METADATA_COLLECTION)
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl DocumentSession for InMemorySession {
    fn store(&mut self, id: Option<&str>, collection: Option<&str>, mut document: Value) -> DocumentStoreResult<()> {
        if !document.is_object() {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "expected a JSON object, found {document}"
            )));
        }

        let collection = collection
            .map(str::to_string)
            .or_else(|| take_metadata_collection(&mut document));
        if let Value::Object(map) = &mut document {
            map.remove(METADATA);
        }

        let id = match id {
            Some(id) => id.to_string(),
            None => match &collection {
                Some(collection) => format!("{}/{}", collection.to_lowercase(), Uuid::new_v4()),
                None => Uuid::new_v4().to_string(),
            },
        };

        self.stage(id, PendingChange::Store { collection, body: document });
        Ok(())
    }

    async fn load(&mut self, id: &str) -> DocumentStoreResult<Option<Value>> {
        match self.staged(id) {
            Some(PendingChange::Store { body, .. }) => return Ok(Some(body.clone())),
            Some(PendingChange::Delete) => return Ok(None),
            None => {}
        }

        let databases = self.databases.read().await;
        let db = databases
            .get(&self.database)
            .ok_or_else(|| DocumentStoreError::Connection(format!("database '{}' does not exist", self.database)))?;

        Ok(db.documents.get(id).map(|document| document.body.clone()))
    }

    fn delete(&mut self, id: &str) {
        self.stage(id.to_string(), PendingChange::Delete);
    }

    async fn raw_query(&mut self, query: &RawQuery) -> DocumentStoreResult<Vec<Value>> {
        let parsed = parser::parse(query)?;

        let databases = self.databases.read().await;
        let db = databases
            .get(&self.database)
            .ok_or_else(|| DocumentStoreError::Connection(format!("database '{}' does not exist", self.database)))?;

        let mut matches = Vec::new();
        for (id, document) in &db.documents {
            let view = document.indexed_view(id);
            let keep = match &parsed.filter {
                Some(filter) => DocumentEvaluator::new(&view).evaluate(filter)?,
                None => true,
            };

            if keep {
                matches.push((document.etag, view));
            }
        }

        // Unordered queries come back in write order.
        matches.sort_by_key(|(etag, _)| *etag);
        let mut matches = matches
            .into_iter()
            .map(|(_, view)| view)
            .collect::<Vec<_>>();

        if !parsed.order_by.is_empty() {
            matches.sort_by(|a, b| {
                parsed
                    .order_by
                    .iter()
                    .map(|(path, descending)| {
                        let left = get_path(a, path).map(Comparable::from).unwrap_or(Comparable::Null);
                        let right = get_path(b, path).map(Comparable::from).unwrap_or(Comparable::Null);
                        let ordering = left.sort_cmp(&right);

                        if *descending { ordering.reverse() } else { ordering }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        debug!(database = %self.database, query = %query.text, matched = matches.len(), "in-memory query");

        Ok(matches
            .into_iter()
            .skip(parsed.skip)
            .take(parsed.take.unwrap_or(usize::MAX))
            .map(|mut view| {
                if let Value::Object(map) = &mut view {
                    map.remove(METADATA);
                }
                view
            })
            .collect())
    }

    async fn save_changes(&mut self) -> DocumentStoreResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut databases = self.databases.write().await;
        let db = databases
            .get_mut(&self.database)
            .ok_or_else(|| DocumentStoreError::Connection(format!("database '{}' does not exist", self.database)))?;

        for (id, change) in self.pending.drain(..) {
            match change {
                PendingChange::Store { collection, body } => {
                    let collection = collection
                        .or_else(|| db.documents.get(&id).map(|existing| existing.collection.clone()))
                        .unwrap_or_else(|| EMPTY_COLLECTION.to_string());

                    db.last_etag += 1;
                    db.documents.insert(id, StoredDocument {
                        collection,
                        body,
                        etag: db.last_etag,
                    });
                },
                PendingChange::Delete => {
                    db.documents.remove(&id);
                },
            }
        }

        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use ravenlayer_memory::InMemoryStore;
/// use ravenlayer::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder()
///     .with_url("memory://local")
///     .with_database("ExampleDB")
///     .build()
///     .await?;
/// ```
#[derive(Default, Debug)]
pub struct InMemoryStoreBuilder {
    urls: Vec<String>,
    databases: Vec<String>,
}

impl InMemoryStoreBuilder {
    /// Adds a URL to report from [`StoreBackend::urls`].
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    /// Creates the named database up front.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.databases.push(database.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let databases = self
            .databases
            .into_iter()
            .map(|name| (name, Database::default()))
            .collect::<DatabaseMap>();

        Ok(InMemoryStore {
            databases: Arc::new(RwLock::new(databases)),
            urls: self.urls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store_with_db() -> InMemoryStore {
        InMemoryStore::builder()
            .with_database("Test")
            .build()
            .await
            .unwrap()
    }

    async fn collection_of(store: &InMemoryStore, id: &str) -> String {
        store.databases.read().await["Test"].documents[id].collection.clone()
    }

    #[tokio::test]
    async fn create_database_twice_reports_already_exists() {
        let store = InMemoryStore::new();

        store.create_database("Test", 1).await.unwrap();
        let err = store.create_database("Test", 1).await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::DatabaseAlreadyExists(name) if name == "Test"));
        assert_eq!(store.database_names().await, vec!["Test".to_string()]);
    }

    #[tokio::test]
    async fn sessions_need_an_existing_database() {
        let err = InMemoryStore::new().open_session("Missing").await.unwrap_err();

        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn changes_are_invisible_until_saved() {
        let store = store_with_db().await;

        let mut writer = store.open_session("Test").await.unwrap();
        writer.store(Some("items/1"), Some("Items"), json!({ "n": 1 })).unwrap();
        assert_eq!(writer.load("items/1").await.unwrap(), Some(json!({ "n": 1 })));

        let mut reader = store.open_session("Test").await.unwrap();
        assert_eq!(reader.load("items/1").await.unwrap(), None);

        writer.save_changes().await.unwrap();
        assert_eq!(reader.load("items/1").await.unwrap(), Some(json!({ "n": 1 })));
    }

    #[tokio::test]
    async fn dropped_sessions_discard_staged_changes() {
        let store = store_with_db().await;

        {
            let mut session = store.open_session("Test").await.unwrap();
            session.store(Some("items/1"), None, json!({})).unwrap();
        }

        let stats = store.database_statistics("Test").await.unwrap();
        assert_eq!(stats.document_count, 0);
    }

    #[tokio::test]
    async fn storing_without_a_collection_keeps_the_existing_one() {
        let store = store_with_db().await;

        let mut session = store.open_session("Test").await.unwrap();
        session.store(Some("users/1"), Some("Users"), json!({ "a": 1 })).unwrap();
        session.store(Some("misc/1"), None, json!({ "b": 1 })).unwrap();
        session
            .store(Some("tagged/1"), None, json!({ "c": 1, "@metadata": { "@collection": "Tags" } }))
            .unwrap();
        session.save_changes().await.unwrap();

        session.store(Some("users/1"), None, json!({ "a": 2 })).unwrap();
        session.save_changes().await.unwrap();

        assert_eq!(collection_of(&store, "users/1").await, "Users");
        assert_eq!(collection_of(&store, "misc/1").await, EMPTY_COLLECTION);
        assert_eq!(collection_of(&store, "tagged/1").await, "Tags");
        assert_eq!(session.load("tagged/1").await.unwrap(), Some(json!({ "c": 1 })));
    }

    #[tokio::test]
    async fn stores_without_an_id_get_a_collection_prefixed_identity() {
        let store = store_with_db().await;

        let mut session = store.open_session("Test").await.unwrap();
        session.store(None, Some("Users"), json!({ "name": "x" })).unwrap();
        session.save_changes().await.unwrap();

        let ids = store.databases.read().await["Test"]
            .documents
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(ids.len(), 1);
        assert!(ids[0].starts_with("users/"));
    }

    #[tokio::test]
    async fn non_object_documents_are_rejected() {
        let store = store_with_db().await;
        let mut session = store.open_session("Test").await.unwrap();

        let err = session.store(Some("x"), None, json!([1, 2])).unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn queries_filter_by_collection_and_page_in_order() {
        let store = store_with_db().await;

        let mut session = store.open_session("Test").await.unwrap();
        for (id, age) in [("users/1", 40), ("users/2", 20), ("users/3", 30)] {
            session.store(Some(id), Some("Users"), json!({ "age": age })).unwrap();
        }
        session.store(Some("orders/1"), Some("Orders"), json!({ "age": 1 })).unwrap();
        session.save_changes().await.unwrap();

        let unordered = session
            .raw_query(&RawQuery::new("from @all_docs where @metadata.'@collection' = 'Users'"))
            .await
            .unwrap();
        assert_eq!(unordered, vec![json!({ "age": 40 }), json!({ "age": 20 }), json!({ "age": 30 })]);

        let page = session
            .raw_query(&RawQuery::new(
                "from @all_docs where @metadata.'@collection' = 'Users' ORDER BY age DESC LIMIT 1, 2",
            ))
            .await
            .unwrap();
        assert_eq!(page, vec![json!({ "age": 30 }), json!({ "age": 20 })]);
    }

    #[tokio::test]
    async fn malformed_queries_surface_as_query_errors() {
        let store = store_with_db().await;
        let mut session = store.open_session("Test").await.unwrap();

        let err = session.raw_query(&RawQuery::new("from @all_docs where")).await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::Query(_)));
    }

    #[tokio::test]
    async fn statistics_count_documents() {
        let store = store_with_db().await;

        let mut session = store.open_session("Test").await.unwrap();
        session.store(Some("a"), None, json!({})).unwrap();
        session.store(Some("b"), None, json!({})).unwrap();
        session.delete("a");
        session.save_changes().await.unwrap();

        assert_eq!(
            store.database_statistics("Test").await.unwrap(),
            DatabaseStatistics { document_count: 1, index_count: 0 }
        );
        assert!(store.database_statistics("Missing").await.is_err());
    }
}
