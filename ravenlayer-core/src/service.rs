//! Database-level service: lifecycle and untyped CRUD.
//!
//! [`DatabaseService`] owns a [`StoreBackend`] and the name of the database it works in.
//! Each operation opens one session, performs one unit of work, commits if it mutated
//! anything and drops the session, on error paths as well.
//!
//! Documents at this level are untyped: `store` accepts anything serializable, loads
//! deserialize into whatever the caller asks for (typically
//! [`UntypedDocument`](crate::document::UntypedDocument)) and `update` merges a field map.
//! For a typed view of one collection, wrap the service in a
//! [`CollectionService`](crate::collection::CollectionService).
//!
//! # Example
//!
//! ```ignore
//! use ravenlayer::{prelude::*, memory::InMemoryStore};
//! use serde_json::json;
//!
//! let db = DatabaseService::new(InMemoryStore::new(), "ExampleDB");
//! db.init().await?;
//!
//! db.store("users/1", &json!({ "name": "John", "age": 30 })).await?;
//!
//! let mut updates = UntypedDocument::new();
//! updates.insert("age".into(), json!(31));
//! db.update("users/1", updates).await?;
//!
//! let user: Option<UntypedDocument> = db.load_by_id("users/1").await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use tracing::{debug, info, warn};

use crate::{
    backend::{DocumentSession, StoreBackend},
    document::{UntypedDocument, into_untyped, to_document_value},
    error::{DocumentStoreError, DocumentStoreResult, ResultExt},
};

/// Replication factor requested when [`DatabaseService::init`] creates the database.
pub const REPLICATION_FACTOR: u32 = 1;

/// Access to a backend and the database to open sessions against.
///
/// This is the capability [`CollectionService`](crate::collection::CollectionService) and the
/// free query functions are written against. [`DatabaseService`] implements it.
#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    /// The backend behind this handle.
    type Backend: StoreBackend;

    /// Returns the underlying backend.
    fn backend(&self) -> &Self::Backend;

    /// Returns the name of the database sessions are opened against.
    fn database(&self) -> &str;

    /// Opens a session against [`DatabaseHandle::database`].
    async fn open_session(
        &self,
    ) -> DocumentStoreResult<<Self::Backend as StoreBackend>::Session> {
        self.backend()
            .open_session(self.database())
            .await
            .context("failed to open session")
    }
}

#[async_trait]
impl<H> DatabaseHandle for &H
where
    H: DatabaseHandle,
{
    type Backend = H::Backend;

    fn backend(&self) -> &Self::Backend {
        (*self).backend()
    }

    fn database(&self) -> &str {
        (*self).database()
    }
}

/// Whether a status check could open a session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Descriptive status of the database, as returned by
/// [`DatabaseService::get_database_status`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStatus {
    pub database_name: String,
    pub status: ConnectionState,
    pub session_active: bool,
    /// Always `0`; the statistics response is not inspected.
    pub document_count: u64,
    /// Always `0`; the statistics response is not inspected.
    pub index_count: u64,
    /// Set when the statistics request failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics_error: Option<String>,
}

/// Owns a backend handle and the name of the database to work in.
///
/// # Type Parameters
///
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct DatabaseService<B: StoreBackend> {
    backend: B,
    database: String,
}

impl<B: StoreBackend> DatabaseHandle for DatabaseService<B> {
    type Backend = B;

    fn backend(&self) -> &B {
        &self.backend
    }

    fn database(&self) -> &str {
        &self.database
    }
}

impl<B: StoreBackend> DatabaseService<B> {
    /// Creates a service working in `database` through `backend`.
    pub fn new(backend: B, database: impl Into<String>) -> Self {
        Self {
            backend,
            database: database.into(),
        }
    }

    /// Makes sure the database exists and is reachable.
    ///
    /// Creation is attempted with a replication factor of 1. Any creation failure,
    /// including the database already existing, is logged and otherwise ignored. A
    /// session is then opened and closed to confirm the database can be reached.
    ///
    /// # Errors
    ///
    /// Returns a connectivity error if the confirming session cannot be opened.
    pub async fn init(&self) -> DocumentStoreResult<()> {
        info!(
            urls = ?self.backend.urls(),
            database = %self.database,
            "initializing database connection"
        );

        match self
            .backend
            .create_database(&self.database, REPLICATION_FACTOR)
            .await
        {
            Ok(()) => info!(database = %self.database, "created database"),
            Err(err) if matches!(err.root(), DocumentStoreError::DatabaseAlreadyExists(_)) => {
                info!(database = %self.database, "database already exists")
            }
            Err(err) => warn!(
                database = %self.database,
                error = %err,
                "database creation failed, continuing"
            ),
        }

        let session = self
            .backend
            .open_session(&self.database)
            .await
            .map_err(|err| {
                err.context(format!(
                    "failed to open session to database '{}'",
                    self.database
                ))
            })?;
        drop(session);

        info!(database = %self.database, "connected to database");

        Ok(())
    }

    /// Runs [`DatabaseService::init`], then, if `seed_data` is set, checks whether the
    /// database holds any documents and logs the outcome.
    ///
    /// No seeding happens here; callers seed their own data. A failing emptiness check is
    /// logged and does not fail the call.
    pub async fn initialize_with_seeding(&self, seed_data: bool) -> DocumentStoreResult<()> {
        self.init()
            .await
            .context("database initialization failed")?;

        if seed_data {
            match self.is_database_empty().await {
                Ok(true) => info!(
                    database = %self.database,
                    "database is empty, seeding is left to the caller"
                ),
                Ok(false) => info!(
                    database = %self.database,
                    "database contains data, skipping seeding"
                ),
                Err(err) => warn!(
                    database = %self.database,
                    error = %err,
                    "could not check whether the database is empty"
                ),
            }
        }

        Ok(())
    }

    async fn is_database_empty(&self) -> DocumentStoreResult<bool> {
        let _session = self.open_session().await?;

        let statistics = self
            .backend
            .database_statistics(&self.database)
            .await
            .context("failed to get database statistics")?;

        Ok(statistics.document_count == 0)
    }

    /// Releases the backend handle.
    pub async fn close(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }

    /// Reports whether the database can be reached.
    ///
    /// The document and index counts are placeholders and always `0`.
    ///
    /// # Errors
    ///
    /// Returns a connectivity error if no session can be opened.
    pub async fn get_database_status(&self) -> DocumentStoreResult<DatabaseStatus> {
        let session = self.open_session().await;

        if let Err(err) = &session {
            warn!(
                database = %self.database,
                status = %ConnectionState::Disconnected,
                error = %err,
                "database status check failed"
            );
        }
        let _session = session?;

        let statistics_error = self
            .backend
            .database_statistics(&self.database)
            .await
            .err()
            .map(|err| {
                debug!(database = %self.database, error = %err, "failed to get statistics");
                "failed to get statistics".to_string()
            });

        Ok(DatabaseStatus {
            database_name: self.database.clone(),
            status: ConnectionState::Connected,
            session_active: true,
            document_count: 0,
            index_count: 0,
            statistics_error,
        })
    }

    /// Stores a document under `id`, or under a store-assigned identity if `id` is empty.
    pub async fn store<D>(&self, id: &str, document: &D) -> DocumentStoreResult<()>
    where
        D: Serialize + Sync + ?Sized,
    {
        debug!(database = %self.database, id, "store");

        let mut session = self.open_session().await?;
        session
            .store(non_empty(id), None, to_document_value(document)?)
            .context("failed to store document")?;
        session
            .save_changes()
            .await
            .context("failed to save changes")
    }

    /// Stores every `(id, document)` pair and commits them together.
    ///
    /// If staging any document fails, nothing from the batch is committed.
    pub async fn store_multiple<I, D>(&self, documents: I) -> DocumentStoreResult<()>
    where
        I: IntoIterator<Item = (String, D)>,
        D: Serialize,
    {
        let documents = documents
            .into_iter()
            .map(|(id, document)| Ok((id, to_document_value(&document)?)))
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        debug!(database = %self.database, count = documents.len(), "store multiple");

        let mut session = self.open_session().await?;
        for (id, document) in documents {
            session
                .store(non_empty(&id), None, document)
                .map_err(|err| err.context(format!("failed to store document with ID {id}")))?;
        }

        session
            .save_changes()
            .await
            .context("failed to save changes")
    }

    /// Loads the document stored under `id`, or `None` if there is none.
    pub async fn load_by_id<D: DeserializeOwned>(&self, id: &str) -> DocumentStoreResult<Option<D>> {
        debug!(database = %self.database, id, "load");

        let mut session = self.open_session().await?;
        match session.load(id).await.context("failed to load document")? {
            Some(value) => Ok(Some(
                serde_json::from_value(value).map_err(DocumentStoreError::from)?,
            )),
            None => Ok(None),
        }
    }

    /// Loads each id in turn and appends the documents that exist to `out`.
    pub async fn load_multiple_by_ids<D, S, E>(
        &self,
        ids: &[S],
        out: &mut E,
    ) -> DocumentStoreResult<()>
    where
        D: DeserializeOwned,
        S: AsRef<str> + Sync,
        E: Extend<D> + Send,
    {
        debug!(database = %self.database, count = ids.len(), "load multiple");

        let mut session = self.open_session().await?;
        for id in ids {
            let id = id.as_ref();
            let loaded = session
                .load(id)
                .await
                .map_err(|err| err.context(format!("failed to load document {id}")))?;

            if let Some(value) = loaded {
                out.extend(Some(serde_json::from_value::<D>(value)?));
            }
        }

        Ok(())
    }

    /// Overwrites the fields named in `updates` on the document stored under `id`,
    /// leaving every other field as it was.
    ///
    /// The load, merge and store happen in one session but are not isolated from
    /// concurrent writers.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentNotFound`] if there is no such document.
    pub async fn update(&self, id: &str, updates: UntypedDocument) -> DocumentStoreResult<()> {
        debug!(database = %self.database, id, fields = updates.len(), "update");

        let mut session = self.open_session().await?;
        let value = session
            .load(id)
            .await
            .context("failed to load document for update")?
            .ok_or_else(|| DocumentStoreError::DocumentNotFound(id.to_string()))?;

        let mut document = into_untyped(id, value)?;
        document.extend(updates);

        session
            .store(Some(id), None, document.into())
            .context("failed to store updated document")?;
        session
            .save_changes()
            .await
            .context("failed to save changes")
    }

    /// Deletes the document stored under `id`.
    ///
    /// Whether deleting a missing document is an error is up to the backend.
    pub async fn delete(&self, id: &str) -> DocumentStoreResult<()> {
        debug!(database = %self.database, id, "delete");

        let mut session = self.open_session().await?;
        session.delete(id);
        session
            .save_changes()
            .await
            .context("failed to save changes")
    }

    /// Deletes every document in `ids` in one commit.
    pub async fn delete_multiple<S>(&self, ids: &[S]) -> DocumentStoreResult<()>
    where
        S: AsRef<str> + Sync,
    {
        debug!(database = %self.database, count = ids.len(), "delete multiple");

        let mut session = self.open_session().await?;
        for id in ids {
            session.delete(id.as_ref());
        }

        session
            .save_changes()
            .await
            .context("failed to save changes")
    }

    /// Returns `true` if a document is stored under `id`.
    ///
    /// This loads the document; it is not a metadata-only check.
    pub async fn exists(&self, id: &str) -> DocumentStoreResult<bool> {
        let mut session = self.open_session().await?;

        Ok(session
            .load(id)
            .await
            .context("failed to check document existence")?
            .is_some_and(|value| !value.is_null()))
    }

    /// Counts the documents in a collection.
    ///
    /// Not implemented: a session is opened to check connectivity and `0` is returned.
    /// Use [`CollectionService::count`](crate::collection::CollectionService::count) for a
    /// (capped) count.
    pub async fn count_documents(&self, collection: &str) -> DocumentStoreResult<usize> {
        let _session = self.open_session().await?;

        debug!(
            database = %self.database,
            collection,
            "document counting is not implemented, returning 0"
        );

        Ok(0)
    }
}

fn non_empty(id: &str) -> Option<&str> {
    (!id.is_empty()).then_some(id)
}
