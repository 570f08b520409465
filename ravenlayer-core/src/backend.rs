//! Storage backend abstraction for the document store.
//!
//! This module defines the contract this layer consumes from the underlying document
//! database client. The layer never talks to a server itself: it opens a session,
//! performs one unit of work through it and lets it go.
//!
//! # Traits
//!
//! - [`StoreBackend`]: A connected handle to a document database server
//! - [`DocumentSession`]: A unit-of-work scoped to one database
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use ravenlayer::backend::{StoreBackend, DocumentSession};
//! use serde_json::json;
//!
//! let backend = MyBackendImpl::new();
//!
//! let mut session = backend.open_session("Northwind").await?;
//! session.store(Some("users/1"), Some("Users"), json!({ "name": "Alice" }))?;
//! session.save_changes().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;

use crate::{error::DocumentStoreResult, query::RawQuery};

/// Collection assigned to documents stored without one.
pub const EMPTY_COLLECTION: &str = "@empty";

/// Counters reported by a statistics request against one database.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseStatistics {
    /// Number of documents in the database.
    pub document_count: u64,
    /// Number of indexes defined on the database.
    pub index_count: u64,
}

/// Abstract interface for a connected document database client.
///
/// # Thread Safety
///
/// Implementations must be safe to share between tasks. Whether opening sessions
/// concurrently is safe beyond that is up to the implementation; this layer adds no
/// synchronization of its own.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// Failing to reach the server must be reported as
/// [`DocumentStoreError::Connection`](crate::error::DocumentStoreError::Connection).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// The session type handed out by [`StoreBackend::open_session`].
    type Session: DocumentSession;

    /// Opens a session scoped to the named database.
    ///
    /// The session is released when it is dropped.
    async fn open_session(&self, database: &str) -> DocumentStoreResult<Self::Session>;

    /// Asks the server to create a database.
    ///
    /// # Arguments
    ///
    /// * `database` - The name of the database to create
    /// * `replication_factor` - Number of nodes the database should be replicated to
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` on success, or
    /// [`DocumentStoreError::DatabaseAlreadyExists`](crate::error::DocumentStoreError::DatabaseAlreadyExists)
    /// if a database of that name is already present.
    async fn create_database(
        &self,
        database: &str,
        replication_factor: u32,
    ) -> DocumentStoreResult<()>;

    /// Fetches statistics for the named database.
    async fn database_statistics(&self, database: &str) -> DocumentStoreResult<DatabaseStatistics>;

    /// Returns the server URLs this backend was configured with.
    fn urls(&self) -> &[String];

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends holding connections
    /// should override this.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// A unit of work against one database.
///
/// Stores and deletes are staged in the session and only reach the database on
/// [`DocumentSession::save_changes`], which commits them as a single batch. Dropping a
/// session without saving discards the staged changes.
#[async_trait]
pub trait DocumentSession: Send {
    /// Stages a document for storage.
    ///
    /// # Arguments
    ///
    /// * `id` - The document identity, or `None` to let the store assign one
    /// * `collection` - The collection to tag the document with. When `None`, an existing
    ///   document keeps its collection and a new one takes the `@metadata.@collection`
    ///   value from its body, falling back to [`EMPTY_COLLECTION`].
    /// * `document` - The document body
    fn store(
        &mut self,
        id: Option<&str>,
        collection: Option<&str>,
        document: Value,
    ) -> DocumentStoreResult<()>;

    /// Loads a document by identity.
    ///
    /// Staged, unsaved changes in this session are visible to the load. Returns
    /// `Ok(None)` if no document has that identity.
    async fn load(&mut self, id: &str) -> DocumentStoreResult<Option<Value>>;

    /// Stages a document identity for deletion.
    fn delete(&mut self, id: &str);

    /// Executes a raw query and returns the matching documents.
    ///
    /// Entries may be `null` when the store cannot materialize a result.
    async fn raw_query(&mut self, query: &RawQuery) -> DocumentStoreResult<Vec<Value>>;

    /// Commits every staged store and delete.
    async fn save_changes(&mut self) -> DocumentStoreResult<()>;
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    type Session = B::Session;

    async fn open_session(&self, database: &str) -> DocumentStoreResult<Self::Session> {
        (*self).open_session(database).await
    }

    async fn create_database(
        &self,
        database: &str,
        replication_factor: u32,
    ) -> DocumentStoreResult<()> {
        (*self)
            .create_database(database, replication_factor)
            .await
    }

    async fn database_statistics(&self, database: &str) -> DocumentStoreResult<DatabaseStatistics> {
        (*self).database_statistics(database).await
    }

    fn urls(&self) -> &[String] {
        (*self).urls()
    }
}

/// Factory trait for constructing backends.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
