//! Typed, collection-scoped view over a database.
//!
//! [`CollectionService`] binds a borrowed [`DatabaseHandle`] to a collection name and a
//! document type. It re-exposes the CRUD and query operations of the database service,
//! but every store takes a `T` and every load or query hands back `T` values.
//!
//! # Example
//!
//! ```ignore
//! use ravenlayer::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! pub struct User {
//!     pub id: String,
//!     pub name: String,
//! }
//!
//! # async fn example() -> DocumentStoreResult<()> {
//! let db = DatabaseService::new(InMemoryStore::new(), "ExampleDB");
//! let users = CollectionService::<_, User>::new(&db, "Users");
//!
//! users.store("users/1", &User { id: "users/1".into(), name: "Alice".into() }).await?;
//! let alice = users.load_by_id("users/1").await?;
//! # Ok(()) }
//! ```

use serde_json::Value;
use std::marker::PhantomData;
use tracing::debug;

use crate::{
    backend::DocumentSession,
    document::{Document, DocumentExt},
    error::{DocumentStoreError, DocumentStoreResult, ResultExt},
    functions,
    page::GenericQueryResult,
    query::QueryOptions,
    service::DatabaseHandle,
};

/// A typed collection over a borrowed database handle.
///
/// The service does not own the database; it lives as long as the borrow it was built
/// from.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the database handle reference
/// * `H` - The database handle type
/// * `T` - The document type
#[derive(Debug)]
pub struct CollectionService<'a, H: DatabaseHandle, T: Document> {
    database: &'a H,
    collection: String,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, H: DatabaseHandle, T: Document> Clone for CollectionService<'a, H, T> {
    fn clone(&self) -> Self {
        Self {
            database: self.database,
            collection: self.collection.clone(),
            _marker: PhantomData,
        }
    }
}

impl<'a, H: DatabaseHandle, T: Document> CollectionService<'a, H, T> {
    /// Creates a collection service for `collection` over `database`.
    pub fn new(database: &'a H, collection: impl Into<String>) -> Self {
        Self {
            database,
            collection: collection.into(),
            _marker: PhantomData,
        }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.collection
    }

    /// Returns the database handle this collection works through.
    pub fn database(&self) -> &'a H {
        self.database
    }

    /// Stores `document` under `id`, or under a store-assigned identity if `id` is empty.
    pub async fn store(&self, id: &str, document: &T) -> DocumentStoreResult<()> {
        debug!(collection = %self.collection, id, "store");

        let mut session = self.database.open_session().await?;
        session
            .store(non_empty(id), Some(&self.collection), document.to_json()?)
            .context("failed to store document")?;
        session
            .save_changes()
            .await
            .context("failed to save changes")
    }

    /// Stores every `(id, document)` pair and commits them together.
    pub async fn store_multiple<I>(&self, documents: I) -> DocumentStoreResult<()>
    where
        I: IntoIterator<Item = (String, T)>,
    {
        let documents = documents
            .into_iter()
            .map(|(id, document)| Ok((id, document.to_json()?)))
            .collect::<DocumentStoreResult<Vec<(String, Value)>>>()?;

        debug!(collection = %self.collection, count = documents.len(), "store multiple");

        let mut session = self.database.open_session().await?;
        for (id, document) in documents {
            session
                .store(non_empty(&id), Some(&self.collection), document)
                .map_err(|err| err.context(format!("failed to store document with ID {id}")))?;
        }

        session
            .save_changes()
            .await
            .context("failed to save changes")
    }

    /// Loads the document stored under `id`, or `None` if there is none.
    pub async fn load_by_id(&self, id: &str) -> DocumentStoreResult<Option<T>> {
        debug!(collection = %self.collection, id, "load");

        let mut session = self.database.open_session().await?;
        session
            .load(id)
            .await
            .context("failed to load document")?
            .map(T::from_json)
            .transpose()
    }

    /// Loads each id in turn, returning the documents that exist in request order.
    pub async fn load_multiple_by_ids<S>(&self, ids: &[S]) -> DocumentStoreResult<Vec<T>>
    where
        S: AsRef<str> + Sync,
    {
        debug!(collection = %self.collection, count = ids.len(), "load multiple");

        let mut session = self.database.open_session().await?;
        let mut results = Vec::with_capacity(ids.len());

        for id in ids {
            let id = id.as_ref();
            let loaded = session
                .load(id)
                .await
                .map_err(|err| err.context(format!("failed to load document {id}")))?;

            if let Some(value) = loaded {
                results.push(T::from_json(value)?);
            }
        }

        Ok(results)
    }

    /// Replaces the document stored under `id` with `document`.
    ///
    /// No existence check is made: updating a missing id creates the document.
    pub async fn update(&self, id: &str, document: &T) -> DocumentStoreResult<()> {
        debug!(collection = %self.collection, id, "update");

        let mut session = self.database.open_session().await?;
        session
            .store(Some(id), Some(&self.collection), document.to_json()?)
            .context("failed to store updated document")?;
        session
            .save_changes()
            .await
            .context("failed to save changes")
    }

    /// Deletes the document stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentNotFound`] if there is no such document.
    pub async fn delete(&self, id: &str) -> DocumentStoreResult<()> {
        debug!(collection = %self.collection, id, "delete");

        let mut session = self.database.open_session().await?;
        if session
            .load(id)
            .await
            .context("failed to load document for deletion")?
            .is_none()
        {
            return Err(DocumentStoreError::DocumentNotFound(id.to_string()));
        }

        session.delete(id);
        session
            .save_changes()
            .await
            .context("failed to save changes")
    }

    /// Deletes every document in `ids` that exists, in one commit. Missing ids are skipped.
    pub async fn delete_multiple<S>(&self, ids: &[S]) -> DocumentStoreResult<()>
    where
        S: AsRef<str> + Sync,
    {
        debug!(collection = %self.collection, count = ids.len(), "delete multiple");

        let mut session = self.database.open_session().await?;
        for id in ids {
            let id = id.as_ref();
            let loaded = session
                .load(id)
                .await
                .map_err(|err| err.context(format!("failed to load document {id} for deletion")))?;

            match loaded {
                Some(_) => session.delete(id),
                None => debug!(collection = %self.collection, id, "skipping missing document"),
            }
        }

        session
            .save_changes()
            .await
            .context("failed to save changes")
    }

    /// Runs a query against this collection. See [`functions::query`].
    pub async fn query(&self, options: QueryOptions) -> DocumentStoreResult<GenericQueryResult<T>> {
        functions::query(self.database, &self.collection, options).await
    }

    /// Queries every document in this collection, up to 1024 of them.
    pub async fn query_all(&self) -> DocumentStoreResult<GenericQueryResult<T>> {
        functions::query_all(self.database, &self.collection).await
    }

    /// Queries documents whose `field` equals `value`.
    pub async fn query_by_field(
        &self,
        field: &str,
        value: impl Into<Value>,
        options: QueryOptions,
    ) -> DocumentStoreResult<GenericQueryResult<T>> {
        functions::query_by_field(self.database, &self.collection, field, value, options).await
    }

    /// Queries documents whose `field` lies between `min_value` and `max_value`, inclusive.
    pub async fn query_by_range(
        &self,
        field: &str,
        min_value: impl Into<Value>,
        max_value: impl Into<Value>,
        options: QueryOptions,
    ) -> DocumentStoreResult<GenericQueryResult<T>> {
        functions::query_by_range(
            self.database,
            &self.collection,
            field,
            min_value,
            max_value,
            options,
        )
        .await
    }

    /// Full-text searches `term` across `fields`.
    pub async fn search<S>(
        &self,
        term: &str,
        fields: &[S],
        options: QueryOptions,
    ) -> DocumentStoreResult<GenericQueryResult<T>>
    where
        S: AsRef<str>,
    {
        functions::search(self.database, &self.collection, term, fields, options).await
    }

    /// Returns `true` if a document is stored under `id`.
    pub async fn exists(&self, id: &str) -> DocumentStoreResult<bool> {
        let mut session = self.database.open_session().await?;

        Ok(session
            .load(id)
            .await
            .context("failed to check document existence")?
            .is_some())
    }

    /// Counts the documents in this collection by querying them all.
    ///
    /// The count is capped at the maximum page size of 1024.
    pub async fn count(&self) -> DocumentStoreResult<usize> {
        Ok(self
            .query_all()
            .await
            .context("failed to count documents")?
            .total_count)
    }
}

fn non_empty(id: &str) -> Option<&str> {
    (!id.is_empty()).then_some(id)
}
