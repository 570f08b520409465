//! Stateless generic query helpers.
//!
//! These functions run the same queries as
//! [`CollectionService`](crate::collection::CollectionService) without building a collection
//! object first: pass any [`DatabaseHandle`] and a collection name.
//!
//! ```ignore
//! use ravenlayer::{functions, query::QueryOptions};
//!
//! let adults = functions::query_by_range::<User, _>(&db, "Users", "age", 18, 200, QueryOptions::new()).await?;
//! let johns = functions::search::<User, _, _>(&db, "Users", "john", &["name", "email"], QueryOptions::new()).await?;
//! ```

use serde_json::Value;
use tracing::debug;

use crate::{
    backend::DocumentSession,
    document::{Document, DocumentExt},
    error::{DocumentStoreResult, ResultExt},
    page::GenericQueryResult,
    query::{QueryOptions, RawQuery},
    service::DatabaseHandle,
};

/// Runs a query against `collection`.
///
/// The page size is normalized first (`0` becomes 25, anything above 1024 becomes 1024).
/// `null` entries in the store's response become `T::default()`. The result's
/// `total_count` is the length of the returned page and `has_more` is set when the page
/// is full.
pub async fn query<T, H>(
    handle: &H,
    collection: &str,
    options: QueryOptions,
) -> DocumentStoreResult<GenericQueryResult<T>>
where
    T: Document,
    H: DatabaseHandle,
{
    let options = options.normalized();
    let raw = RawQuery::for_collection(collection, &options);

    debug!(
        database = handle.database(),
        collection,
        query = %raw.text,
        "query"
    );

    let mut session = handle.open_session().await?;
    let results = session
        .raw_query(&raw)
        .await
        .context("failed to execute query")?;
    drop(session);

    let results = results
        .into_iter()
        .map(T::from_json_or_default)
        .collect::<DocumentStoreResult<Vec<T>>>()?;

    Ok(GenericQueryResult::builder(results)
        .with_skip(options.skip)
        .with_take(options.take)
        .build())
}

/// Queries every document in `collection`, up to 1024 of them.
pub async fn query_all<T, H>(
    handle: &H,
    collection: &str,
) -> DocumentStoreResult<GenericQueryResult<T>>
where
    T: Document,
    H: DatabaseHandle,
{
    query(handle, collection, QueryOptions::all()).await
}

/// Queries documents whose `field` equals `value`.
///
/// Any WHERE fragment already in `options` is replaced.
pub async fn query_by_field<T, H>(
    handle: &H,
    collection: &str,
    field: &str,
    value: impl Into<Value>,
    options: QueryOptions,
) -> DocumentStoreResult<GenericQueryResult<T>>
where
    T: Document,
    H: DatabaseHandle,
{
    query(handle, collection, options.with_field_equals(field, value)).await
}

/// Queries documents whose `field` lies between `min_value` and `max_value`, inclusive.
///
/// Any WHERE fragment already in `options` is replaced.
pub async fn query_by_range<T, H>(
    handle: &H,
    collection: &str,
    field: &str,
    min_value: impl Into<Value>,
    max_value: impl Into<Value>,
    options: QueryOptions,
) -> DocumentStoreResult<GenericQueryResult<T>>
where
    T: Document,
    H: DatabaseHandle,
{
    query(
        handle,
        collection,
        options.with_range(field, min_value, max_value),
    )
    .await
}

/// Full-text searches `term` across `fields`, matching documents where any field matches.
///
/// With no fields this selects the whole collection (subject to the page size).
pub async fn search<T, H, S>(
    handle: &H,
    collection: &str,
    term: &str,
    fields: &[S],
    options: QueryOptions,
) -> DocumentStoreResult<GenericQueryResult<T>>
where
    T: Document,
    H: DatabaseHandle,
    S: AsRef<str>,
{
    query(handle, collection, options.with_search(term, fields)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    use crate::{
        backend::{DatabaseStatistics, StoreBackend},
        error::DocumentStoreError,
        service::DatabaseService,
    };

    /// Answers every query with a canned response and records the queries it saw.
    #[derive(Debug, Default)]
    struct CannedBackend {
        response: Vec<Value>,
        seen: Arc<Mutex<Vec<RawQuery>>>,
        urls: Vec<String>,
    }

    struct CannedSession {
        response: Vec<Value>,
        seen: Arc<Mutex<Vec<RawQuery>>>,
    }

    #[async_trait]
    impl StoreBackend for CannedBackend {
        type Session = CannedSession;

        async fn open_session(&self, _database: &str) -> DocumentStoreResult<CannedSession> {
            Ok(CannedSession {
                response: self.response.clone(),
                seen: self.seen.clone(),
            })
        }

        async fn create_database(&self, _database: &str, _factor: u32) -> DocumentStoreResult<()> {
            Ok(())
        }

        async fn database_statistics(&self, _database: &str) -> DocumentStoreResult<DatabaseStatistics> {
            Ok(DatabaseStatistics::default())
        }

        fn urls(&self) -> &[String] {
            &self.urls
        }
    }

    #[async_trait]
    impl DocumentSession for CannedSession {
        fn store(&mut self, _id: Option<&str>, _collection: Option<&str>, _document: Value) -> DocumentStoreResult<()> {
            Err(DocumentStoreError::Backend("read only".into()))
        }

        async fn load(&mut self, _id: &str) -> DocumentStoreResult<Option<Value>> {
            Ok(None)
        }

        fn delete(&mut self, _id: &str) {}

        async fn raw_query(&mut self, query: &RawQuery) -> DocumentStoreResult<Vec<Value>> {
            self.seen.lock().unwrap().push(query.clone());
            Ok(self.response.clone())
        }

        async fn save_changes(&mut self) -> DocumentStoreResult<()> {
            Ok(())
        }
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
    }

    fn service(response: Vec<Value>) -> (DatabaseService<CannedBackend>, Arc<Mutex<Vec<RawQuery>>>) {
        let backend = CannedBackend {
            response,
            ..CannedBackend::default()
        };
        let seen = backend.seen.clone();

        (DatabaseService::new(backend, "Test"), seen)
    }

    #[tokio::test]
    async fn oversized_take_is_sent_as_the_cap() {
        let (db, seen) = service(vec![]);

        let result = query::<Item, _>(&db, "Items", QueryOptions::builder().take(5000).build())
            .await
            .unwrap();

        assert_eq!(result.take, 1024);
        assert_eq!(
            seen.lock().unwrap()[0].text,
            "from @all_docs where @metadata.'@collection' = 'Items' LIMIT 0, 1024"
        );
    }

    #[tokio::test]
    async fn null_entries_become_defaults_and_count_towards_the_page() {
        let (db, _) = service(vec![json!({ "name": "a" }), Value::Null]);

        let result = query::<Item, _>(&db, "Items", QueryOptions::builder().take(2).build())
            .await
            .unwrap();

        assert_eq!(result.results, vec![Item { name: "a".into() }, Item::default()]);
        assert_eq!(result.total_count, 2);
        assert!(result.has_more);
    }

    #[tokio::test]
    async fn search_sends_one_parameter_per_field() {
        let (db, seen) = service(vec![]);

        search::<Item, _, _>(&db, "Users", "john", &["name", "email"], QueryOptions::new())
            .await
            .unwrap();

        let sent = seen.lock().unwrap()[0].clone();
        assert_eq!(
            sent.text,
            "from @all_docs where @metadata.'@collection' = 'Users' AND ((search(name, $searchTerm0) OR search(email, $searchTerm1))) LIMIT 0, 25"
        );
        assert_eq!(sent.parameters.len(), 2);
    }

    #[tokio::test]
    async fn undecodable_entries_fail_the_query() {
        let (db, _) = service(vec![json!({ "name": 42 })]);

        let err = query_all::<Item, _>(&db, "Items").await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::Serialization(_)));
    }
}
