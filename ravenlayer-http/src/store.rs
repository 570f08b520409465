use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, warn};
use uuid::Uuid;

use ravenlayer_core::{
    backend::{DatabaseStatistics, DocumentSession, StoreBackend, StoreBackendBuilder},
    config::Config,
    error::{DocumentStoreError, DocumentStoreResult},
    query::RawQuery,
};

use crate::protocol::{
    BatchCommand, BatchRequest, DatabaseRecord, DatabaseStatisticsResponse, METADATA,
    METADATA_COLLECTION, QueryRequest, ResultsResponse, ServerError, metadata_collection,
    split_metadata,
};

/// Request timeout used when the builder is not given one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maps a transport failure onto the error kinds of the layer.
pub(crate) fn transport_error(err: reqwest::Error) -> DocumentStoreError {
    if err.is_connect() || err.is_timeout() {
        DocumentStoreError::Connection(err.to_string())
    } else if err.is_decode() {
        DocumentStoreError::Serialization(err.to_string())
    } else {
        DocumentStoreError::Backend(err.to_string())
    }
}

/// Maps a non-success response onto the error kinds of the layer.
pub(crate) fn status_error(status: StatusCode, body: &str) -> DocumentStoreError {
    let error = ServerError::parse(body);
    let details = format!("{status}: {}", error.describe());

    if error.r#type.contains("DatabaseDoesNotExist")
        || matches!(
            status,
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT
        )
    {
        DocumentStoreError::Connection(details)
    } else if !status.is_client_error() && !status.is_server_error() {
        DocumentStoreError::Unknown(details)
    } else if error.r#type.contains("Query") || error.r#type.contains("Parser") {
        DocumentStoreError::Query(details)
    } else {
        DocumentStoreError::Backend(details)
    }
}

/// Joins path segments onto a server URL, percent-encoding each segment.
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> DocumentStoreResult<Url> {
    let invalid = || DocumentStoreError::Configuration(format!("invalid server URL '{base}'"));

    let mut url = Url::parse(base).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

fn is_already_exists(status: StatusCode, body: &str) -> bool {
    status == StatusCode::CONFLICT || body.to_lowercase().contains("already exists")
}

/// The HTTP client and the server nodes it talks to.
#[derive(Debug)]
struct Connection {
    client: Client,
    urls: Vec<String>,
}

impl Connection {
    /// Sends the request built by `build` to each node in turn until one is reachable.
    async fn send<F>(&self, build: F) -> DocumentStoreResult<Response>
    where
        F: Fn(&Client, &str) -> DocumentStoreResult<RequestBuilder> + Send + Sync,
    {
        let mut last_error = None;

        for url in &self.urls {
            match build(&self.client, url)?.send().await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_connect() => {
                    warn!(url = %url, error = %err, "node unreachable");
                    last_error = Some(err);
                },
                Err(err) => return Err(transport_error(err)),
            }
        }

        Err(match last_error {
            Some(err) => transport_error(err),
            None => DocumentStoreError::Connection("no server URLs configured".to_string()),
        })
    }

    /// Fails with the mapped server error if the response is not a success.
    async fn check(response: Response) -> DocumentStoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    async fn json<T: DeserializeOwned>(response: Response) -> DocumentStoreResult<T> {
        Self::check(response)
            .await?
            .json::<T>()
            .await
            .map_err(transport_error)
    }
}

/// A document store reached over the RavenDB HTTP API.
///
/// The store holds an HTTP client and the configured node URLs. Requests go to the
/// first node and move down the list only when a node cannot be reached. It is cheap
/// to clone: clones share the client.
///
/// # Example
///
/// ```ignore
/// use ravenlayer::{backend::StoreBackendBuilder, config::Config, http::RavenDbStore};
///
/// let store = RavenDbStore::builder(&Config::local("ExampleDB"))
///     .with_timeout(std::time::Duration::from_secs(5))
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct RavenDbStore {
    connection: Arc<Connection>,
}

impl RavenDbStore {
    /// Creates a builder for the nodes named in `config`.
    pub fn builder(config: &Config) -> RavenDbStoreBuilder {
        RavenDbStoreBuilder::new(config.urls.clone())
    }
}

#[async_trait]
impl StoreBackend for RavenDbStore {
    type Session = RavenDbSession;

    /// Sessions are client-side. Reaching the server is left to the first request.
    async fn open_session(&self, database: &str) -> DocumentStoreResult<Self::Session> {
        if database.is_empty() {
            return Err(DocumentStoreError::Connection("no database name given".to_string()));
        }

        Ok(RavenDbSession {
            connection: self.connection.clone(),
            database: database.to_string(),
            pending: Vec::new(),
            metadata: HashMap::new(),
        })
    }

    async fn create_database(&self, database: &str, replication_factor: u32) -> DocumentStoreResult<()> {
        let record = DatabaseRecord {
            database_name: database.to_string(),
            disabled: false,
        };
        let factor = replication_factor.to_string();

        let response = self
            .connection
            .send(|client, url| {
                Ok(client
                    .put(endpoint(url, &["admin", "databases"])?)
                    .query(&[("name", database), ("replicationFactor", factor.as_str())])
                    .json(&record))
            })
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if is_already_exists(status, &body) {
            return Err(DocumentStoreError::DatabaseAlreadyExists(database.to_string()));
        }

        Err(status_error(status, &body))
    }

    async fn database_statistics(&self, database: &str) -> DocumentStoreResult<DatabaseStatistics> {
        let response = self
            .connection
            .send(|client, url| Ok(client.get(endpoint(url, &["databases", database, "stats"])?)))
            .await?;

        let stats = Connection::json::<DatabaseStatisticsResponse>(response).await?;

        Ok(DatabaseStatistics {
            document_count: stats.count_of_documents,
            index_count: stats.count_of_indexes,
        })
    }

    fn urls(&self) -> &[String] {
        &self.connection.urls
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PendingChange {
    Put(Value),
    Delete,
}

/// A unit of work against one database on the server.
///
/// Stores and deletes are kept client-side and sent as one `bulk_docs` batch by
/// [`DocumentSession::save_changes`]. The metadata of every loaded document is kept
/// so that storing it back without a collection preserves the one it has.
#[derive(Debug)]
pub struct RavenDbSession {
    connection: Arc<Connection>,
    database: String,
    pending: Vec<(String, PendingChange)>,
    metadata: HashMap<String, Value>,
}

impl RavenDbSession {
    fn database_url(&self, url: &str, path: &str) -> DocumentStoreResult<Url> {
        endpoint(url, &["databases", self.database.as_str(), path])
    }

    fn stage(&mut self, id: String, change: PendingChange) {
        self.pending.retain(|(staged, _)| *staged != id);
        self.pending.push((id, change));
    }

    /// Attaches `@metadata` with the collection the document should be stored in.
    fn with_metadata(&self, id: &str, collection: Option<&str>, mut document: Value) -> DocumentStoreResult<Value> {
        let existing = split_metadata(&mut document);
        let map = document.as_object_mut().ok_or_else(|| {
            DocumentStoreError::InvalidDocument(format!("expected a JSON object for {id}"))
        })?;

        let metadata = match collection {
            Some(collection) => Some(json!({ METADATA_COLLECTION: collection })),
            None => self
                .metadata
                .get(id)
                .and_then(metadata_collection)
                .map(|collection| json!({ METADATA_COLLECTION: collection }))
                .or(existing),
        };

        if let Some(metadata) = metadata {
            map.insert(METADATA.to_string(), metadata);
        }

        Ok(document)
    }

    fn batch(&self) -> BatchRequest {
        BatchRequest {
            commands: self
                .pending
                .iter()
                .map(|(id, change)| match change {
                    PendingChange::Put(document) => BatchCommand::Put {
                        id: id.clone(),
                        document: document.clone(),
                        change_vector: None,
                    },
                    PendingChange::Delete => BatchCommand::Delete {
                        id: id.clone(),
                        change_vector: None,
                    },
                })
                .collect(),
        }
    }
}

#[async_trait]
impl DocumentSession for RavenDbSession {
    fn store(&mut self, id: Option<&str>, collection: Option<&str>, document: Value) -> DocumentStoreResult<()> {
        if let Some(id) = id {
            let document = self.with_metadata(id, collection, document)?;
            self.stage(id.to_string(), PendingChange::Put(document));
            return Ok(());
        }

        let collection = collection.map(str::to_string).or_else(|| {
            document
                .get(METADATA)
                .and_then(metadata_collection)
                .map(str::to_string)
        });

        // Ids ending in '/' are completed by the server, so each such put is its own command.
        let id = match &collection {
            Some(collection) => format!("{}/", collection.to_lowercase()),
            None => Uuid::new_v4().to_string(),
        };

        let document = self.with_metadata(&id, collection.as_deref(), document)?;
        self.pending.push((id, PendingChange::Put(document)));
        Ok(())
    }

    async fn load(&mut self, id: &str) -> DocumentStoreResult<Option<Value>> {
        if let Some((_, change)) = self.pending.iter().find(|(staged, _)| staged == id) {
            return Ok(match change {
                PendingChange::Put(document) => {
                    let mut document = document.clone();
                    split_metadata(&mut document);
                    Some(document)
                },
                PendingChange::Delete => None,
            });
        }

        debug!(database = %self.database, id, "load document");

        let response = self
            .connection
            .send(|client, url| {
                Ok(client
                    .get(self.database_url(url, "docs")?)
                    .query(&[("id", id)]))
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let loaded = Connection::json::<ResultsResponse>(response).await?;
        let Some(mut document) = loaded.results.into_iter().find(|doc| !doc.is_null()) else {
            return Ok(None);
        };

        if let Some(metadata) = split_metadata(&mut document) {
            self.metadata.insert(id.to_string(), metadata);
        }

        Ok(Some(document))
    }

    fn delete(&mut self, id: &str) {
        self.stage(id.to_string(), PendingChange::Delete);
    }

    async fn raw_query(&mut self, query: &RawQuery) -> DocumentStoreResult<Vec<Value>> {
        let request = QueryRequest {
            query: query.text.clone(),
            query_parameters: query.parameters.clone(),
        };

        let response = self
            .connection
            .send(|client, url| {
                Ok(client
                    .post(self.database_url(url, "queries")?)
                    .json(&request))
            })
            .await?;

        let results = Connection::json::<ResultsResponse>(response).await?;

        Ok(results
            .results
            .into_iter()
            .map(|mut document| {
                split_metadata(&mut document);
                document
            })
            .collect())
    }

    async fn save_changes(&mut self) -> DocumentStoreResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let batch = self.batch();
        debug!(database = %self.database, commands = batch.commands.len(), "save changes");

        let response = self
            .connection
            .send(|client, url| {
                Ok(client
                    .post(self.database_url(url, "bulk_docs")?)
                    .json(&batch))
            })
            .await?;
        Connection::check(response).await?;

        self.pending.clear();
        Ok(())
    }
}

/// Builder for [`RavenDbStore`].
///
/// # Example
///
/// ```ignore
/// use ravenlayer::{backend::StoreBackendBuilder, http::RavenDbStoreBuilder};
///
/// let store = RavenDbStoreBuilder::new(vec!["http://localhost:8080".into()])
///     .build()
///     .await?;
/// ```
#[derive(Debug)]
pub struct RavenDbStoreBuilder {
    urls: Vec<String>,
    timeout: Duration,
    client: Option<Client>,
}

impl RavenDbStoreBuilder {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            timeout: DEFAULT_TIMEOUT,
            client: None,
        }
    }

    /// Sets the request timeout. Ignored when a client is supplied.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Uses a pre-built HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for RavenDbStoreBuilder {
    type Backend = RavenDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let urls = self
            .urls
            .iter()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .collect::<Vec<_>>();

        if urls.is_empty() {
            return Err(DocumentStoreError::Initialization(
                "at least one server URL is required".to_string(),
            ));
        }

        if let Some(url) = urls.iter().find(|url| endpoint(url, &[]).is_err()) {
            return Err(DocumentStoreError::Initialization(format!("invalid server URL '{url}'")));
        }

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
        };

        Ok(RavenDbStore {
            connection: Arc::new(Connection { client, urls }),
        })
    }
}
