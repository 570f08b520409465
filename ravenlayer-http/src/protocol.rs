//! Request and response bodies of the RavenDB HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ravenlayer_core::query::Parameters;

pub(crate) const METADATA: &str = "@metadata";
pub(crate) const METADATA_COLLECTION: &str = "@collection";

/// Body of `PUT /admin/databases`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DatabaseRecord {
    pub database_name: String,
    #[serde(default)]
    pub disabled: bool,
}

/// Body of `POST /databases/{db}/queries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct QueryRequest {
    pub query: String,
    pub query_parameters: Parameters,
}

/// Response of document loads and queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ResultsResponse {
    #[serde(default)]
    pub results: Vec<Value>,
}

/// One command of a `bulk_docs` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub(crate) enum BatchCommand {
    #[serde(rename = "PUT", rename_all = "PascalCase")]
    Put {
        id: String,
        document: Value,
        change_vector: Option<String>,
    },
    #[serde(rename = "DELETE", rename_all = "PascalCase")]
    Delete {
        id: String,
        change_vector: Option<String>,
    },
}

/// Body of `POST /databases/{db}/bulk_docs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct BatchRequest {
    pub commands: Vec<BatchCommand>,
}

/// Response of `GET /databases/{db}/stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DatabaseStatisticsResponse {
    #[serde(default)]
    pub count_of_documents: u64,
    #[serde(default)]
    pub count_of_indexes: u64,
}

/// Error body the server sends with non-success statuses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ServerError {
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub message: String,
}

impl ServerError {
    /// Parses an error body, keeping unstructured bodies as the message.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| ServerError {
            r#type: String::new(),
            message: body.trim().to_string(),
        })
    }

    pub fn describe(&self) -> String {
        match (self.r#type.is_empty(), self.message.is_empty()) {
            (true, true) => "no error details".to_string(),
            (true, false) => self.message.clone(),
            (false, true) => self.r#type.clone(),
            (false, false) => format!("{}: {}", self.r#type, self.message),
        }
    }
}

/// Removes `@metadata` from a document body and returns it.
pub(crate) fn split_metadata(document: &mut Value) -> Option<Value> {
    document.as_object_mut()?.remove(METADATA)
}

/// The `@collection` named by a metadata object.
pub(crate) fn metadata_collection(metadata: &Value) -> Option<&str> {
    metadata.get(METADATA_COLLECTION)?.as_str()
}
