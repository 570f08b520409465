//! Error types and result types for document store operations.
//!
//! This module provides error handling for every operation exposed by the layer.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations, and
//! [`ResultExt::context`] to attach the name of the failing operation to an error
//! before handing it to the caller.

use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Represents all possible errors that can occur when interacting with a document store.
///
/// The variants map onto a small set of kinds: connectivity (`Connection`,
/// `Initialization`), absence (`DocumentNotFound`), bad input (`InvalidDocument`,
/// `Query`, `Configuration`, `Serialization`) and failures reported by the
/// underlying store (`Backend`, `DatabaseAlreadyExists`).
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between documents and JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A session or request could not reach the underlying store.
    #[error("Connection error: {0}")]
    Connection(String),
    /// The configuration could not be read or parsed.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The database targeted by a creation request already exists.
    #[error("Database {0} already exists")]
    DatabaseAlreadyExists(String),
    /// The requested document was not found.
    #[error("Document with ID {0} not found")]
    DocumentNotFound(String),
    /// The document has a shape the operation cannot work with.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The query text could not be understood or executed.
    #[error("Query error: {0}")]
    Query(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// The backend answered in a way that is neither a success nor a known failure.
    #[error("Unknown error: {0}")]
    Unknown(String),
    /// Another error, annotated with the operation that produced it.
    #[error("{context}: {source}")]
    Operation {
        /// Short description of the failed operation, e.g. `failed to open session`.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<DocumentStoreError>,
    },
}

impl DocumentStoreError {
    /// Wraps this error with operation context.
    pub fn context(self, context: impl Into<String>) -> Self {
        DocumentStoreError::Operation {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping any [`DocumentStoreError::Operation`] wrappers.
    pub fn root(&self) -> &DocumentStoreError {
        match self {
            DocumentStoreError::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns `true` if the root cause is a missing document.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), DocumentStoreError::DocumentNotFound(_))
    }

    /// Returns `true` if the root cause is a connectivity failure.
    pub fn is_connection(&self) -> bool {
        matches!(
            self.root(),
            DocumentStoreError::Connection(_) | DocumentStoreError::Initialization(_)
        )
    }
}

/// A specialized `Result` type for document store operations.
///
/// This type alias is used throughout the crate to indicate operations that may fail
/// with a [`DocumentStoreError`].
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

/// Extension for attaching operation context to fallible results.
pub trait ResultExt<T> {
    /// Wraps the error, if any, with the given operation context.
    fn context(self, context: &str) -> DocumentStoreResult<T>;
}

impl<T> ResultExt<T> for DocumentStoreResult<T> {
    fn context(self, context: &str) -> DocumentStoreResult<T> {
        self.map_err(|err| err.context(context))
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<TomlError> for DocumentStoreError {
    fn from(err: TomlError) -> Self {
        DocumentStoreError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_and_root_unwraps() {
        let err = DocumentStoreError::DocumentNotFound("users/1".into())
            .context("failed to load document for update");

        assert_eq!(
            err.to_string(),
            "failed to load document for update: Document with ID users/1 not found"
        );
        assert!(err.is_not_found());
        assert!(!err.is_connection());
    }

    #[test]
    fn result_context_leaves_ok_untouched() {
        let ok: DocumentStoreResult<u8> = Ok(7);
        assert_eq!(ok.context("unused").unwrap(), 7);

        let failed: DocumentStoreResult<u8> =
            Err(DocumentStoreError::Connection("refused".into()));
        let err = failed.context("failed to open session").unwrap_err();
        assert!(err.is_connection());
    }
}
