//! Core traits and types for document representation and serialization.
//!
//! Documents travel to and from the store as JSON. Two representations sit on top
//! of that:
//!
//! - **Typed documents** - any type implementing [`Document`], used by
//!   [`CollectionService`](crate::collection::CollectionService) and the free query functions
//! - **Untyped documents** - [`UntypedDocument`], a field-name to JSON-value mapping,
//!   used by the database-level operations of
//!   [`DatabaseService`](crate::service::DatabaseService)

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, from_value, to_value};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// An untyped document: an ordered mapping from field name to dynamically typed value.
pub type UntypedDocument = Map<String, Value>;

/// Core trait for values that can be stored in and read back from a collection.
///
/// It is implemented automatically for every type that is serializable, deserializable,
/// thread-safe and has a [`Default`]. The default value stands in for entries the store
/// reports as `null` in a query result.
///
/// # Example
///
/// ```ignore
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// pub struct User {
///     pub id: String,
///     pub name: String,
///     pub email: String,
/// }
///
/// // `User` is now a `Document`.
/// ```
pub trait Document: Serialize + DeserializeOwned + Default + Send + Sync + 'static {}

impl<T> Document for T where T: Serialize + DeserializeOwned + Default + Send + Sync + 'static {}

/// Extension trait providing JSON conversions for documents.
///
/// This trait is automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Converts this document to a JSON value for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_json(&self) -> DocumentStoreResult<Value>;

    /// Creates a document from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the structure is invalid.
    fn from_json(value: Value) -> DocumentStoreResult<Self>;

    /// Creates a document from a query result entry, mapping `null` to the default value.
    fn from_json_or_default(value: Value) -> DocumentStoreResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            value => Self::from_json(value),
        }
    }
}

impl<D: Document> DocumentExt for D {
    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocumentStoreResult<Self> {
        Ok(from_value(value)?)
    }
}

/// Serializes any value into a JSON value for storage.
pub fn to_document_value<D: Serialize + ?Sized>(document: &D) -> DocumentStoreResult<Value> {
    Ok(to_value(document)?)
}

/// Converts a stored JSON value into an untyped document.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] if the value is not a JSON object.
pub fn into_untyped(id: &str, value: Value) -> DocumentStoreResult<UntypedDocument> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "document {id} is not an object but {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
