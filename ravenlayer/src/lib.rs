//! Main ravenlayer crate: a thin, type-safe layer over a RavenDB document database.
//!
//! This crate is the primary entry point for users of ravenlayer. It re-exports the
//! core types from the sub-crates, the storage backends and the package-level helpers:
//! [`new_database`], [`new_collection`] and the generic query functions.
//!
//! # Features
//!
//! - **Database service** - Ensure a database exists, check its status, and store, load, merge and delete untyped documents
//! - **Typed collections** - CRUD and queries over one collection with your own Serde types
//! - **Generic queries** - Paging, ordering, field equality, ranges and full-text search
//! - **Pluggable backends** - In-memory for tests, RavenDB over HTTP behind the `http` feature
//!
//! # Quick Start
//!
//! ```ignore
//! use ravenlayer::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! pub struct User {
//!     pub id: String,
//!     pub name: String,
//!     pub age: u32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let db = DatabaseService::new(InMemoryStore::new(), "ExampleDB");
//!     db.init().await?;
//!
//!     let users = ravenlayer::new_collection::<_, User>(&db, "Users");
//!     users.store("users/1", &User { id: "users/1".into(), name: "Alice".into(), age: 30 }).await?;
//!
//!     let adults = ravenlayer::query_by_range::<User, _>(&db, "Users", "age", 18, 200, QueryOptions::new()).await?;
//!     println!("Found {} adults", adults.total_count);
//!
//!     db.close().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process storage for development and testing
//! - `http` - RavenDB server over HTTP (requires the `http` feature)

pub mod prelude;

pub use ravenlayer_core::{backend, collection, config, document, error, functions, page, query, service};
pub use ravenlayer_core::functions::{query, query_all, query_by_field, query_by_range, search};

use ravenlayer_core::{collection::CollectionService, document::Document, service::DatabaseHandle};

/// In-memory storage backend implementations.
pub mod memory {
    pub use ravenlayer_memory::{InMemorySession, InMemoryStore, InMemoryStoreBuilder};
}

/// RavenDB HTTP storage backend implementations.
///
/// This module is only available when the `http` feature is enabled.
#[cfg(feature = "http")]
pub mod http {
    pub use ravenlayer_http::{DEFAULT_TIMEOUT, RavenDbSession, RavenDbStore, RavenDbStoreBuilder};
}

/// Connects a database service to the RavenDB nodes named in `config`.
///
/// The database itself is not touched; call [`DatabaseService::init`] to make sure it
/// exists.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Initialization`] if `config` names no usable URL.
///
/// [`DatabaseService::init`]: service::DatabaseService::init
/// [`DocumentStoreError::Initialization`]: error::DocumentStoreError::Initialization
#[cfg(feature = "http")]
pub async fn new_database(
    config: &config::Config,
) -> error::DocumentStoreResult<service::DatabaseService<ravenlayer_http::RavenDbStore>> {
    use ravenlayer_core::backend::StoreBackendBuilder;

    let backend = ravenlayer_http::RavenDbStore::builder(config).build().await?;

    Ok(service::DatabaseService::new(backend, config.database.clone()))
}

/// Creates a typed collection service over `database`.
pub fn new_collection<'a, H, T>(database: &'a H, collection: impl Into<String>) -> CollectionService<'a, H, T>
where
    H: DatabaseHandle,
    T: Document,
{
    CollectionService::new(database, collection)
}
