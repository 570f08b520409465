//! Convenient re-exports of commonly used types from ravenlayer.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use ravenlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - The database and collection services
//! - Document traits and the untyped document type
//! - Store backends, sessions and builders
//! - Query options and results
//! - Configuration and error types

pub use ravenlayer_core::{
    backend::{DocumentSession, StoreBackend, StoreBackendBuilder},
    collection::CollectionService,
    config::Config,
    document::{Document, DocumentExt, UntypedDocument},
    error::{DocumentStoreError, DocumentStoreResult, ResultExt},
    page::{GenericQueryResult, QueryResult},
    query::{QueryOptions, QueryOptionsBuilder},
    service::{ConnectionState, DatabaseHandle, DatabaseService, DatabaseStatus},
};
