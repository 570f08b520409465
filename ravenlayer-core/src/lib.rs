//! A thin, type-safe layer over a RavenDB-style document database client.
//!
//! This crate is the core of the ravenlayer project and provides:
//!
//! - **Store backend contract** ([`backend`]) - The session-based client interface the layer consumes
//! - **Configuration** ([`config`]) - Server URLs and database name, from code or TOML
//! - **Database service** ([`service`]) - Database lifecycle, status and untyped CRUD
//! - **Collections interface** ([`collection`]) - Typed CRUD and queries scoped to one collection
//! - **Query helpers** ([`functions`]) - Stateless generic query functions
//! - **Query options** ([`query`]) - Pagination, ordering and filter construction
//! - **Query results** ([`page`]) - The paginated result envelope
//! - **Document traits** ([`document`]) - What a storable document type needs
//! - **Error handling** ([`error`]) - Error and result types
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
//!     pub age: u32,
//! }
//!
//! let db = DatabaseService::new(InMemoryStore::new(), "ExampleDB");
//! db.init().await?;
//!
//! let users = CollectionService::<_, User>::new(&db, "Users");
//! let adults = users.query_by_range("age", 18, 200, QueryOptions::new()).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as ravenlayer_core;

pub mod backend;
pub mod collection;
pub mod config;
pub mod document;
pub mod error;
pub mod functions;
pub mod page;
pub mod query;
pub mod service;
