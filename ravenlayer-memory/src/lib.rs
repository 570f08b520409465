//! In-memory document database backend for ravenlayer.
//!
//! This crate provides a thread-safe, in-process implementation of the `StoreBackend`
//! trait. It uses async-aware read-write locks for concurrent access and is meant for
//! development and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Unit-of-work sessions** - Stores and deletes are staged until `save_changes`
//! - **Query support** - Understands the RQL subset ravenlayer generates: collection
//!   filters, comparisons, `AND`/`OR`/`NOT`, `search`, ordering and paging
//! - **Collection tagging** - Documents carry a collection like they do on a server
//!
//! # Quick Start
//!
//! ```ignore
//! use ravenlayer::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! pub struct User {
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = DatabaseService::new(InMemoryStore::new(), "ExampleDB");
//!     db.init().await?;
//!
//!     let users = CollectionService::<_, User>::new(&db, "Users");
//!     users.store("users/1", &User { name: "Alice".to_string() }).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as ravenlayer_memory;

pub mod store;
mod evaluator;
mod parser;

pub use store::{InMemorySession, InMemoryStore, InMemoryStoreBuilder};
