//! RavenDB HTTP backend implementation for ravenlayer.
//!
//! This crate provides a `StoreBackend` that talks to a RavenDB server over its HTTP
//! API with `reqwest`. Sessions stage their changes client-side and commit them as a
//! single `bulk_docs` batch.
//!
//! To use this backend, include the `http` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! ravenlayer = { version = "x.y.z", features = ["http"] }
//! ```
//!
//! # Features
//!
//! - **Unit-of-work sessions** - Stores and deletes are sent together on `save_changes`
//! - **Node fallback** - Requests move to the next configured URL when a node is unreachable
//! - **Collection metadata** - Documents keep their `@collection` across load and store
//! - **Async/await** - Fully asynchronous API built on `reqwest`
//!
//! # Example
//!
//! ```ignore
//! use ravenlayer::{backend::StoreBackendBuilder, config::Config, http::RavenDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RavenDbStore::builder(&Config::local("ExampleDB"))
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as ravenlayer_http;

mod protocol;
pub mod store;

pub use store::{DEFAULT_TIMEOUT, RavenDbSession, RavenDbStore, RavenDbStoreBuilder};
