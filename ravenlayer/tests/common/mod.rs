#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use ravenlayer::{memory::InMemoryStore, prelude::*};
use serde::{Deserialize, Serialize};

pub const DATABASE: &str = "TestDB";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub age: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(n: u32, name: &str, age: u32) -> Self {
        Self {
            id: format!("users/{n}"),
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            age,
            active: n % 2 == 0,
            created_at: Utc.with_ymd_and_hms(2024, 1, n.clamp(1, 28), 12, 0, 0).unwrap(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub tags: Vec<String>,
}

/// A service over a fresh in-memory store. Call `init` before use.
pub fn database() -> DatabaseService<InMemoryStore> {
    DatabaseService::new(InMemoryStore::new(), DATABASE)
}

/// Installs a test subscriber so `RUST_LOG=debug` shows the layer's events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn seed_users(users: &CollectionService<'_, DatabaseService<InMemoryStore>, User>, count: u32) -> Vec<User> {
    let seeded = (1..=count)
        .map(|n| User::new(n, &format!("User {n}"), 20 + n))
        .collect::<Vec<_>>();

    users
        .store_multiple(seeded.iter().map(|user| (user.id.clone(), user.clone())))
        .await
        .unwrap();

    seeded
}
