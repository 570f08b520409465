//! Walks through CRUD, collection and query usage against the in-memory backend.
//!
//! Run with `cargo run -p ravenlayer --example basic_usage`. Set `RUST_LOG=debug` to see
//! the layer's own events.

use ravenlayer::{memory::InMemoryStore, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct User {
    id: String,
    name: String,
    email: String,
    age: u32,
    is_active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Product {
    id: String,
    name: String,
    description: String,
    price: f64,
    category: String,
    in_stock: bool,
}

type Db = DatabaseService<InMemoryStore>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db = DatabaseService::new(InMemoryStore::new(), "ExampleDB");
    db.init().await?;

    info!("basic CRUD operations");
    basic_crud(&db).await?;

    info!("collection service");
    collection_service(&db).await?;

    info!("generic queries");
    generic_queries(&db).await?;

    db.close().await?;
    Ok(())
}

async fn basic_crud(db: &Db) -> DocumentStoreResult<()> {
    let user = User {
        id: "users/1".into(),
        name: "John Doe".into(),
        email: "john@example.com".into(),
        age: 30,
        is_active: true,
    };

    db.store("users/1", &user).await?;
    info!("stored user document");

    match db.load_by_id::<User>("users/1").await? {
        Some(loaded) => info!(name = %loaded.name, email = %loaded.email, "loaded user"),
        None => warn!("user vanished after store"),
    }

    let exists = db.exists("users/1").await?;
    info!(exists, "checked user existence");

    let mut updates = UntypedDocument::new();
    updates.insert("age".into(), json!(31));
    updates.insert("isActive".into(), json!(false));
    db.update("users/1", updates).await?;
    info!("updated user document");

    Ok(())
}

async fn collection_service(db: &Db) -> DocumentStoreResult<()> {
    let users = ravenlayer::new_collection::<_, User>(db, "Users");

    let batch = [
        User {
            id: "users/2".into(),
            name: "Jane Smith".into(),
            email: "jane@example.com".into(),
            age: 25,
            is_active: true,
        },
        User {
            id: "users/3".into(),
            name: "Bob Johnson".into(),
            email: "bob@example.com".into(),
            age: 35,
            is_active: true,
        },
    ];
    users
        .store_multiple(batch.into_iter().map(|user| (user.id.clone(), user)))
        .await?;
    info!("stored multiple users");

    let all = users.query_all().await?;
    info!(count = all.len(), "queried all users");

    let active = users
        .query_by_field("isActive", true, QueryOptions::new())
        .await?;
    info!(count = active.len(), "queried active users");

    let matches = users
        .search("John", &["name", "email"], QueryOptions::new())
        .await?;
    info!(count = matches.len(), "searched users for 'John'");

    Ok(())
}

async fn generic_queries(db: &Db) -> DocumentStoreResult<()> {
    let products = ravenlayer::new_collection::<_, Product>(db, "Products");

    let catalogue = [
        Product {
            id: "products/1".into(),
            name: "Laptop".into(),
            description: "High-performance laptop".into(),
            price: 999.99,
            category: "Electronics".into(),
            in_stock: true,
        },
        Product {
            id: "products/2".into(),
            name: "Mouse".into(),
            description: "Wireless optical mouse".into(),
            price: 29.99,
            category: "Electronics".into(),
            in_stock: false,
        },
    ];
    products
        .store_multiple(catalogue.into_iter().map(|product| (product.id.clone(), product)))
        .await?;

    let in_range = ravenlayer::query_by_range::<Product, _>(
        db,
        "Products",
        "price",
        20.0,
        1000.0,
        QueryOptions::builder().take(10).build(),
    )
    .await?;
    info!(count = in_range.len(), "queried products priced 20 to 1000");

    let expensive = ravenlayer::query::<Product, _>(
        db,
        "Products",
        QueryOptions::builder().order_by_desc("price").take(5).build(),
    )
    .await?;
    if let Some(top) = expensive.results.first() {
        info!(name = %top.name, price = top.price, "most expensive product");
    }

    Ok(())
}
