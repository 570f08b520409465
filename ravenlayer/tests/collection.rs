//! Typed collection CRUD and query tests over the in-memory backend.

mod common;

use chrono::{TimeZone, Utc};
use ravenlayer::{memory::InMemoryStore, new_collection, prelude::*};
use rstest::{fixture, rstest};

use common::{Product, User, database, init_tracing, seed_users};

#[fixture]
async fn db() -> DatabaseService<InMemoryStore> {
    init_tracing();
    let db = database();
    db.init().await.unwrap();
    db
}

#[rstest]
#[tokio::test]
async fn typed_crud_round_trip(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    let mut user = User::new(1, "John Doe", 30);

    users.store(&user.id, &user).await.unwrap();
    assert_eq!(users.load_by_id("users/1").await.unwrap(), Some(user.clone()));

    user.age = 31;
    users.update(&user.id, &user).await.unwrap();
    assert_eq!(users.load_by_id("users/1").await.unwrap().unwrap().age, 31);

    users.delete("users/1").await.unwrap();
    assert_eq!(users.load_by_id("users/1").await.unwrap(), None);
    assert!(!users.exists("users/1").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn deleting_a_missing_document_is_not_found(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");

    let err = users.delete("users/404").await.unwrap_err();

    assert!(err.is_not_found());
}

#[rstest]
#[tokio::test]
async fn delete_multiple_skips_missing_ids(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    seed_users(&users, 3).await;

    users
        .delete_multiple(&["users/1", "users/404", "users/3"])
        .await
        .unwrap();

    assert_eq!(users.count().await.unwrap(), 1);
    assert!(users.exists("users/2").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn update_creates_a_missing_document(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    let user = User::new(7, "Late Comer", 44);

    users.update(&user.id, &user).await.unwrap();

    assert_eq!(users.load_by_id("users/7").await.unwrap(), Some(user));
}

#[rstest]
#[tokio::test]
async fn load_multiple_returns_found_documents_in_request_order(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    let seeded = seed_users(&users, 3).await;

    let loaded = users
        .load_multiple_by_ids(&["users/3", "users/404", "users/1"])
        .await
        .unwrap();

    assert_eq!(loaded, vec![seeded[2].clone(), seeded[0].clone()]);
}

#[rstest]
#[tokio::test]
async fn collections_are_isolated(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    let products = CollectionService::<_, Product>::new(&db, "Products");
    seed_users(&users, 4).await;
    products
        .store(
            "products/1",
            &Product {
                id: "products/1".into(),
                name: "Widget".into(),
                price: 9.5,
                tags: vec!["tools".into()],
            },
        )
        .await
        .unwrap();

    assert_eq!(users.count().await.unwrap(), 4);
    assert_eq!(products.count().await.unwrap(), 1);
    assert_eq!(products.query_all().await.unwrap().results[0].name, "Widget");
}

#[rstest]
#[tokio::test]
async fn pages_report_whether_more_results_follow(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    seed_users(&users, 30).await;

    let first = users.query(QueryOptions::new()).await.unwrap();
    assert_eq!((first.len(), first.take, first.has_more), (25, 25, true));
    assert_eq!(first.results[0].id, "users/1");

    let second = users
        .query(QueryOptions::builder().skip(25).build())
        .await
        .unwrap();
    assert_eq!((second.len(), second.skip, second.has_more), (5, 25, false));
    assert_eq!(second.total_count, 5);
    assert_eq!(second.results[0].id, "users/26");
}

#[rstest]
#[case(0, 25)]
#[case(10, 10)]
#[case(5000, 1024)]
#[tokio::test]
async fn page_sizes_are_normalized(
    #[future] db: DatabaseService<InMemoryStore>,
    #[case] requested: usize,
    #[case] effective: usize,
) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    seed_users(&users, 3).await;

    let page = users
        .query(QueryOptions::builder().take(requested).build())
        .await
        .unwrap();

    assert_eq!(page.take, effective);
    assert_eq!(page.len(), 3);
}

#[rstest]
#[tokio::test]
async fn a_full_final_page_still_reports_more(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    seed_users(&users, 10).await;

    let page = users
        .query(QueryOptions::builder().take(10).build())
        .await
        .unwrap();

    assert!(page.has_more);
}

#[rstest]
#[tokio::test]
async fn results_follow_the_requested_order(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    seed_users(&users, 5).await;

    let page = users
        .query(QueryOptions::builder().order_by_desc("age").take(3).build())
        .await
        .unwrap();

    let ages = page.iter().map(|user| user.age).collect::<Vec<_>>();
    assert_eq!(ages, vec![25, 24, 23]);
}

#[rstest]
#[tokio::test]
async fn query_by_field_matches_equal_values(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    seed_users(&users, 6).await;

    let active = users
        .query_by_field("active", true, QueryOptions::new())
        .await
        .unwrap();
    let ids = active.iter().map(|user| user.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["users/2", "users/4", "users/6"]);

    let nobody = users
        .query_by_field("name", "user 1", QueryOptions::new())
        .await
        .unwrap();
    assert!(nobody.is_empty());
}

#[rstest]
#[tokio::test]
async fn query_by_range_is_inclusive(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    seed_users(&users, 10).await;

    let page = users
        .query_by_range("age", 23, 25, QueryOptions::new())
        .await
        .unwrap();

    let ages = page.iter().map(|user| user.age).collect::<Vec<_>>();
    assert_eq!(ages, vec![23, 24, 25]);
}

#[rstest]
#[tokio::test]
async fn query_by_range_compares_timestamps(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    seed_users(&users, 10).await;

    let from = serde_json::to_value(Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap()).unwrap();
    let to = serde_json::to_value(Utc.with_ymd_and_hms(2024, 1, 6, 23, 59, 59).unwrap()).unwrap();

    let page = users
        .query_by_range("created_at", from, to, QueryOptions::new())
        .await
        .unwrap();

    let ids = page.iter().map(|user| user.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["users/4", "users/5", "users/6"]);
}

#[rstest]
#[tokio::test]
async fn search_ignores_case_and_spans_fields(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    seed_users(&users, 3).await;
    users
        .store("users/9", &User::new(9, "John Doe", 40))
        .await
        .unwrap();
    let mut jane = User::new(10, "Jane Roe", 35);
    jane.email = "johnny@example.com".into();
    users.store(&jane.id, &jane).await.unwrap();

    let by_name = users
        .search("JOHN", &["name"], QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name.results[0].name, "John Doe");

    let anywhere = users
        .search("john*", &["name", "email"], QueryOptions::new())
        .await
        .unwrap();
    let ids = anywhere.iter().map(|user| user.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["users/9", "users/10"]);
}

#[rstest]
#[tokio::test]
async fn search_without_fields_selects_everything(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    seed_users(&users, 4).await;

    let page = users
        .search::<&str>("anything", &[], QueryOptions::new())
        .await
        .unwrap();

    assert_eq!(page.len(), 4);
}

#[rstest]
#[tokio::test]
async fn free_functions_query_by_collection_name(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    seed_users(&users, 5).await;

    let all = ravenlayer::query_all::<User, _>(&db, "Users").await.unwrap();
    assert_eq!((all.len(), all.take, all.has_more), (5, 1024, false));

    let older = ravenlayer::query_by_range::<User, _>(&db, "Users", "age", 24, 100, QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(older.len(), 2);

    let nothing = ravenlayer::query_all::<User, _>(&db, "Products").await.unwrap();
    assert!(nothing.is_empty());
}

#[rstest]
#[tokio::test]
async fn custom_where_clauses_bind_parameters(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");
    seed_users(&users, 6).await;

    let options = QueryOptions::new()
        .with_where("age > $minAge AND active = true")
        .with_parameter("minAge", 22);
    let page = users.query(options).await.unwrap();

    let ids = page.iter().map(|user| user.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["users/4", "users/6"]);
}

#[rstest]
#[tokio::test]
async fn malformed_where_clauses_fail_as_queries(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");

    let err = users
        .query(QueryOptions::new().with_where("age >"))
        .await
        .unwrap_err();

    assert!(matches!(err.root(), DocumentStoreError::Query(_)));
    assert!(err.to_string().starts_with("failed to execute query"));
}

#[rstest]
#[tokio::test]
async fn empty_ids_still_store_into_the_collection(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = CollectionService::<_, User>::new(&db, "Users");

    users.store("", &User::new(1, "Nameless", 50)).await.unwrap();

    let all = ravenlayer::query_all::<serde_json::Value, _>(&db, "Users")
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all.results[0]["name"], "Nameless");
}

#[rstest]
#[tokio::test]
async fn new_collection_builds_a_typed_service(#[future] db: DatabaseService<InMemoryStore>) {
    let db = db.await;
    let users = new_collection::<_, User>(&db, "Users");

    assert_eq!(users.name(), "Users");
    users
        .store("users/1", &User::new(1, "Ann", 33))
        .await
        .unwrap();
    assert_eq!(users.count().await.unwrap(), 1);
}
