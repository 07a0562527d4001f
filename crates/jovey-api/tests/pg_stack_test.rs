//! End-to-end tests over `PostgreSQL`.
//!
//! These need a live database: `DATABASE_URL=... cargo test -- --ignored`.

mod common;

use axum::http::StatusCode;
use jovey_api::auth::Role;
use jovey_event_store::PgEventStore;
use jovey_projector::domain::dispatch::catalog;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use common::{build_pg_app, event_body, get_json, post_json, token};

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_posted_events_are_projected_into_current_state(pool: PgPool) {
    // Arrange
    let staff = token(Role::Staff);
    let product_id = Uuid::new_v4();
    let body = event_body(
        "product.created",
        product_id,
        json!({"sku": "pump-2hp-res", "name": "Residential pump", "base_price": 499.0, "stock_quantity": 20}),
    );
    let (status, _) = post_json(build_pg_app(pool.clone()), "/api/v1/events", Some(&staff), &body).await;
    assert_eq!(status, StatusCode::CREATED);

    // Act
    let (status, report) = post_json(
        build_pg_app(pool.clone()),
        "/api/v1/database-manager/process",
        Some(&staff),
        &json!({}),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["successful"], 1);
    let (sku, stock): (String, i64) =
        sqlx::query_as("SELECT sku, stock_quantity FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(sku, "PUMP-2HP-RES");
    assert_eq!(stock, 20);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_event_types_are_served_from_the_registered_catalog(pool: PgPool) {
    // Arrange
    let store = PgEventStore::new(pool.clone());
    store.register_event_types(&catalog()).await.unwrap();
    store.register_event_types(&catalog()).await.unwrap();

    // Act
    let (status, json) =
        get_json(build_pg_app(pool), "/api/v1/events/types", Some(&token(Role::Staff))).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    let types = json.as_array().unwrap();
    assert_eq!(types.len(), 18);
    assert!(types.iter().any(|t| t["event_type"] == "order.cancelled" && t["aggregate_type"] == "order"));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_reused_sku_fails_one_event_without_stopping_the_batch(pool: PgPool) {
    // Arrange
    let staff = token(Role::Staff);
    let product = json!({"sku": "PUMP-2HP-RES", "name": "Residential pump", "base_price": 499.0});
    let mut posted = Vec::new();
    for (event_type, data) in [
        ("product.created", product.clone()),
        ("product.created", product),
        ("customer.registered", json!({"email": "jane@example.com", "name": "Jane Doe"})),
    ] {
        let body = event_body(event_type, Uuid::new_v4(), data);
        let (status, json) = post_json(build_pg_app(pool.clone()), "/api/v1/events", Some(&staff), &body).await;
        assert_eq!(status, StatusCode::CREATED);
        posted.push(json);
    }

    // Act
    let (status, report) = post_json(
        build_pg_app(pool.clone()),
        "/api/v1/database-manager/process",
        Some(&staff),
        &json!({}),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["aborted"], false);
    assert_eq!(report["successful"], 2);
    assert_eq!(report["failed"], 1);
    let reused = Uuid::parse_str(posted[1]["id"].as_str().unwrap()).unwrap();
    let (is_processed, attempts, error): (bool, i32, Option<String>) = sqlx::query_as(
        "SELECT is_processed, processing_attempts, processing_error FROM events WHERE id = $1",
    )
    .bind(reused)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(!is_processed);
    assert_eq!(attempts, 1);
    assert!(error.unwrap().contains("PUMP-2HP-RES"));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_reused_idempotency_key_is_rejected_by_the_database(pool: PgPool) {
    let staff = token(Role::Staff);
    let mut body = event_body("customer.registered", Uuid::new_v4(), json!({"email": "a@b.co"}));
    body["idempotency_key"] = json!("signup-1");
    let (_, first) = post_json(build_pg_app(pool.clone()), "/api/v1/events", Some(&staff), &body).await;

    let (status, json) = post_json(build_pg_app(pool), "/api/v1/events", Some(&staff), &body).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["existing_event_id"], first["id"]);
}
