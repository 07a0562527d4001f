mod common;

use axum::http::StatusCode;
use jovey_api::auth::Role;
use jovey_core::state::OrderStatus;
use serde_json::json;
use uuid::Uuid;

use common::{build_test_app, event_body, get_json, memory_store, post_json, token};

async fn post_event(
    store: &jovey_test_support::InMemoryEventStore,
    event_type: &str,
    aggregate_id: Uuid,
    data: serde_json::Value,
) -> serde_json::Value {
    let body = event_body(event_type, aggregate_id, data);
    let (status, json) = post_json(
        build_test_app(store),
        "/api/v1/events",
        Some(&token(Role::Staff)),
        &body,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json
}

#[tokio::test]
async fn test_process_projects_pending_events() {
    // Arrange
    let store = memory_store();
    let product_id = Uuid::new_v4();
    post_event(
        &store,
        "product.created",
        product_id,
        json!({"sku": "pump-2hp-res", "name": "Residential pump", "base_price": 499.0, "stock_quantity": 20}),
    )
    .await;
    let order_id = Uuid::new_v4();
    post_event(
        &store,
        "order.created",
        order_id,
        json!({"customer_id": Uuid::new_v4(), "total": 998.0,
               "items": [{"product_id": product_id, "quantity": 2}]}),
    )
    .await;

    // Act
    let (status, json) = post_json(
        build_test_app(&store),
        "/api/v1/database-manager/process",
        Some(&token(Role::Staff)),
        &json!({}),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 2);
    assert_eq!(json["successful"], 2);
    assert_eq!(json["failed"], 0);
    assert_eq!(json["aborted"], false);
    assert_eq!(json["results"][0]["outcome"], "processed");
    assert_eq!(store.product(product_id).unwrap().stock_quantity, 18);
    assert_eq!(store.order(order_id).unwrap().status, OrderStatus::Pending);
    assert!(store.events().iter().all(|e| e.is_processed));
}

#[tokio::test]
async fn test_process_honours_limit_query() {
    let store = memory_store();
    for _ in 0..3 {
        post_event(&store, "customer.registered", Uuid::new_v4(), json!({"email": "a@b.co"})).await;
    }

    let (status, json) = post_json(
        build_test_app(&store),
        "/api/v1/database-manager/process?limit=2",
        Some(&token(Role::Staff)),
        &json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 2);
    assert_eq!(store.events().iter().filter(|e| !e.is_processed).count(), 1);
}

#[tokio::test]
async fn test_process_rejects_zero_limit() {
    let store = memory_store();

    let (status, json) = post_json(
        build_test_app(&store),
        "/api/v1/database-manager/process?limit=0",
        Some(&token(Role::Staff)),
        &json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_process_reports_handler_failure_without_stopping() {
    // Arrange
    let store = memory_store();
    let bad = post_event(&store, "order.payment_received", Uuid::new_v4(), json!({"amount": 5.0})).await;
    post_event(&store, "customer.registered", Uuid::new_v4(), json!({"email": "a@b.co"})).await;

    // Act
    let (_, json) = post_json(
        build_test_app(&store),
        "/api/v1/database-manager/process",
        Some(&token(Role::Staff)),
        &json!({}),
    )
    .await;

    // Assert
    assert_eq!(json["successful"], 1);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["results"][0]["event_id"], bad["id"]);
    assert_eq!(json["results"][0]["outcome"], "failed");
    assert!(json["results"][0]["error"].is_string());
    let stored = store.event(Uuid::parse_str(bad["id"].as_str().unwrap()).unwrap()).unwrap();
    assert!(!stored.is_processed);
    assert_eq!(stored.processing_attempts, 1);
}

#[tokio::test]
async fn test_process_specific_reports_each_requested_event() {
    // Arrange
    let store = memory_store();
    let first = post_event(&store, "customer.registered", Uuid::new_v4(), json!({"email": "a@b.co"})).await;
    let second = post_event(&store, "customer.registered", Uuid::new_v4(), json!({"email": "c@d.co"})).await;
    let missing = Uuid::new_v4();

    // Act
    let (status, json) = post_json(
        build_test_app(&store),
        "/api/v1/database-manager/process-specific",
        Some(&token(Role::Staff)),
        &json!({"event_ids": [second["id"], missing]}),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 2);
    assert_eq!(json["successful"], 1);
    assert_eq!(json["results"][0]["event_id"], second["id"]);
    assert_eq!(json["results"][1]["event_id"], missing.to_string());
    assert_eq!(json["results"][1]["error"], "event not found");
    let first_id = Uuid::parse_str(first["id"].as_str().unwrap()).unwrap();
    assert!(!store.event(first_id).unwrap().is_processed);
}

#[tokio::test]
async fn test_process_specific_rejects_empty_id_list() {
    let store = memory_store();

    let (status, _) = post_json(
        build_test_app(&store),
        "/api/v1/database-manager/process-specific",
        Some(&token(Role::Staff)),
        &json!({"event_ids": []}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_reflect_processing_history() {
    // Arrange
    let store = memory_store();
    post_event(&store, "customer.registered", Uuid::new_v4(), json!({"email": "a@b.co"})).await;
    post_event(&store, "order.fulfilled", Uuid::new_v4(), json!({"tracking_number": "1Z"})).await;
    post_json(
        build_test_app(&store),
        "/api/v1/database-manager/process",
        Some(&token(Role::Staff)),
        &json!({}),
    )
    .await;

    // Act
    let (status, json) = get_json(
        build_test_app(&store),
        "/api/v1/database-manager/stats",
        Some(&token(Role::Staff)),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_processed"], 1);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["dead_lettered"], 0);
    assert_eq!(json["breakdown_by_event_type"]["customer.registered"]["processed"], 1);
}

#[tokio::test]
async fn test_mappings_list_every_handled_event_type() {
    let store = memory_store();

    let (status, json) = get_json(
        build_test_app(&store),
        "/api/v1/database-manager/mappings",
        Some(&token(Role::Staff)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let mappings = json.as_array().unwrap();
    assert_eq!(mappings.len(), 18);
    assert!(mappings.iter().any(|m| m["event_type"] == "order.cancelled"));
}

#[tokio::test]
async fn test_database_manager_routes_are_staff_only() {
    let store = memory_store();
    let dealer = token(Role::Dealer);

    let (process, _) = post_json(
        build_test_app(&store),
        "/api/v1/database-manager/process",
        Some(&dealer),
        &json!({}),
    )
    .await;
    let (stats, _) = get_json(build_test_app(&store), "/api/v1/database-manager/stats", Some(&dealer)).await;
    let (mappings, _) = get_json(build_test_app(&store), "/api/v1/database-manager/mappings", None).await;

    assert_eq!(process, StatusCode::FORBIDDEN);
    assert_eq!(stats, StatusCode::FORBIDDEN);
    assert_eq!(mappings, StatusCode::UNAUTHORIZED);
}
