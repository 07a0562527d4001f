//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::TimeZone;
use http_body_util::BodyExt;
use jovey_api::auth::{Claims, Role};
use jovey_api::state::AppState;
use jovey_event_store::{PgEventStore, PgProjectionStore};
use jovey_projector::application::command_handlers::ProjectorSettings;
use jovey_projector::domain::dispatch::catalog;
use jovey_test_support::{FixedClock, InMemoryEventStore};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-secret";

/// Fixed timestamp used across all integration tests.
pub fn fixed_clock() -> FixedClock {
    FixedClock(chrono::Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
}

/// An in-memory store serving the real event type catalog.
pub fn memory_store() -> InMemoryEventStore {
    InMemoryEventStore::with_catalog(catalog())
}

/// Builds the full app over `store`, the same way `main.rs` does.
pub fn build_test_app(store: &InMemoryEventStore) -> Router {
    let state = AppState::new(
        Arc::new(fixed_clock()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        ProjectorSettings::default(),
        JWT_SECRET,
    );
    jovey_api::app(state)
}

/// Builds the full app over the `PostgreSQL` stores.
pub fn build_pg_app(pool: PgPool) -> Router {
    let state = AppState::new(
        Arc::new(fixed_clock()),
        Arc::new(PgEventStore::new(pool.clone())),
        Arc::new(PgProjectionStore::new(pool)),
        ProjectorSettings::default(),
        JWT_SECRET,
    );
    jovey_api::app(state)
}

/// Signs a token for a fresh subject with `role`.
pub fn token(role: Role) -> String {
    token_for(&Uuid::new_v4().to_string(), role)
}

/// Signs a token for `subject` with `role`, valid for an hour.
pub fn token_for(subject: &str, role: Role) -> String {
    let exp = usize::try_from(chrono::Utc::now().timestamp() + 3600).unwrap();
    let claims = Claims {
        sub: subject.to_owned(),
        role,
        exp,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&body_bytes).into()))
    };
    (status, json)
}

/// Sends a POST request with a JSON body and returns the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    token: Option<&str>,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(app, request).await
}

/// Sends a GET request and returns the response.
pub async fn get_json(app: Router, uri: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

/// A valid POST /events body.
pub fn event_body(event_type: &str, aggregate_id: Uuid, data: serde_json::Value) -> serde_json::Value {
    let aggregate_type = match event_type.split('.').next().unwrap() {
        "agent" => "decision",
        other => other,
    };
    serde_json::json!({
        "event_type": event_type,
        "aggregate_type": aggregate_type,
        "aggregate_id": aggregate_id,
        "data": data,
        "created_by": "system"
    })
}
