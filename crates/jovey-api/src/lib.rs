//! Jovey API server library.
//!
//! Exposes the router builder, shared state and configuration so that the
//! binary and the integration tests assemble the same application.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use axum::Router;

use crate::state::AppState;

/// Builds the full application: `/health` plus everything under `/api/v1`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_router())
        .with_state(state)
}
