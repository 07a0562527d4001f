//! Route modules organized by bounded context.

pub mod database_manager;
pub mod events;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Every authenticated route, to be nested under `/api/v1`.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/events", events::router())
        .nest("/database-manager", database_manager::router())
}
