//! Routes for the Database Manager bounded context. Staff only.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use jovey_projector::application::command_handlers::{self, ProcessingReport};
use jovey_projector::application::query_handlers::{self, ProjectorStats};
use jovey_projector::domain::commands::{DEFAULT_BATCH_LIMIT, ProcessBatch, ProcessSpecific};
use jovey_projector::domain::dispatch::EventMapping;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::auth::StaffUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Query string of POST /process.
#[derive(Debug, Deserialize)]
pub struct ProcessParams {
    /// Batch size (default 100).
    pub limit: Option<i64>,
}

/// POST /process
#[instrument(skip_all, fields(staff = %staff.0.subject))]
async fn process_batch(
    State(state): State<AppState>,
    staff: StaffUser,
    Query(params): Query<ProcessParams>,
) -> Result<Json<ProcessingReport>, ApiError> {
    let command = ProcessBatch {
        limit: params.limit.unwrap_or(DEFAULT_BATCH_LIMIT),
    };
    info!(limit = command.limit, "processing batch on request");
    let report = command_handlers::handle_process_batch(
        command,
        &state.projector,
        state.clock.as_ref(),
        state.projection_store.as_ref(),
    )
    .await?;
    Ok(Json(report))
}

/// POST /process-specific
#[instrument(skip_all, fields(staff = %staff.0.subject))]
async fn process_specific(
    State(state): State<AppState>,
    staff: StaffUser,
    Json(command): Json<ProcessSpecific>,
) -> Result<Json<ProcessingReport>, ApiError> {
    let report = command_handlers::handle_process_specific(
        command,
        &state.projector,
        state.clock.as_ref(),
        state.projection_store.as_ref(),
    )
    .await?;
    Ok(Json(report))
}

/// GET /stats
async fn stats(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> Result<Json<ProjectorStats>, ApiError> {
    Ok(Json(
        query_handlers::get_stats(&state.projector, state.projection_store.as_ref()).await?,
    ))
}

/// GET /mappings
async fn mappings(_staff: StaffUser) -> Json<Vec<EventMapping>> {
    Json(query_handlers::get_mappings())
}

/// Returns the router for the Database Manager, nested at
/// `/database-manager`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/process", post(process_batch))
        .route("/process-specific", post(process_specific))
        .route("/stats", get(stats))
        .route("/mappings", get(mappings))
}
