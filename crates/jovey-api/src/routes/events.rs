//! Routes for the Event Store bounded context.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use jovey_core::event::{
    DEFAULT_QUERY_LIMIT, Event, EventFilter, EventQuery, EventStreamStats, EventTypeDescriptor,
    SortOrder,
};
use jovey_events::application::{command_handlers, query_handlers};
use jovey_events::domain::commands::PostEvent;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, StaffUser};
use crate::error::ApiError;
use crate::state::AppState;

/// Query string of GET /events.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQueryParams {
    /// Exact event type.
    pub event_type: Option<String>,
    /// Exact aggregate type.
    pub aggregate_type: Option<String>,
    /// Exact aggregate id.
    pub aggregate_id: Option<Uuid>,
    /// Processing status; `processed` is accepted as an alias.
    #[serde(alias = "processed")]
    pub is_processed: Option<bool>,
    /// Correlation id.
    pub correlation_id: Option<Uuid>,
    /// Exact attribution string.
    pub created_by: Option<String>,
    /// Exclusive lower sequence bound.
    pub after_sequence: Option<i64>,
    /// Exclusive upper sequence bound.
    pub before_sequence: Option<i64>,
    /// Page size (default 100).
    pub limit: Option<i64>,
    /// `ascending` or `descending` (default).
    pub order: Option<SortOrder>,
}

impl From<EventsQueryParams> for EventQuery {
    fn from(params: EventsQueryParams) -> Self {
        Self {
            filter: EventFilter {
                event_type: params.event_type,
                aggregate_type: params.aggregate_type,
                aggregate_id: params.aggregate_id,
                is_processed: params.is_processed,
                correlation_id: params.correlation_id,
                created_by: params.created_by,
            },
            order: params.order.unwrap_or_default(),
            limit: params.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
            after_sequence: params.after_sequence,
            before_sequence: params.before_sequence,
        }
    }
}

/// Query string of GET /events/unprocessed.
#[derive(Debug, Deserialize)]
pub struct UnprocessedParams {
    /// Page size (default 100).
    pub limit: Option<i64>,
}

/// POST /events
#[instrument(skip_all, fields(subject = %user.subject))]
async fn post_event(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(mut command): Json<PostEvent>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    command.user_id = user.user_id();
    let event = command_handlers::handle_post_event(
        command,
        state.clock.as_ref(),
        state.event_store.as_ref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /events
#[instrument(skip_all)]
async fn list_events(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(params): Query<EventsQueryParams>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let events = query_handlers::query_events(params.into(), state.event_store.as_ref()).await?;
    Ok(Json(events))
}

/// GET /events/types
async fn list_event_types(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> Result<Json<Vec<EventTypeDescriptor>>, ApiError> {
    Ok(Json(
        query_handlers::list_event_types(state.event_store.as_ref()).await?,
    ))
}

/// GET /events/stats
async fn stream_stats(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> Result<Json<EventStreamStats>, ApiError> {
    Ok(Json(
        query_handlers::get_stream_stats(state.event_store.as_ref()).await?,
    ))
}

/// GET /events/unprocessed
async fn list_unprocessed(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(params): Query<UnprocessedParams>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    Ok(Json(
        query_handlers::list_unprocessed(limit, state.event_store.as_ref()).await?,
    ))
}

/// GET /events/{event_id}
#[instrument(skip(state, _staff))]
async fn get_event(
    State(state): State<AppState>,
    _staff: StaffUser,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(
        query_handlers::get_event(event_id, state.event_store.as_ref()).await?,
    ))
}

/// GET /events/aggregate/{aggregate_type}/{aggregate_id}/history
#[instrument(skip(state, _user))]
async fn aggregate_history(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path((aggregate_type, aggregate_id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<Event>>, ApiError> {
    Ok(Json(
        query_handlers::get_aggregate_history(
            &aggregate_type,
            aggregate_id,
            state.event_store.as_ref(),
        )
        .await?,
    ))
}

/// Returns the router for the event log, nested at `/events`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(post_event).get(list_events))
        .route("/types", get(list_event_types))
        .route("/stats", get(stream_stats))
        .route("/unprocessed", get(list_unprocessed))
        .route("/{event_id}", get(get_event))
        .route(
            "/aggregate/{aggregate_type}/{aggregate_id}/history",
            get(aggregate_history),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_default_to_newest_first_page() {
        let query = EventQuery::from(EventsQueryParams::default());

        assert_eq!(query, EventQuery::default());
    }

    #[test]
    fn test_processed_alias_sets_is_processed_filter() {
        let params: EventsQueryParams =
            serde_json::from_value(serde_json::json!({"processed": false, "order": "ascending"}))
                .unwrap();

        let query = EventQuery::from(params);

        assert_eq!(query.filter.is_processed, Some(false));
        assert_eq!(query.order, SortOrder::Ascending);
    }
}
