//! Shared application state.

use std::sync::Arc;

use jovey_core::clock::Clock;
use jovey_core::projection::ProjectionStore;
use jovey_core::repository::EventStore;
use jovey_projector::application::command_handlers::ProjectorSettings;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Source of event and processing timestamps.
    pub clock: Arc<dyn Clock>,
    /// The event log.
    pub event_store: Arc<dyn EventStore>,
    /// Event log and current-state tables as seen by the Database Manager.
    pub projection_store: Arc<dyn ProjectionStore>,
    /// Database Manager tunables.
    pub projector: ProjectorSettings,
    /// HS256 secret used to verify bearer tokens.
    pub jwt_secret: Arc<str>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        event_store: Arc<dyn EventStore>,
        projection_store: Arc<dyn ProjectionStore>,
        projector: ProjectorSettings,
        jwt_secret: &str,
    ) -> Self {
        Self {
            clock,
            event_store,
            projection_store,
            projector,
            jwt_secret: Arc::from(jwt_secret),
        }
    }
}
