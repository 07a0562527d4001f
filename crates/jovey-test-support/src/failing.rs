//! A store whose every call fails, for error-path tests.

use async_trait::async_trait;
use jovey_core::error::DomainError;
use jovey_core::event::{Event, EventQuery, EventStreamStats, EventTypeDescriptor, NewEvent};
use jovey_core::projection::{ProcessingStats, ProjectionStore, ProjectionUnit};
use jovey_core::repository::EventStore;
use uuid::Uuid;

fn refused() -> DomainError {
    DomainError::Infrastructure("connection refused".into())
}

/// An event store that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingEventStore;

#[async_trait]
impl EventStore for FailingEventStore {
    async fn append(&self, _event: NewEvent) -> Result<Event, DomainError> {
        Err(refused())
    }

    async fn find(&self, _event_id: Uuid) -> Result<Option<Event>, DomainError> {
        Err(refused())
    }

    async fn query(&self, _query: &EventQuery) -> Result<Vec<Event>, DomainError> {
        Err(refused())
    }

    async fn load_aggregate(
        &self,
        _aggregate_type: &str,
        _aggregate_id: Uuid,
    ) -> Result<Vec<Event>, DomainError> {
        Err(refused())
    }

    async fn event_types(&self) -> Result<Vec<EventTypeDescriptor>, DomainError> {
        Err(refused())
    }

    async fn stream_stats(&self) -> Result<EventStreamStats, DomainError> {
        Err(refused())
    }
}

#[async_trait]
impl ProjectionStore for FailingEventStore {
    async fn pending_events(
        &self,
        _limit: i64,
        _max_attempts: i32,
    ) -> Result<Vec<Event>, DomainError> {
        Err(refused())
    }

    async fn begin(&self) -> Result<Box<dyn ProjectionUnit>, DomainError> {
        Err(refused())
    }

    async fn record_failure(&self, _event_id: Uuid, _error: &str) -> Result<(), DomainError> {
        Err(refused())
    }

    async fn processing_stats(&self, _max_attempts: i32) -> Result<ProcessingStats, DomainError> {
        Err(refused())
    }
}
