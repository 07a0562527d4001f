//! Event store abstraction.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::{Event, EventQuery, EventStreamStats, EventTypeDescriptor, NewEvent};

/// Append-only event log.
///
/// Implementations must assign `sequence_number`s so that, read in ascending
/// order, they reflect acceptance order with no duplicates and no gaps, and
/// must reject a second event carrying an already-used idempotency key with
/// `DomainError::DuplicateIdempotencyKey`.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends one event, assigning its id and sequence number.
    async fn append(&self, event: NewEvent) -> Result<Event, DomainError>;

    /// Loads a single event by id.
    async fn find(&self, event_id: Uuid) -> Result<Option<Event>, DomainError>;

    /// Runs a filtered, bounded read.
    async fn query(&self, query: &EventQuery) -> Result<Vec<Event>, DomainError>;

    /// Loads every event of one aggregate, ascending by sequence number.
    async fn load_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Vec<Event>, DomainError>;

    /// Returns the event type catalog.
    async fn event_types(&self) -> Result<Vec<EventTypeDescriptor>, DomainError>;

    /// Counts over the whole log.
    async fn stream_stats(&self) -> Result<EventStreamStats, DomainError>;
}
