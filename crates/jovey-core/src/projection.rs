//! Storage seam for the Database Manager.
//!
//! A `ProjectionUnit` is one atomic unit of work: the claim on an event, the
//! handler's writes to the current-state tables and the "processed" mark are
//! either all committed or all discarded.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::Event;
use crate::state::StateWriter;

/// Result of trying to take ownership of an event inside a unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The event is unprocessed and now locked by this unit.
    Claimed(Box<Event>),
    /// The event was already processed.
    AlreadyProcessed,
    /// Another unit currently holds the event.
    Locked,
    /// No event with that id exists.
    NotFound,
}

/// Per-type processing counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeCounts {
    /// All events of this type.
    pub total: i64,
    /// Applied events.
    pub processed: i64,
    /// Unprocessed events with a recorded error.
    pub failed: i64,
}

/// Processing-status counts over the whole log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Applied events.
    pub processed: i64,
    /// Unprocessed events with no recorded error.
    pub pending: i64,
    /// Unprocessed events with a recorded error.
    pub failed: i64,
    /// Failed events that reached the attempt cap.
    pub dead_lettered: i64,
    /// Most recent `processed_at`.
    pub last_processed_at: Option<DateTime<Utc>>,
    /// Counts per event type.
    pub by_event_type: BTreeMap<String, EventTypeCounts>,
}

/// Event-log operations used by the Database Manager.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Unprocessed events below the attempt cap, oldest first.
    async fn pending_events(&self, limit: i64, max_attempts: i32)
    -> Result<Vec<Event>, DomainError>;

    /// Opens a unit of work.
    async fn begin(&self) -> Result<Box<dyn ProjectionUnit>, DomainError>;

    /// Records a failed attempt on a still-unprocessed event.
    async fn record_failure(&self, event_id: Uuid, error: &str) -> Result<(), DomainError>;

    /// Processing-status counts; `max_attempts` decides what is dead-lettered.
    async fn processing_stats(&self, max_attempts: i32) -> Result<ProcessingStats, DomainError>;
}

/// One atomic unit of work over the event log and the current-state tables.
///
/// Dropping a unit without calling `commit` discards everything it wrote.
#[async_trait]
pub trait ProjectionUnit: Send {
    /// Locks the event for this unit if it is still unprocessed.
    async fn claim(&mut self, event_id: Uuid) -> Result<Claim, DomainError>;

    /// Current-state tables as seen from inside this unit.
    fn state(&mut self) -> &mut dyn StateWriter;

    /// Marks a claimed event processed and clears its error.
    async fn mark_processed(
        &mut self,
        event_id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> Result<(), DomainError>;

    /// Makes every write of this unit visible.
    async fn commit(&mut self) -> Result<(), DomainError>;

    /// Discards every write of this unit.
    async fn rollback(&mut self) -> Result<(), DomainError>;
}
