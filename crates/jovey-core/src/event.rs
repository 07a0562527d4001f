//! Event log types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Default number of events returned by a query.
pub const DEFAULT_QUERY_LIMIT: i64 = 100;

/// Upper bound on the number of events returned by a query or batch.
pub const MAX_QUERY_LIMIT: i64 = 1000;

const MAX_CREATED_BY_LEN: usize = 100;

/// Who recorded an event: `user:<id>`, `agent:<name>` or `system`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CreatedBy {
    /// A human principal.
    User(String),
    /// An autonomous agent.
    Agent(String),
    /// The system itself.
    System,
}

impl FromStr for CreatedBy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > MAX_CREATED_BY_LEN {
            return Err(DomainError::Validation(format!(
                "created_by must be between 1 and {MAX_CREATED_BY_LEN} characters"
            )));
        }
        if s == "system" {
            return Ok(Self::System);
        }
        let (kind, rest): (fn(String) -> Self, &str) = if let Some(rest) = s.strip_prefix("user:")
        {
            (Self::User, rest)
        } else if let Some(rest) = s.strip_prefix("agent:") {
            (Self::Agent, rest)
        } else {
            return Err(DomainError::Validation(format!(
                "created_by must be 'user:<id>', 'agent:<name>' or 'system', got {s:?}"
            )));
        };
        if rest.trim().is_empty() {
            return Err(DomainError::Validation(format!(
                "created_by {s:?} is missing its identifier"
            )));
        }
        Ok(kind(rest.to_owned()))
    }
}

impl fmt::Display for CreatedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Agent(name) => write!(f, "agent:{name}"),
            Self::System => f.write_str("system"),
        }
    }
}

impl TryFrom<String> for CreatedBy {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CreatedBy> for String {
    fn from(value: CreatedBy) -> Self {
        value.to_string()
    }
}

/// An immutable fact in the event log.
///
/// Everything except `is_processed`, `processed_at`, `processing_error` and
/// `processing_attempts` is fixed at insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// Position in the global log, assigned by the store (1, 2, 3, ...).
    pub sequence_number: i64,
    /// Dotted `aggregate.action` type name.
    pub event_type: String,
    /// Kind of entity the event concerns.
    pub aggregate_type: String,
    /// Identity of the entity the event concerns.
    pub aggregate_id: Uuid,
    /// Event payload.
    pub data: serde_json::Value,
    /// Free-form contextual attributes.
    pub metadata: serde_json::Value,
    /// Attribution.
    pub created_by: CreatedBy,
    /// Principal that posted the event, when known.
    pub user_id: Option<Uuid>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Groups events belonging to one broader operation.
    pub correlation_id: Option<Uuid>,
    /// The event that caused this one.
    pub causation_id: Option<Uuid>,
    /// Caller-supplied deduplication key.
    pub idempotency_key: Option<String>,
    /// Whether the Database Manager has applied this event.
    pub is_processed: bool,
    /// When the event was applied.
    pub processed_at: Option<DateTime<Utc>>,
    /// Error recorded by the most recent failed attempt.
    pub processing_error: Option<String>,
    /// Number of processing attempts so far.
    pub processing_attempts: i32,
}

impl Event {
    /// Returns `true` if the event is unprocessed and its last attempt failed.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        !self.is_processed && self.processing_error.is_some()
    }
}

/// A validated event ready to be appended. The store assigns `id` and
/// `sequence_number`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Dotted `aggregate.action` type name (lowercase).
    pub event_type: String,
    /// Kind of entity (lowercase).
    pub aggregate_type: String,
    /// Entity identity.
    pub aggregate_id: Uuid,
    /// Payload object.
    pub data: serde_json::Value,
    /// Metadata object.
    pub metadata: serde_json::Value,
    /// Attribution.
    pub created_by: CreatedBy,
    /// Acting principal.
    pub user_id: Option<Uuid>,
    /// Correlation identifier.
    pub correlation_id: Option<Uuid>,
    /// Causation identifier.
    pub causation_id: Option<Uuid>,
    /// Deduplication key.
    pub idempotency_key: Option<String>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

/// Ordering by `sequence_number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Oldest first.
    Ascending,
    /// Newest first.
    #[default]
    Descending,
}

/// AND-combined filters over the event log. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Exact event type.
    pub event_type: Option<String>,
    /// Exact aggregate type.
    pub aggregate_type: Option<String>,
    /// Exact aggregate id.
    pub aggregate_id: Option<Uuid>,
    /// Processing status.
    pub is_processed: Option<bool>,
    /// Correlation id.
    pub correlation_id: Option<Uuid>,
    /// Exact attribution string.
    pub created_by: Option<String>,
}

impl EventFilter {
    /// Returns `true` if `event` satisfies every set filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.event_type.as_ref().is_none_or(|t| *t == event.event_type)
            && self
                .aggregate_type
                .as_ref()
                .is_none_or(|t| *t == event.aggregate_type)
            && self.aggregate_id.is_none_or(|id| id == event.aggregate_id)
            && self.is_processed.is_none_or(|p| p == event.is_processed)
            && self
                .correlation_id
                .is_none_or(|id| Some(id) == event.correlation_id)
            && self
                .created_by
                .as_ref()
                .is_none_or(|c| *c == event.created_by.to_string())
    }
}

/// A bounded read over the event log.
///
/// `after_sequence` / `before_sequence` are exclusive bounds used for keyset
/// paging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    /// Filters.
    pub filter: EventFilter,
    /// Result order.
    pub order: SortOrder,
    /// Maximum number of events returned.
    pub limit: i64,
    /// Only events with a greater sequence number.
    pub after_sequence: Option<i64>,
    /// Only events with a smaller sequence number.
    pub before_sequence: Option<i64>,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            filter: EventFilter::default(),
            order: SortOrder::Descending,
            limit: DEFAULT_QUERY_LIMIT,
            after_sequence: None,
            before_sequence: None,
        }
    }
}

impl EventQuery {
    /// Returns `true` if `event` passes the filters and sequence bounds.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.filter.matches(event)
            && self.after_sequence.is_none_or(|s| event.sequence_number > s)
            && self.before_sequence.is_none_or(|s| event.sequence_number < s)
    }
}

/// Catalog entry describing an event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTypeDescriptor {
    /// Dotted event type.
    pub event_type: String,
    /// Aggregate type the event applies to.
    pub aggregate_type: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Example payload.
    pub example: Option<serde_json::Value>,
}

/// Whole-log counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStreamStats {
    /// Number of stored events.
    pub total_events: i64,
    /// Events applied by the Database Manager.
    pub processed_events: i64,
    /// Events not yet applied.
    pub unprocessed_events: i64,
    /// Unprocessed events whose last attempt failed.
    pub failed_events: i64,
    /// Count per event type.
    pub event_types: BTreeMap<String, i64>,
    /// Count per aggregate type.
    pub aggregate_types: BTreeMap<String, i64>,
}
