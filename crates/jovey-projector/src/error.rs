//! Errors raised while applying one event.

use jovey_core::error::DomainError;
use thiserror::Error;

/// Why an event could not be applied.
///
/// Everything except `Storage` is recorded on the event and the batch moves
/// on; `Storage` aborts the batch. A write the store refuses on a constraint
/// becomes `Rejected`, since the next event may well succeed.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The event type has no entry in the dispatch table.
    #[error("no handler registered for event type {0:?}")]
    HandlerNotFound(String),

    /// The event's aggregate type does not match its dispatch entry.
    #[error("{event_type} applies to aggregate type {expected:?}, got {actual:?}")]
    AggregateMismatch {
        /// Dispatched event type.
        event_type: &'static str,
        /// Aggregate type the handler expects.
        expected: &'static str,
        /// Aggregate type found on the event.
        actual: String,
    },

    /// The payload does not fit the handler's payload type.
    #[error("invalid {event_type} payload: {reason}")]
    InvalidPayload {
        /// Dispatched event type.
        event_type: &'static str,
        /// Deserialization or validation message.
        reason: String,
    },

    /// The current state does not allow the change (missing row, stock too
    /// low, illegal status transition, ...).
    #[error("{0}")]
    Precondition(String),

    /// The handler did not finish within the configured time.
    #[error("handler timed out after {0} ms")]
    Timeout(u128),

    /// The store refused a write as breaking one of its constraints.
    #[error("rejected by the store: {0}")]
    Rejected(String),

    /// The store failed underneath the handler.
    #[error("storage error: {0}")]
    Storage(DomainError),
}

impl From<DomainError> for ProjectionError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::ConstraintViolation(message) => Self::Rejected(message),
            other => Self::Storage(other),
        }
    }
}

impl ProjectionError {
    /// Returns `true` if the batch must stop.
    #[must_use]
    pub fn aborts_batch(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
