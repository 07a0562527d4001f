//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type shared by the event log and the projector.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No event exists with the given identifier.
    #[error("event not found: {0}")]
    EventNotFound(Uuid),

    /// An event with the same idempotency key has already been stored.
    #[error("idempotency key {key:?} already used by event {existing_event_id}")]
    DuplicateIdempotencyKey {
        /// The repeated key.
        key: String,
        /// The event that was stored first under this key.
        existing_event_id: Uuid,
    },

    /// Malformed input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The store refused a write that breaks one of its constraints (a
    /// duplicate unique value, a dangling reference, an out-of-range or
    /// too-long value). Retrying the same write fails the same way.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` for storage failures, which callers may retry later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }
}
