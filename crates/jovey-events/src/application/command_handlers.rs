//! Command handlers for the Event Store context.

use jovey_core::clock::Clock;
use jovey_core::error::DomainError;
use jovey_core::event::Event;
use jovey_core::repository::EventStore;
use tracing::{info, instrument, warn};

use crate::domain::commands::PostEvent;

/// Handles the `PostEvent` command: validates it, stamps it with the current
/// time and appends it to the log.
///
/// Nothing is notified; the Database Manager picks the event up on its next
/// batch.
///
/// # Errors
///
/// Returns `DomainError::Validation` for malformed input,
/// `DomainError::DuplicateIdempotencyKey` if the key was already used and
/// `DomainError::Infrastructure` if the store is unavailable.
#[instrument(skip_all, fields(event_type = %command.event_type, aggregate_id = %command.aggregate_id))]
pub async fn handle_post_event(
    command: PostEvent,
    clock: &dyn Clock,
    store: &dyn EventStore,
) -> Result<Event, DomainError> {
    let new_event = command.into_new_event(clock.now())?;

    match store.append(new_event).await {
        Ok(event) => {
            info!(
                event_id = %event.id,
                sequence_number = event.sequence_number,
                created_by = %event.created_by,
                "event recorded"
            );
            Ok(event)
        }
        Err(err @ DomainError::DuplicateIdempotencyKey { .. }) => {
            warn!(error = %err, "idempotency key reused");
            Err(err)
        }
        Err(err) => Err(err),
    }
}
