//! Event handlers: one per dispatch entry, each writing the current-state
//! tables through a `StateWriter`.
//!
//! A handler returns the list of operations it performed. Any error leaves
//! the caller responsible for discarding the unit's writes.

mod customer;
mod dealer;
mod decision;
mod order;
mod product;

use jovey_core::event::Event;
use jovey_core::state::StateWriter;
use jovey_core::state::limits::{self, EMAIL_LEN};
use serde::de::DeserializeOwned;

use crate::domain::dispatch::EventKind;
use crate::error::ProjectionError;

/// Applies `event` to the current-state tables.
///
/// # Errors
///
/// Returns `ProjectionError::AggregateMismatch` if the event's aggregate type
/// is not the one `kind` applies to, `InvalidPayload` or `Precondition` when
/// the handler rejects the event, `Rejected` when the state tables refuse a
/// write and `Storage` when they fail.
pub async fn apply(
    kind: EventKind,
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    if event.aggregate_type != kind.aggregate_type() {
        return Err(ProjectionError::AggregateMismatch {
            event_type: kind.event_type(),
            expected: kind.aggregate_type(),
            actual: event.aggregate_type.clone(),
        });
    }

    match kind {
        EventKind::ProductCreated => product::created(event, state).await,
        EventKind::ProductUpdated => product::updated(event, state).await,
        EventKind::ProductPriceChanged => product::price_changed(event, state).await,
        EventKind::ProductStockUpdated => product::stock_updated(event, state).await,
        EventKind::ProductDeactivated => product::deactivated(event, state).await,
        EventKind::OrderCreated => order::created(event, state).await,
        EventKind::OrderPaymentReceived => order::payment_received(event, state).await,
        EventKind::OrderStatusChanged => order::status_changed(event, state).await,
        EventKind::OrderFulfilled => order::fulfilled(event, state).await,
        EventKind::OrderCancelled => order::cancelled(event, state).await,
        EventKind::CustomerRegistered => customer::registered(event, state).await,
        EventKind::CustomerProfileUpdated => customer::profile_updated(event, state).await,
        EventKind::DealerApplicationSubmitted => dealer::application_submitted(event, state).await,
        EventKind::DealerApproved => dealer::approved(event, state).await,
        EventKind::DealerPricingUpdated => dealer::pricing_updated(event, state).await,
        EventKind::DecisionProposed => decision::proposed(event, state).await,
        EventKind::DecisionApproved => decision::approved(event, state).await,
        EventKind::DecisionRejected => decision::rejected(event, state).await,
    }
}

/// Deserializes the event payload into the handler's payload type.
fn payload<T: DeserializeOwned>(kind: EventKind, event: &Event) -> Result<T, ProjectionError> {
    T::deserialize(&event.data).map_err(|err| invalid(kind, err.to_string()))
}

fn invalid(kind: EventKind, reason: impl Into<String>) -> ProjectionError {
    ProjectionError::InvalidPayload {
        event_type: kind.event_type(),
        reason: reason.into(),
    }
}

fn precondition(message: impl Into<String>) -> ProjectionError {
    ProjectionError::Precondition(message.into())
}

/// Checks an amount fits a `NUMERIC(12, 2)` column and is not negative.
fn money(kind: EventKind, field: &str, value: f64) -> Result<f64, ProjectionError> {
    if limits::is_money(value) {
        Ok(value)
    } else {
        Err(invalid(
            kind,
            format!(
                "{field} must be between 0 and {:.2}, got {value}",
                limits::MAX_MONEY
            ),
        ))
    }
}

fn non_blank(
    kind: EventKind,
    field: &str,
    value: String,
    max: usize,
) -> Result<String, ProjectionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(kind, format!("{field} must not be empty")));
    }
    if !limits::fits(trimmed, max) {
        return Err(too_long(kind, field, max));
    }
    Ok(trimmed.to_owned())
}

fn too_long(kind: EventKind, field: &str, max: usize) -> ProjectionError {
    invalid(kind, format!("{field} must be at most {max} characters"))
}

fn at_most(
    kind: EventKind,
    field: &str,
    value: Option<String>,
    max: usize,
) -> Result<Option<String>, ProjectionError> {
    match value {
        Some(v) if !limits::fits(&v, max) => Err(too_long(kind, field, max)),
        other => Ok(other),
    }
}

fn email(kind: EventKind, value: String) -> Result<String, ProjectionError> {
    let value = value.trim().to_lowercase();
    if !limits::fits(&value, EMAIL_LEN) {
        return Err(too_long(kind, "email", EMAIL_LEN));
    }
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(value),
        _ => Err(invalid(kind, format!("email {value:?} is not a valid address"))),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{TimeZone, Utc};
    use jovey_core::event::{CreatedBy, Event};
    use uuid::Uuid;

    use crate::domain::dispatch::EventKind;

    /// An unprocessed event of `kind` as it would come out of the log.
    pub(crate) fn event(kind: EventKind, aggregate_id: Uuid, data: serde_json::Value) -> Event {
        Event {
            id: Uuid::now_v7(),
            sequence_number: 1,
            event_type: kind.event_type().to_owned(),
            aggregate_type: kind.aggregate_type().to_owned(),
            aggregate_id,
            data,
            metadata: serde_json::json!({}),
            created_by: CreatedBy::User("staff-1".into()),
            user_id: None,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap(),
            correlation_id: None,
            causation_id: None,
            idempotency_key: None,
            is_processed: false,
            processed_at: None,
            processing_error: None,
            processing_attempts: 0,
        }
    }
}
