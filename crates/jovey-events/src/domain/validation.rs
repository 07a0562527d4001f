//! Input rules for events entering the log.

use jovey_core::error::DomainError;
use jovey_core::event::MAX_QUERY_LIMIT;

const EVENT_TYPE_LEN: std::ops::RangeInclusive<usize> = 3..=100;
const AGGREGATE_TYPE_LEN: std::ops::RangeInclusive<usize> = 1..=50;
const IDEMPOTENCY_KEY_LEN: std::ops::RangeInclusive<usize> = 1..=255;

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Lowercases and checks an `aggregate.action` event type.
///
/// # Errors
///
/// Returns `DomainError::Validation` unless the type is 3-100 characters with
/// exactly one dot separating two non-empty `[a-z0-9_]` parts.
pub fn normalize_event_type(raw: &str) -> Result<String, DomainError> {
    let event_type = raw.trim().to_lowercase();
    if !EVENT_TYPE_LEN.contains(&event_type.len()) {
        return Err(DomainError::Validation(format!(
            "event_type must be between 3 and 100 characters, got {}",
            event_type.len()
        )));
    }
    let mut parts = event_type.split('.');
    let well_formed = matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(aggregate), Some(action), None) if is_identifier(aggregate) && is_identifier(action)
    );
    if !well_formed {
        return Err(DomainError::Validation(format!(
            "event_type must look like 'aggregate.action', got {raw:?}"
        )));
    }
    Ok(event_type)
}

/// Lowercases and checks an aggregate type.
///
/// # Errors
///
/// Returns `DomainError::Validation` unless the type is 1-50 `[a-z0-9_]`
/// characters.
pub fn normalize_aggregate_type(raw: &str) -> Result<String, DomainError> {
    let aggregate_type = raw.trim().to_lowercase();
    if !AGGREGATE_TYPE_LEN.contains(&aggregate_type.len()) || !is_identifier(&aggregate_type) {
        return Err(DomainError::Validation(format!(
            "aggregate_type must be 1-50 characters of [a-z0-9_], got {raw:?}"
        )));
    }
    Ok(aggregate_type)
}

/// Checks an optional idempotency key.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the key is empty or longer than 255
/// characters.
pub fn validate_idempotency_key(key: Option<String>) -> Result<Option<String>, DomainError> {
    match key {
        Some(key) if !IDEMPOTENCY_KEY_LEN.contains(&key.chars().count()) => Err(
            DomainError::Validation("idempotency_key must be between 1 and 255 characters".into()),
        ),
        other => Ok(other),
    }
}

/// Checks that `value` is a JSON object.
///
/// # Errors
///
/// Returns `DomainError::Validation` naming `field` otherwise.
pub fn require_object(field: &str, value: serde_json::Value) -> Result<serde_json::Value, DomainError> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(DomainError::Validation(format!(
            "{field} must be a JSON object"
        )))
    }
}

/// Checks a caller-supplied page size.
///
/// # Errors
///
/// Returns `DomainError::Validation` unless `1 <= limit <= 1000`.
pub fn validate_limit(limit: i64) -> Result<i64, DomainError> {
    if (1..=MAX_QUERY_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(DomainError::Validation(format!(
            "limit must be between 1 and {MAX_QUERY_LIMIT}, got {limit}"
        )))
    }
}
