//! Commands for the Event Store context.

use chrono::{DateTime, Utc};
use jovey_core::error::DomainError;
use jovey_core::event::{CreatedBy, NewEvent};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::validation::{
    normalize_aggregate_type, normalize_event_type, require_object, validate_idempotency_key,
};

/// Command to record one domain fact, exactly as a caller submitted it.
#[derive(Debug, Clone, Deserialize)]
pub struct PostEvent {
    /// Dotted `aggregate.action` type.
    pub event_type: String,
    /// Kind of entity the fact concerns.
    pub aggregate_type: String,
    /// Identity of that entity.
    pub aggregate_id: Uuid,
    /// Payload; must be a JSON object.
    pub data: serde_json::Value,
    /// Optional metadata object.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// `user:<id>`, `agent:<name>` or `system`.
    pub created_by: String,
    /// Acting principal; filled from the bearer token, never from the body.
    #[serde(skip)]
    pub user_id: Option<Uuid>,
    /// Groups events of one broader operation.
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
    /// The event that caused this one.
    #[serde(default)]
    pub causation_id: Option<Uuid>,
    /// Deduplication key.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl PostEvent {
    /// Validates and normalizes the command into an insertable event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if any field breaks the input rules.
    pub fn into_new_event(self, created_at: DateTime<Utc>) -> Result<NewEvent, DomainError> {
        let created_by: CreatedBy = self.created_by.parse()?;
        Ok(NewEvent {
            event_type: normalize_event_type(&self.event_type)?,
            aggregate_type: normalize_aggregate_type(&self.aggregate_type)?,
            aggregate_id: self.aggregate_id,
            data: require_object("data", self.data)?,
            metadata: require_object(
                "metadata",
                self.metadata
                    .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
            )?,
            created_by,
            user_id: self.user_id,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            idempotency_key: validate_idempotency_key(self.idempotency_key)?,
            created_at,
        })
    }
}
