//! Commands for the Database Manager context.

use jovey_core::error::DomainError;
use jovey_core::event::MAX_QUERY_LIMIT;
use serde::Deserialize;
use uuid::Uuid;

/// Default batch size when the caller names none.
pub const DEFAULT_BATCH_LIMIT: i64 = 100;

const MAX_SPECIFIC_IDS: usize = 1000;

/// Command to apply the oldest unprocessed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessBatch {
    /// Maximum number of events to attempt (1-1000).
    pub limit: i64,
}

impl Default for ProcessBatch {
    fn default() -> Self {
        Self {
            limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

impl ProcessBatch {
    /// Checks the batch size.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless `1 <= limit <= 1000`.
    pub fn validate(&self) -> Result<(), DomainError> {
        if (1..=MAX_QUERY_LIMIT).contains(&self.limit) {
            Ok(())
        } else {
            Err(DomainError::Validation(format!(
                "limit must be between 1 and {MAX_QUERY_LIMIT}, got {}",
                self.limit
            )))
        }
    }
}

/// Command to apply exactly the listed events, in the given order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessSpecific {
    /// Events to attempt.
    pub event_ids: Vec<Uuid>,
    /// Also retry events that reached the attempt cap.
    #[serde(default)]
    pub force_retry: bool,
}

impl ProcessSpecific {
    /// Checks the id list.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the list is empty or longer than
    /// 1000 ids.
    pub fn validate(&self) -> Result<(), DomainError> {
        let len = self.event_ids.len();
        if !(1..=MAX_SPECIFIC_IDS).contains(&len) {
            return Err(DomainError::Validation(format!(
                "event_ids must list between 1 and {MAX_SPECIFIC_IDS} ids, got {len}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_limit_bounds() {
        assert!(ProcessBatch { limit: 0 }.validate().is_err());
        assert!(ProcessBatch { limit: 1001 }.validate().is_err());
        assert!(ProcessBatch::default().validate().is_ok());
    }

    #[test]
    fn test_specific_requires_ids_and_defaults_force_retry() {
        let cmd: ProcessSpecific = serde_json::from_value(serde_json::json!({
            "event_ids": [Uuid::new_v4()]
        }))
        .unwrap();
        assert!(!cmd.force_retry);
        assert!(cmd.validate().is_ok());

        let empty = ProcessSpecific {
            event_ids: Vec::new(),
            force_retry: true,
        };
        assert!(matches!(empty.validate(), Err(DomainError::Validation(_))));
    }
}
