//! Query handlers for the Database Manager context.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use jovey_core::error::DomainError;
use jovey_core::projection::{EventTypeCounts, ProjectionStore};
use serde::Serialize;

use crate::application::command_handlers::ProjectorSettings;
use crate::domain::dispatch::{EventKind, EventMapping};

/// Processing health of the event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectorStats {
    /// Applied events.
    pub total_processed: i64,
    /// Unprocessed events never failed.
    pub pending: i64,
    /// Unprocessed events whose last attempt failed.
    pub failed: i64,
    /// Failed events that reached the attempt cap.
    pub dead_lettered: i64,
    /// `processed / (processed + failed) * 100`, or `0.0` before any attempt.
    pub success_rate: f64,
    /// Most recent processing time.
    pub last_processed_at: Option<DateTime<Utc>>,
    /// Per event type `{total, processed, failed}`.
    pub breakdown_by_event_type: BTreeMap<String, EventTypeCounts>,
}

#[allow(clippy::cast_precision_loss)]
fn success_rate(processed: i64, failed: i64) -> f64 {
    let attempted = processed + failed;
    if attempted == 0 {
        0.0
    } else {
        processed as f64 / attempted as f64 * 100.0
    }
}

/// Counts processed, pending, failed and dead-lettered events.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the store is unavailable.
pub async fn get_stats(
    settings: &ProjectorSettings,
    store: &dyn ProjectionStore,
) -> Result<ProjectorStats, DomainError> {
    let stats = store.processing_stats(settings.max_attempts).await?;
    Ok(ProjectorStats {
        total_processed: stats.processed,
        pending: stats.pending,
        failed: stats.failed,
        dead_lettered: stats.dead_lettered,
        success_rate: success_rate(stats.processed, stats.failed),
        last_processed_at: stats.last_processed_at,
        breakdown_by_event_type: stats.by_event_type,
    })
}

/// The dispatch table, for introspection.
#[must_use]
pub fn get_mappings() -> Vec<EventMapping> {
    EventKind::ALL.into_iter().map(EventKind::mapping).collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use jovey_core::event::{CreatedBy, NewEvent};
    use jovey_core::repository::EventStore;
    use jovey_test_support::{FailingEventStore, FixedClock, InMemoryEventStore};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::application::command_handlers::handle_process_batch;
    use crate::domain::commands::ProcessBatch;

    async fn append(store: &InMemoryEventStore, event_type: &str, data: serde_json::Value) {
        store
            .append(NewEvent {
                event_type: event_type.to_owned(),
                aggregate_type: "product".to_owned(),
                aggregate_id: Uuid::new_v4(),
                data,
                metadata: json!({}),
                created_by: CreatedBy::System,
                user_id: None,
                correlation_id: None,
                causation_id: None,
                idempotency_key: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stats_of_empty_log_have_zero_success_rate() {
        let store = InMemoryEventStore::new();

        let stats = get_stats(&ProjectorSettings::default(), &store).await.unwrap();

        assert_eq!(stats.total_processed, 0);
        assert!(stats.success_rate.abs() < f64::EPSILON);
        assert!(stats.last_processed_at.is_none());
    }

    #[tokio::test]
    async fn test_stats_count_processed_failed_and_pending() {
        // Arrange
        let store = InMemoryEventStore::new();
        for sku in ["PUMP-2HP-RES", "PUMP-3HP-COM", "FLT-10IN-SED"] {
            let product = json!({"sku": sku, "name": "Pump", "base_price": 1.0});
            append(&store, "product.created", product).await;
        }
        append(&store, "product.deactivated", json!({})).await;
        let settings = ProjectorSettings::default();
        handle_process_batch(ProcessBatch { limit: 4 }, &settings, &FixedClock::noon(), &store)
            .await
            .unwrap();
        append(&store, "product.updated", json!({"changes": {"name": "x"}})).await;

        // Act
        let stats = get_stats(&settings, &store).await.unwrap();

        // Assert
        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.dead_lettered, 0);
        assert!((stats.success_rate - 75.0).abs() < 1e-9);
        assert_eq!(stats.last_processed_at, Some(FixedClock::noon().0));
        let created = &stats.breakdown_by_event_type["product.created"];
        assert_eq!((created.total, created.processed, created.failed), (3, 3, 0));
    }

    #[tokio::test]
    async fn test_stats_propagate_store_failure() {
        let result = get_stats(&ProjectorSettings::default(), &FailingEventStore).await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }

    #[test]
    fn test_mappings_cover_every_event_kind() {
        let mappings = get_mappings();

        assert_eq!(mappings.len(), 18);
        let order_created = mappings
            .iter()
            .find(|m| m.event_type == "order.created")
            .unwrap();
        assert_eq!(order_created.aggregate_type, "order");
        assert!(order_created.operations.contains(&"reserve stock for each line"));
    }
}
