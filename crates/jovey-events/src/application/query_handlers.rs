//! Query handlers for the Event Store context.
//!
//! Read-only views over the log. Nothing here mutates an event.

use jovey_core::error::DomainError;
use jovey_core::event::{
    Event, EventFilter, EventQuery, EventStreamStats, EventTypeDescriptor, SortOrder,
};
use jovey_core::repository::EventStore;
use uuid::Uuid;

use crate::domain::validation::{normalize_aggregate_type, validate_limit};

/// Runs a filtered, bounded read over the log.
///
/// Type filters are matched case-insensitively.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the limit is outside 1-1000.
/// Returns `DomainError::Infrastructure` if the store is unavailable.
pub async fn query_events(
    mut query: EventQuery,
    store: &dyn EventStore,
) -> Result<Vec<Event>, DomainError> {
    query.limit = validate_limit(query.limit)?;
    query.filter.event_type = query.filter.event_type.map(|t| t.to_lowercase());
    query.filter.aggregate_type = query.filter.aggregate_type.map(|t| t.to_lowercase());
    store.query(&query).await
}

/// Retrieves one event by id.
///
/// # Errors
///
/// Returns `DomainError::EventNotFound` if no event has this id.
pub async fn get_event(event_id: Uuid, store: &dyn EventStore) -> Result<Event, DomainError> {
    store
        .find(event_id)
        .await?
        .ok_or(DomainError::EventNotFound(event_id))
}

/// Every event of one aggregate, oldest first.
///
/// An aggregate with no events yields an empty history, not an error.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a malformed aggregate type.
pub async fn get_aggregate_history(
    aggregate_type: &str,
    aggregate_id: Uuid,
    store: &dyn EventStore,
) -> Result<Vec<Event>, DomainError> {
    let aggregate_type = normalize_aggregate_type(aggregate_type)?;
    store.load_aggregate(&aggregate_type, aggregate_id).await
}

/// The event type catalog.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the store is unavailable.
pub async fn list_event_types(
    store: &dyn EventStore,
) -> Result<Vec<EventTypeDescriptor>, DomainError> {
    store.event_types().await
}

/// Counts over the whole log.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the store is unavailable.
pub async fn get_stream_stats(store: &dyn EventStore) -> Result<EventStreamStats, DomainError> {
    store.stream_stats().await
}

/// The oldest unprocessed events, ascending by sequence number.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the limit is outside 1-1000.
pub async fn list_unprocessed(
    limit: i64,
    store: &dyn EventStore,
) -> Result<Vec<Event>, DomainError> {
    let query = EventQuery {
        filter: EventFilter {
            is_processed: Some(false),
            ..EventFilter::default()
        },
        order: SortOrder::Ascending,
        limit: validate_limit(limit)?,
        ..EventQuery::default()
    };
    store.query(&query).await
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use jovey_core::error::DomainError;
    use jovey_core::event::{CreatedBy, EventFilter, EventQuery, EventTypeDescriptor, NewEvent};
    use jovey_core::projection::{ProjectionStore, ProjectionUnit};
    use jovey_core::repository::EventStore;
    use jovey_test_support::InMemoryEventStore;
    use serde_json::json;
    use uuid::Uuid;

    use crate::application::query_handlers::{
        get_aggregate_history, get_event, get_stream_stats, list_event_types, list_unprocessed,
        query_events,
    };

    fn new_event(event_type: &str, aggregate_type: &str, aggregate_id: Uuid) -> NewEvent {
        NewEvent {
            event_type: event_type.to_owned(),
            aggregate_type: aggregate_type.to_owned(),
            aggregate_id,
            data: json!({}),
            metadata: json!({}),
            created_by: CreatedBy::System,
            user_id: None,
            correlation_id: None,
            causation_id: None,
            idempotency_key: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_query_events_defaults_to_newest_first() {
        // Arrange
        let store = InMemoryEventStore::new();
        for _ in 0..3 {
            store
                .append(new_event("product.updated", "product", Uuid::new_v4()))
                .await
                .unwrap();
        }

        // Act
        let events = query_events(EventQuery::default(), &store).await.unwrap();

        // Assert
        let sequence: Vec<i64> = events.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequence, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_query_events_combines_filters_and_lowercases_types() {
        // Arrange
        let store = InMemoryEventStore::new();
        let correlation_id = Uuid::new_v4();
        let mut tagged = new_event("order.created", "order", Uuid::new_v4());
        tagged.correlation_id = Some(correlation_id);
        store.append(tagged).await.unwrap();
        store
            .append(new_event("order.created", "order", Uuid::new_v4()))
            .await
            .unwrap();
        store
            .append(new_event("product.created", "product", Uuid::new_v4()))
            .await
            .unwrap();

        let query = EventQuery {
            filter: EventFilter {
                event_type: Some("ORDER.CREATED".into()),
                correlation_id: Some(correlation_id),
                ..EventFilter::default()
            },
            ..EventQuery::default()
        };

        // Act
        let events = query_events(query, &store).await.unwrap();

        // Assert
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence_number, 1);
    }

    #[tokio::test]
    async fn test_query_events_rejects_out_of_range_limit() {
        let store = InMemoryEventStore::new();
        let query = EventQuery {
            limit: 5000,
            ..EventQuery::default()
        };

        let result = query_events(query, &store).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_query_events_pages_with_before_sequence() {
        // Arrange
        let store = InMemoryEventStore::new();
        for _ in 0..5 {
            store
                .append(new_event("customer.registered", "customer", Uuid::new_v4()))
                .await
                .unwrap();
        }
        let first_page = query_events(
            EventQuery {
                limit: 2,
                ..EventQuery::default()
            },
            &store,
        )
        .await
        .unwrap();

        // Act
        let second_page = query_events(
            EventQuery {
                limit: 2,
                before_sequence: first_page.last().map(|e| e.sequence_number),
                ..EventQuery::default()
            },
            &store,
        )
        .await
        .unwrap();

        // Assert
        let sequence: Vec<i64> = second_page.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequence, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_get_event_returns_not_found_for_unknown_id() {
        let store = InMemoryEventStore::new();
        let missing = Uuid::new_v4();

        let result = get_event(missing, &store).await;

        match result {
            Err(DomainError::EventNotFound(id)) => assert_eq!(id, missing),
            other => panic!("expected EventNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_repeated_reads_return_identical_events() {
        // Arrange
        let store = InMemoryEventStore::new();
        let stored = store
            .append(new_event("dealer.approved", "dealer", Uuid::new_v4()))
            .await
            .unwrap();

        // Act
        let first = get_event(stored.id, &store).await.unwrap();
        let second = get_event(stored.id, &store).await.unwrap();

        // Assert
        assert_eq!(first, stored);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_aggregate_history_is_ascending_and_case_insensitive() {
        // Arrange
        let store = InMemoryEventStore::new();
        let order_id = Uuid::new_v4();
        store
            .append(new_event("order.created", "order", order_id))
            .await
            .unwrap();
        store
            .append(new_event("product.created", "product", Uuid::new_v4()))
            .await
            .unwrap();
        store
            .append(new_event("order.payment_received", "order", order_id))
            .await
            .unwrap();
        store
            .append(new_event("order.fulfilled", "order", order_id))
            .await
            .unwrap();

        // Act
        let history = get_aggregate_history("Order", order_id, &store)
            .await
            .unwrap();

        // Assert
        let sequence: Vec<i64> = history.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequence, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn test_aggregate_history_of_unknown_aggregate_is_empty() {
        let store = InMemoryEventStore::new();

        let history = get_aggregate_history("order", Uuid::new_v4(), &store)
            .await
            .unwrap();

        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_list_unprocessed_is_ascending_and_skips_processed() {
        // Arrange
        let store = InMemoryEventStore::new();
        let first = store
            .append(new_event("product.created", "product", Uuid::new_v4()))
            .await
            .unwrap();
        store
            .append(new_event("product.created", "product", Uuid::new_v4()))
            .await
            .unwrap();
        store
            .append(new_event("product.created", "product", Uuid::new_v4()))
            .await
            .unwrap();
        let mut unit = store.begin().await.unwrap();
        unit.claim(first.id).await.unwrap();
        unit.mark_processed(first.id, Utc::now()).await.unwrap();
        unit.commit().await.unwrap();

        // Act
        let events = list_unprocessed(10, &store).await.unwrap();

        // Assert
        let sequence: Vec<i64> = events.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequence, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_catalog_and_stats_come_from_the_store() {
        // Arrange
        let store = InMemoryEventStore::with_catalog(vec![EventTypeDescriptor {
            event_type: "order.created".into(),
            aggregate_type: "order".into(),
            description: Some("A customer placed an order".into()),
            example: None,
        }]);
        store
            .append(new_event("order.created", "order", Uuid::new_v4()))
            .await
            .unwrap();
        store
            .append(new_event("order.created", "order", Uuid::new_v4()))
            .await
            .unwrap();

        // Act
        let catalog = list_event_types(&store).await.unwrap();
        let stats = get_stream_stats(&store).await.unwrap();

        // Assert
        assert_eq!(catalog.len(), 1);
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.unprocessed_events, 2);
        assert_eq!(stats.event_types.get("order.created"), Some(&2));
        assert_eq!(stats.aggregate_types.get("order"), Some(&2));
    }
}
