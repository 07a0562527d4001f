//! In-memory event log implementing both storage seams.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use jovey_core::error::DomainError;
use jovey_core::event::{
    Event, EventQuery, EventStreamStats, EventTypeDescriptor, NewEvent, SortOrder,
};
use jovey_core::projection::{EventTypeCounts, ProcessingStats, ProjectionStore, ProjectionUnit};
use jovey_core::repository::EventStore;
use jovey_core::state::{
    CustomerRecord, DealerPriceRecord, DealerRecord, DecisionRecord, OrderRecord,
    PriceHistoryEntry, ProductRecord,
};
use uuid::Uuid;

use crate::unit::{InMemoryUnit, StateTables};

#[derive(Debug, Default)]
pub(crate) struct Inner {
    pub(crate) events: Vec<Event>,
    pub(crate) catalog: Vec<EventTypeDescriptor>,
    pub(crate) in_flight: HashSet<Uuid>,
    pub(crate) state: StateTables,
    unavailable: bool,
    commits_left: Option<usize>,
}

impl Inner {
    pub(crate) fn check_available(&self) -> Result<(), DomainError> {
        if self.unavailable {
            return Err(DomainError::Infrastructure("connection refused".into()));
        }
        Ok(())
    }

    pub(crate) fn check_commit_allowed(&mut self) -> Result<(), DomainError> {
        self.check_available()?;
        match self.commits_left {
            Some(0) => Err(DomainError::Infrastructure("connection reset".into())),
            Some(left) => {
                self.commits_left = Some(left - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

pub(crate) fn lock(shared: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An event log held in memory that behaves like the `PostgreSQL` stores:
/// gapless sequence numbers, unique idempotency keys, exclusive claims and
/// all-or-nothing units of work.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    shared: Arc<Mutex<Inner>>,
    state_latency: Option<Duration>,
}

impl InMemoryEventStore {
    /// Creates an empty store with an empty event type catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store serving `catalog` from `event_types`.
    #[must_use]
    pub fn with_catalog(catalog: Vec<EventTypeDescriptor>) -> Self {
        let store = Self::default();
        lock(&store.shared).catalog = catalog;
        store
    }

    /// Delays every current-state read and write by `latency`.
    #[must_use]
    pub fn with_state_latency(mut self, latency: Duration) -> Self {
        self.state_latency = Some(latency);
        self
    }

    /// Lets `n` more units commit; later commits fail with an
    /// infrastructure error.
    pub fn fail_commits_after(&self, n: usize) {
        lock(&self.shared).commits_left = Some(n);
    }

    /// Makes every storage call fail (`true`) or succeed again (`false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.shared).unavailable = unavailable;
    }

    /// Snapshot of the log in sequence order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        lock(&self.shared).events.clone()
    }

    /// Snapshot of one event.
    #[must_use]
    pub fn event(&self, event_id: Uuid) -> Option<Event> {
        lock(&self.shared)
            .events
            .iter()
            .find(|e| e.id == event_id)
            .cloned()
    }

    /// Snapshot of all committed current-state tables.
    #[must_use]
    pub fn state(&self) -> StateTables {
        lock(&self.shared).state.clone()
    }

    /// Committed product row.
    #[must_use]
    pub fn product(&self, id: Uuid) -> Option<ProductRecord> {
        lock(&self.shared).state.products.get(&id).cloned()
    }

    /// Committed price history of one product, oldest first.
    #[must_use]
    pub fn price_history(&self, product_id: Uuid) -> Vec<PriceHistoryEntry> {
        lock(&self.shared)
            .state
            .price_history
            .iter()
            .filter(|entry| entry.product_id == product_id)
            .cloned()
            .collect()
    }

    /// Committed order row.
    #[must_use]
    pub fn order(&self, id: Uuid) -> Option<OrderRecord> {
        lock(&self.shared).state.orders.get(&id).cloned()
    }

    /// Committed customer row.
    #[must_use]
    pub fn customer(&self, id: Uuid) -> Option<CustomerRecord> {
        lock(&self.shared).state.customers.get(&id).cloned()
    }

    /// Committed dealer row.
    #[must_use]
    pub fn dealer(&self, id: Uuid) -> Option<DealerRecord> {
        lock(&self.shared).state.dealers.get(&id).cloned()
    }

    /// Committed dealer price.
    #[must_use]
    pub fn dealer_price(&self, dealer_id: Uuid, product_id: Uuid) -> Option<DealerPriceRecord> {
        lock(&self.shared)
            .state
            .dealer_prices
            .get(&(dealer_id, product_id))
            .cloned()
    }

    /// Committed agent decision row.
    #[must_use]
    pub fn decision(&self, id: Uuid) -> Option<DecisionRecord> {
        lock(&self.shared).state.decisions.get(&id).cloned()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: NewEvent) -> Result<Event, DomainError> {
        let mut inner = lock(&self.shared);
        inner.check_available()?;
        if let Some(key) = &event.idempotency_key {
            if let Some(existing) = inner
                .events
                .iter()
                .find(|e| e.idempotency_key.as_ref() == Some(key))
            {
                return Err(DomainError::DuplicateIdempotencyKey {
                    key: key.clone(),
                    existing_event_id: existing.id,
                });
            }
        }

        let sequence_number = i64::try_from(inner.events.len())
            .map_err(|e| DomainError::Infrastructure(e.to_string()))?
            + 1;
        let stored = Event {
            id: Uuid::now_v7(),
            sequence_number,
            event_type: event.event_type,
            aggregate_type: event.aggregate_type,
            aggregate_id: event.aggregate_id,
            data: event.data,
            metadata: event.metadata,
            created_by: event.created_by,
            user_id: event.user_id,
            created_at: event.created_at,
            correlation_id: event.correlation_id,
            causation_id: event.causation_id,
            idempotency_key: event.idempotency_key,
            is_processed: false,
            processed_at: None,
            processing_error: None,
            processing_attempts: 0,
        };
        inner.events.push(stored.clone());
        Ok(stored)
    }

    async fn find(&self, event_id: Uuid) -> Result<Option<Event>, DomainError> {
        let inner = lock(&self.shared);
        inner.check_available()?;
        Ok(inner.events.iter().find(|e| e.id == event_id).cloned())
    }

    async fn query(&self, query: &EventQuery) -> Result<Vec<Event>, DomainError> {
        let inner = lock(&self.shared);
        inner.check_available()?;
        let limit = usize::try_from(query.limit).unwrap_or(0);
        let matching = inner.events.iter().filter(|e| query.matches(e)).cloned();
        Ok(match query.order {
            SortOrder::Ascending => matching.take(limit).collect(),
            SortOrder::Descending => matching.rev().take(limit).collect(),
        })
    }

    async fn load_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Vec<Event>, DomainError> {
        let inner = lock(&self.shared);
        inner.check_available()?;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.aggregate_type == aggregate_type && e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn event_types(&self) -> Result<Vec<EventTypeDescriptor>, DomainError> {
        let inner = lock(&self.shared);
        inner.check_available()?;
        Ok(inner.catalog.clone())
    }

    async fn stream_stats(&self) -> Result<EventStreamStats, DomainError> {
        let inner = lock(&self.shared);
        inner.check_available()?;
        let mut stats = EventStreamStats::default();
        for event in &inner.events {
            stats.total_events += 1;
            if event.is_processed {
                stats.processed_events += 1;
            } else {
                stats.unprocessed_events += 1;
            }
            if event.has_failed() {
                stats.failed_events += 1;
            }
            *stats.event_types.entry(event.event_type.clone()).or_default() += 1;
            *stats
                .aggregate_types
                .entry(event.aggregate_type.clone())
                .or_default() += 1;
        }
        Ok(stats)
    }
}

#[async_trait]
impl ProjectionStore for InMemoryEventStore {
    async fn pending_events(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<Event>, DomainError> {
        let inner = lock(&self.shared);
        inner.check_available()?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(inner
            .events
            .iter()
            .filter(|e| !e.is_processed && e.processing_attempts < max_attempts)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn ProjectionUnit>, DomainError> {
        lock(&self.shared).check_available()?;
        Ok(Box::new(InMemoryUnit::new(
            Arc::clone(&self.shared),
            self.state_latency,
        )))
    }

    async fn record_failure(&self, event_id: Uuid, error: &str) -> Result<(), DomainError> {
        let mut inner = lock(&self.shared);
        inner.check_available()?;
        if let Some(event) = inner
            .events
            .iter_mut()
            .find(|e| e.id == event_id && !e.is_processed)
        {
            event.processing_error = Some(error.to_owned());
            event.processing_attempts += 1;
        }
        Ok(())
    }

    async fn processing_stats(&self, max_attempts: i32) -> Result<ProcessingStats, DomainError> {
        let inner = lock(&self.shared);
        inner.check_available()?;
        let mut stats = ProcessingStats::default();
        let mut by_event_type: BTreeMap<String, EventTypeCounts> = BTreeMap::new();
        for event in &inner.events {
            let counts = by_event_type.entry(event.event_type.clone()).or_default();
            counts.total += 1;
            if event.is_processed {
                stats.processed += 1;
                counts.processed += 1;
                stats.last_processed_at = stats.last_processed_at.max(event.processed_at);
            } else if event.has_failed() {
                stats.failed += 1;
                counts.failed += 1;
                if event.processing_attempts >= max_attempts {
                    stats.dead_lettered += 1;
                }
            } else {
                stats.pending += 1;
            }
        }
        stats.by_event_type = by_event_type;
        Ok(stats)
    }
}
