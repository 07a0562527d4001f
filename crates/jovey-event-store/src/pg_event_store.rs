//! `PostgreSQL` implementation of the `EventStore` trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};
use uuid::Uuid;

use jovey_core::error::DomainError;
use jovey_core::event::{
    Event, EventQuery, EventStreamStats, EventTypeDescriptor, NewEvent, SortOrder,
};
use jovey_core::repository::EventStore;

use crate::infrastructure;
use crate::rows::{EventRow, EventTypeRow, into_events};
use crate::schema::{EVENT_COLUMNS, EVENT_LOG_APPEND_LOCK};

/// PostgreSQL-backed append-only event log.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Creates a new `PgEventStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts the event type catalog served by `event_types`, so the table
    /// always matches the dispatch table the running binary was built with.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the database fails.
    #[instrument(skip_all, fields(count = types.len()))]
    pub async fn register_event_types(
        &self,
        types: &[EventTypeDescriptor],
    ) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;
        for descriptor in types {
            sqlx::query(
                "INSERT INTO event_types (event_type, aggregate_type, description, example) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (event_type) DO UPDATE SET \
                 aggregate_type = EXCLUDED.aggregate_type, \
                 description = EXCLUDED.description, \
                 example = EXCLUDED.example",
            )
            .bind(&descriptor.event_type)
            .bind(&descriptor.aggregate_type)
            .bind(&descriptor.description)
            .bind(&descriptor.example)
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?;
        }
        tx.commit().await.map_err(infrastructure)?;
        debug!("event type catalog registered");
        Ok(())
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    #[instrument(skip(self, event), fields(event_type = %event.event_type, aggregate_id = %event.aggregate_id))]
    async fn append(&self, event: NewEvent) -> Result<Event, DomainError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(EVENT_LOG_APPEND_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?;

        if let Some(key) = &event.idempotency_key {
            let existing: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM events WHERE idempotency_key = $1")
                    .bind(key)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(infrastructure)?;
            if let Some((existing_event_id,)) = existing {
                return Err(DomainError::DuplicateIdempotencyKey {
                    key: key.clone(),
                    existing_event_id,
                });
            }
        }

        let sql = format!(
            "INSERT INTO events (id, sequence_number, event_type, aggregate_type, aggregate_id, \
             data, metadata, created_by, user_id, created_at, correlation_id, causation_id, \
             idempotency_key) \
             VALUES ($1, (SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM events), \
             $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {EVENT_COLUMNS}"
        );
        let inserted: Result<EventRow, sqlx::Error> = sqlx::query_as(&sql)
            .bind(Uuid::now_v7())
            .bind(&event.event_type)
            .bind(&event.aggregate_type)
            .bind(event.aggregate_id)
            .bind(&event.data)
            .bind(&event.metadata)
            .bind(event.created_by.to_string())
            .bind(event.user_id)
            .bind(event.created_at)
            .bind(event.correlation_id)
            .bind(event.causation_id)
            .bind(&event.idempotency_key)
            .fetch_one(&mut *tx)
            .await;
        let row = match inserted {
            Ok(row) => row,
            Err(err) if is_idempotency_violation(&err) => {
                tx.rollback().await.map_err(infrastructure)?;
                return Err(self.duplicate_key_error(&event).await);
            }
            Err(err) => return Err(infrastructure(err)),
        };

        tx.commit().await.map_err(infrastructure)?;

        let stored = Event::try_from(row)?;
        debug!(event_id = %stored.id, sequence_number = stored.sequence_number, "event appended");
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn find(&self, event_id: Uuid) -> Result<Option<Event>, DomainError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        let row: Option<EventRow> = sqlx::query_as(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?;
        row.map(Event::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn query(&self, query: &EventQuery) -> Result<Vec<Event>, DomainError> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events WHERE TRUE"));
        let filter = &query.filter;

        if let Some(event_type) = &filter.event_type {
            builder.push(" AND event_type = ").push_bind(event_type.clone());
        }
        if let Some(aggregate_type) = &filter.aggregate_type {
            builder
                .push(" AND aggregate_type = ")
                .push_bind(aggregate_type.clone());
        }
        if let Some(aggregate_id) = filter.aggregate_id {
            builder.push(" AND aggregate_id = ").push_bind(aggregate_id);
        }
        if let Some(is_processed) = filter.is_processed {
            builder.push(" AND is_processed = ").push_bind(is_processed);
        }
        if let Some(correlation_id) = filter.correlation_id {
            builder
                .push(" AND correlation_id = ")
                .push_bind(correlation_id);
        }
        if let Some(created_by) = &filter.created_by {
            builder.push(" AND created_by = ").push_bind(created_by.clone());
        }
        if let Some(after) = query.after_sequence {
            builder.push(" AND sequence_number > ").push_bind(after);
        }
        if let Some(before) = query.before_sequence {
            builder.push(" AND sequence_number < ").push_bind(before);
        }

        builder.push(match query.order {
            SortOrder::Ascending => " ORDER BY sequence_number ASC",
            SortOrder::Descending => " ORDER BY sequence_number DESC",
        });
        builder.push(" LIMIT ").push_bind(query.limit);

        let rows: Vec<EventRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        into_events(rows)
    }

    #[instrument(skip(self))]
    async fn load_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Vec<Event>, DomainError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE aggregate_type = $1 AND aggregate_id = $2 \
             ORDER BY sequence_number ASC"
        );
        let rows: Vec<EventRow> = sqlx::query_as(&sql)
            .bind(aggregate_type)
            .bind(aggregate_id)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        into_events(rows)
    }

    #[instrument(skip(self))]
    async fn event_types(&self) -> Result<Vec<EventTypeDescriptor>, DomainError> {
        let rows: Vec<EventTypeRow> = sqlx::query_as(
            "SELECT event_type, aggregate_type, description, example \
             FROM event_types ORDER BY event_type",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(rows.into_iter().map(EventTypeDescriptor::from).collect())
    }

    #[instrument(skip(self))]
    async fn stream_stats(&self) -> Result<EventStreamStats, DomainError> {
        let (total_events, processed_events, failed_events): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
                    COUNT(*) FILTER (WHERE is_processed), \
                    COUNT(*) FILTER (WHERE NOT is_processed AND processing_error IS NOT NULL) \
             FROM events",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)?;

        let event_types: Vec<(String, i64)> =
            sqlx::query_as("SELECT event_type, COUNT(*) FROM events GROUP BY event_type")
                .fetch_all(&self.pool)
                .await
                .map_err(infrastructure)?;
        let aggregate_types: Vec<(String, i64)> =
            sqlx::query_as("SELECT aggregate_type, COUNT(*) FROM events GROUP BY aggregate_type")
                .fetch_all(&self.pool)
                .await
                .map_err(infrastructure)?;

        Ok(EventStreamStats {
            total_events,
            processed_events,
            unprocessed_events: total_events - processed_events,
            failed_events,
            event_types: event_types.into_iter().collect::<BTreeMap<_, _>>(),
            aggregate_types: aggregate_types.into_iter().collect::<BTreeMap<_, _>>(),
        })
    }
}

impl PgEventStore {
    async fn duplicate_key_error(&self, event: &NewEvent) -> DomainError {
        let key = event.idempotency_key.clone().unwrap_or_default();
        let existing: Result<(Uuid,), sqlx::Error> =
            sqlx::query_as("SELECT id FROM events WHERE idempotency_key = $1")
                .bind(&key)
                .fetch_one(&self.pool)
                .await;
        match existing {
            Ok((existing_event_id,)) => DomainError::DuplicateIdempotencyKey {
                key,
                existing_event_id,
            },
            Err(err) => infrastructure(err),
        }
    }
}

// The advisory lock makes the pre-check authoritative; the unique index is a
// backstop for writers that bypass this store.
fn is_idempotency_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                && db_err.constraint() == Some("events_idempotency_key_key")
        }
        _ => false,
    }
}
