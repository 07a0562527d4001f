//! `PostgreSQL` implementation of the projection seams.
//!
//! Each `PgProjectionUnit` wraps one database transaction. Claiming an event
//! takes a `FOR UPDATE SKIP LOCKED` row lock, so two projectors racing for the
//! same event never both apply it.
//!
//! State writes that break a table constraint surface as
//! `DomainError::ConstraintViolation`, which the projector records on the
//! event instead of stopping the batch.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use jovey_core::error::DomainError;
use jovey_core::event::Event;
use jovey_core::projection::{
    Claim, EventTypeCounts, ProcessingStats, ProjectionStore, ProjectionUnit,
};
use jovey_core::state::{
    CustomerRecord, DealerPriceRecord, DealerRecord, DecisionRecord, OrderRecord,
    PriceHistoryEntry, ProductRecord, StateWriter,
};

use crate::rows::{CustomerRow, DealerRow, DecisionRow, EventRow, OrderRow, ProductRow, into_events};
use crate::schema::{
    CUSTOMER_COLUMNS, DEALER_COLUMNS, DECISION_COLUMNS, EVENT_COLUMNS, ORDER_COLUMNS,
    PRODUCT_COLUMNS,
};
use crate::{infrastructure, state_error};

/// PostgreSQL-backed store for the Database Manager.
#[derive(Debug, Clone)]
pub struct PgProjectionStore {
    pool: PgPool,
}

impl PgProjectionStore {
    /// Creates a new `PgProjectionStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectionStore for PgProjectionStore {
    #[instrument(skip(self))]
    async fn pending_events(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<Event>, DomainError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE is_processed = FALSE AND processing_attempts < $1 \
             ORDER BY sequence_number ASC LIMIT $2"
        );
        let rows: Vec<EventRow> = sqlx::query_as(&sql)
            .bind(max_attempts)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        into_events(rows)
    }

    async fn begin(&self) -> Result<Box<dyn ProjectionUnit>, DomainError> {
        let tx = self.pool.begin().await.map_err(infrastructure)?;
        Ok(Box::new(PgProjectionUnit { tx: Some(tx) }))
    }

    #[instrument(skip(self, error))]
    async fn record_failure(&self, event_id: Uuid, error: &str) -> Result<(), DomainError> {
        sqlx::query(
            "UPDATE events \
             SET processing_error = $2, processing_attempts = processing_attempts + 1 \
             WHERE id = $1 AND is_processed = FALSE",
        )
        .bind(event_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn processing_stats(&self, max_attempts: i32) -> Result<ProcessingStats, DomainError> {
        let (processed, pending, failed, dead_lettered, last_processed_at): (
            i64,
            i64,
            i64,
            i64,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE is_processed), \
                    COUNT(*) FILTER (WHERE NOT is_processed AND processing_error IS NULL), \
                    COUNT(*) FILTER (WHERE NOT is_processed AND processing_error IS NOT NULL), \
                    COUNT(*) FILTER (WHERE NOT is_processed AND processing_error IS NOT NULL \
                                     AND processing_attempts >= $1), \
                    MAX(processed_at) \
             FROM events",
        )
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)?;

        let per_type: Vec<(String, i64, i64, i64)> = sqlx::query_as(
            "SELECT event_type, \
                    COUNT(*), \
                    COUNT(*) FILTER (WHERE is_processed), \
                    COUNT(*) FILTER (WHERE NOT is_processed AND processing_error IS NOT NULL) \
             FROM events GROUP BY event_type",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;

        let by_event_type = per_type
            .into_iter()
            .map(|(event_type, total, processed, failed)| {
                (
                    event_type,
                    EventTypeCounts {
                        total,
                        processed,
                        failed,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        Ok(ProcessingStats {
            processed,
            pending,
            failed,
            dead_lettered,
            last_processed_at,
            by_event_type,
        })
    }
}

/// One Database Manager transaction.
///
/// Dropping the unit without committing rolls the transaction back.
pub struct PgProjectionUnit {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgProjectionUnit {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, DomainError> {
        self.tx
            .as_mut()
            .ok_or_else(|| DomainError::Infrastructure("unit of work already finished".into()))
    }
}

#[async_trait]
impl ProjectionUnit for PgProjectionUnit {
    #[instrument(skip(self))]
    async fn claim(&mut self, event_id: Uuid) -> Result<Claim, DomainError> {
        let tx = self.tx()?;
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE SKIP LOCKED");
        let locked: Option<EventRow> = sqlx::query_as(&sql)
            .bind(event_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(infrastructure)?;

        if let Some(row) = locked {
            let event = Event::try_from(row)?;
            if event.is_processed {
                return Ok(Claim::AlreadyProcessed);
            }
            return Ok(Claim::Claimed(Box::new(event)));
        }

        // Either no such row or another transaction holds it.
        let status: Option<(bool,)> = sqlx::query_as("SELECT is_processed FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(infrastructure)?;
        Ok(match status {
            None => Claim::NotFound,
            Some((true,)) => Claim::AlreadyProcessed,
            Some((false,)) => Claim::Locked,
        })
    }

    fn state(&mut self) -> &mut dyn StateWriter {
        self
    }

    async fn mark_processed(
        &mut self,
        event_id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let tx = self.tx()?;
        sqlx::query(
            "UPDATE events \
             SET is_processed = TRUE, processed_at = $2, processing_error = NULL, \
                 processing_attempts = processing_attempts + 1 \
             WHERE id = $1",
        )
        .bind(event_id)
        .bind(processed_at)
        .execute(&mut **tx)
        .await
        .map_err(infrastructure)?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.map_err(infrastructure),
            None => Err(DomainError::Infrastructure(
                "unit of work already finished".into(),
            )),
        }
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(infrastructure),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StateWriter for PgProjectionUnit {
    async fn load_product(&mut self, id: Uuid) -> Result<Option<ProductRecord>, DomainError> {
        let tx = self.tx()?;
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE");
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(state_error)?;
        Ok(row.map(ProductRecord::from))
    }

    async fn find_product_by_sku(
        &mut self,
        sku: &str,
    ) -> Result<Option<ProductRecord>, DomainError> {
        let tx = self.tx()?;
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = $1");
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(sku)
            .fetch_optional(&mut **tx)
            .await
            .map_err(state_error)?;
        Ok(row.map(ProductRecord::from))
    }

    async fn save_product(&mut self, product: &ProductRecord) -> Result<(), DomainError> {
        let tx = self.tx()?;
        sqlx::query(
            "INSERT INTO products (id, sku, name, category_id, base_price, stock_quantity, \
                 low_stock_threshold, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5::numeric, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET \
                 sku = EXCLUDED.sku, name = EXCLUDED.name, category_id = EXCLUDED.category_id, \
                 base_price = EXCLUDED.base_price, stock_quantity = EXCLUDED.stock_quantity, \
                 low_stock_threshold = EXCLUDED.low_stock_threshold, \
                 is_active = EXCLUDED.is_active, updated_at = EXCLUDED.updated_at",
        )
        .bind(product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.category_id)
        .bind(product.base_price)
        .bind(product.stock_quantity)
        .bind(product.low_stock_threshold)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(state_error)?;
        Ok(())
    }

    async fn append_price_history(
        &mut self,
        entry: &PriceHistoryEntry,
    ) -> Result<(), DomainError> {
        let tx = self.tx()?;
        sqlx::query(
            "INSERT INTO product_price_history \
                 (product_id, event_id, old_price, new_price, reason, changed_at) \
             VALUES ($1, $2, $3::numeric, $4::numeric, $5, $6)",
        )
        .bind(entry.product_id)
        .bind(entry.event_id)
        .bind(entry.old_price)
        .bind(entry.new_price)
        .bind(&entry.reason)
        .bind(entry.changed_at)
        .execute(&mut **tx)
        .await
        .map_err(state_error)?;
        Ok(())
    }

    async fn load_order(&mut self, id: Uuid) -> Result<Option<OrderRecord>, DomainError> {
        let tx = self.tx()?;
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(state_error)?;
        row.map(OrderRecord::try_from).transpose()
    }

    async fn save_order(&mut self, order: &OrderRecord) -> Result<(), DomainError> {
        let tx = self.tx()?;
        sqlx::query(
            "INSERT INTO orders (id, customer_id, status, total, lines, amount_paid, \
                 payment_method, transaction_id, tracking_number, cancellation_reason, \
                 created_at, updated_at) \
             VALUES ($1, $2, $3, $4::numeric, $5, $6::numeric, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (id) DO UPDATE SET \
                 customer_id = EXCLUDED.customer_id, status = EXCLUDED.status, \
                 total = EXCLUDED.total, lines = EXCLUDED.lines, \
                 amount_paid = EXCLUDED.amount_paid, payment_method = EXCLUDED.payment_method, \
                 transaction_id = EXCLUDED.transaction_id, \
                 tracking_number = EXCLUDED.tracking_number, \
                 cancellation_reason = EXCLUDED.cancellation_reason, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.status.as_str())
        .bind(order.total)
        .bind(Json(&order.lines))
        .bind(order.amount_paid)
        .bind(&order.payment_method)
        .bind(&order.transaction_id)
        .bind(&order.tracking_number)
        .bind(&order.cancellation_reason)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(state_error)?;
        Ok(())
    }

    async fn load_customer(&mut self, id: Uuid) -> Result<Option<CustomerRecord>, DomainError> {
        let tx = self.tx()?;
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1 FOR UPDATE");
        let row: Option<CustomerRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(state_error)?;
        Ok(row.map(CustomerRecord::from))
    }

    async fn save_customer(&mut self, customer: &CustomerRecord) -> Result<(), DomainError> {
        let tx = self.tx()?;
        sqlx::query(
            "INSERT INTO customers (id, email, name, phone, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET \
                 email = EXCLUDED.email, name = EXCLUDED.name, phone = EXCLUDED.phone, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(customer.id)
        .bind(&customer.email)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(state_error)?;
        Ok(())
    }

    async fn load_dealer(&mut self, id: Uuid) -> Result<Option<DealerRecord>, DomainError> {
        let tx = self.tx()?;
        let sql = format!("SELECT {DEALER_COLUMNS} FROM dealers WHERE id = $1 FOR UPDATE");
        let row: Option<DealerRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(state_error)?;
        row.map(DealerRecord::try_from).transpose()
    }

    async fn save_dealer(&mut self, dealer: &DealerRecord) -> Result<(), DomainError> {
        let tx = self.tx()?;
        sqlx::query(
            "INSERT INTO dealers (id, business_name, email, status, approved_by, approved_at, \
                 created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET \
                 business_name = EXCLUDED.business_name, email = EXCLUDED.email, \
                 status = EXCLUDED.status, approved_by = EXCLUDED.approved_by, \
                 approved_at = EXCLUDED.approved_at, updated_at = EXCLUDED.updated_at",
        )
        .bind(dealer.id)
        .bind(&dealer.business_name)
        .bind(&dealer.email)
        .bind(dealer.status.as_str())
        .bind(&dealer.approved_by)
        .bind(dealer.approved_at)
        .bind(dealer.created_at)
        .bind(dealer.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(state_error)?;
        Ok(())
    }

    async fn save_dealer_price(&mut self, price: &DealerPriceRecord) -> Result<(), DomainError> {
        let tx = self.tx()?;
        sqlx::query(
            "INSERT INTO dealer_prices (dealer_id, product_id, dealer_price, updated_at) \
             VALUES ($1, $2, $3::numeric, $4) \
             ON CONFLICT (dealer_id, product_id) DO UPDATE SET \
                 dealer_price = EXCLUDED.dealer_price, updated_at = EXCLUDED.updated_at",
        )
        .bind(price.dealer_id)
        .bind(price.product_id)
        .bind(price.dealer_price)
        .bind(price.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(state_error)?;
        Ok(())
    }

    async fn load_decision(&mut self, id: Uuid) -> Result<Option<DecisionRecord>, DomainError> {
        let tx = self.tx()?;
        let sql = format!("SELECT {DECISION_COLUMNS} FROM agent_decisions WHERE id = $1 FOR UPDATE");
        let row: Option<DecisionRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(state_error)?;
        row.map(DecisionRecord::try_from).transpose()
    }

    async fn save_decision(&mut self, decision: &DecisionRecord) -> Result<(), DomainError> {
        let tx = self.tx()?;
        sqlx::query(
            "INSERT INTO agent_decisions (id, agent, decision_type, confidence, status, \
                 resolved_by, rejection_reason, proposal, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET \
                 agent = EXCLUDED.agent, decision_type = EXCLUDED.decision_type, \
                 confidence = EXCLUDED.confidence, status = EXCLUDED.status, \
                 resolved_by = EXCLUDED.resolved_by, \
                 rejection_reason = EXCLUDED.rejection_reason, \
                 proposal = EXCLUDED.proposal, updated_at = EXCLUDED.updated_at",
        )
        .bind(decision.id)
        .bind(&decision.agent)
        .bind(&decision.decision_type)
        .bind(decision.confidence)
        .bind(decision.status.as_str())
        .bind(&decision.resolved_by)
        .bind(&decision.rejection_reason)
        .bind(&decision.proposal)
        .bind(decision.created_at)
        .bind(decision.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(state_error)?;
        Ok(())
    }
}
