//! Database rows and their conversion into domain records.

use chrono::{DateTime, Utc};
use jovey_core::error::DomainError;
use jovey_core::event::{Event, EventTypeDescriptor};
use jovey_core::state::{
    CustomerRecord, DealerRecord, DecisionRecord, OrderLine, OrderRecord, ProductRecord,
};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub(crate) struct EventRow {
    id: Uuid,
    sequence_number: i64,
    event_type: String,
    aggregate_type: String,
    aggregate_id: Uuid,
    data: serde_json::Value,
    metadata: serde_json::Value,
    created_by: String,
    user_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    correlation_id: Option<Uuid>,
    causation_id: Option<Uuid>,
    idempotency_key: Option<String>,
    is_processed: bool,
    processed_at: Option<DateTime<Utc>>,
    processing_error: Option<String>,
    processing_attempts: i32,
}

impl TryFrom<EventRow> for Event {
    type Error = DomainError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let created_by = row.created_by.parse().map_err(|e| {
            DomainError::Infrastructure(format!("event {} has corrupt created_by: {e}", row.id))
        })?;
        Ok(Self {
            id: row.id,
            sequence_number: row.sequence_number,
            event_type: row.event_type,
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            data: row.data,
            metadata: row.metadata,
            created_by,
            user_id: row.user_id,
            created_at: row.created_at,
            correlation_id: row.correlation_id,
            causation_id: row.causation_id,
            idempotency_key: row.idempotency_key,
            is_processed: row.is_processed,
            processed_at: row.processed_at,
            processing_error: row.processing_error,
            processing_attempts: row.processing_attempts,
        })
    }
}

pub(crate) fn into_events(rows: Vec<EventRow>) -> Result<Vec<Event>, DomainError> {
    rows.into_iter().map(Event::try_from).collect()
}

#[derive(Debug, FromRow)]
pub(crate) struct EventTypeRow {
    event_type: String,
    aggregate_type: String,
    description: Option<String>,
    example: Option<serde_json::Value>,
}

impl From<EventTypeRow> for EventTypeDescriptor {
    fn from(row: EventTypeRow) -> Self {
        Self {
            event_type: row.event_type,
            aggregate_type: row.aggregate_type,
            description: row.description,
            example: row.example,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    category_id: Option<Uuid>,
    base_price: f64,
    stock_quantity: i64,
    low_stock_threshold: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            sku: row.sku,
            name: row.name,
            category_id: row.category_id,
            base_price: row.base_price,
            stock_quantity: row.stock_quantity,
            low_stock_threshold: row.low_stock_threshold,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct OrderRow {
    id: Uuid,
    customer_id: Uuid,
    status: String,
    total: f64,
    lines: Json<Vec<OrderLine>>,
    amount_paid: f64,
    payment_method: Option<String>,
    transaction_id: Option<String>,
    tracking_number: Option<String>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for OrderRecord {
    type Error = DomainError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            customer_id: row.customer_id,
            status: row.status.parse().map_err(corrupt_status)?,
            total: row.total,
            lines: row.lines.0,
            amount_paid: row.amount_paid,
            payment_method: row.payment_method,
            transaction_id: row.transaction_id,
            tracking_number: row.tracking_number,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct CustomerRow {
    id: Uuid,
    email: String,
    name: String,
    phone: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CustomerRow> for CustomerRecord {
    fn from(row: CustomerRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            phone: row.phone,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct DealerRow {
    id: Uuid,
    business_name: String,
    email: String,
    status: String,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DealerRow> for DealerRecord {
    type Error = DomainError;

    fn try_from(row: DealerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            business_name: row.business_name,
            email: row.email,
            status: row.status.parse().map_err(corrupt_status)?,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct DecisionRow {
    id: Uuid,
    agent: String,
    decision_type: String,
    confidence: Option<f64>,
    status: String,
    resolved_by: Option<String>,
    rejection_reason: Option<String>,
    proposal: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DecisionRow> for DecisionRecord {
    type Error = DomainError;

    fn try_from(row: DecisionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            agent: row.agent,
            decision_type: row.decision_type,
            confidence: row.confidence,
            status: row.status.parse().map_err(corrupt_status)?,
            resolved_by: row.resolved_by,
            rejection_reason: row.rejection_reason,
            proposal: row.proposal,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// A status the CHECK constraints should have rejected means the table itself
// is broken, not the event being applied.
fn corrupt_status(err: DomainError) -> DomainError {
    DomainError::Infrastructure(format!("corrupt status column: {err}"))
}
