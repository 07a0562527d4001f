//! Column lists and lock keys shared by the `PostgreSQL` stores.
//!
//! Table definitions live in the workspace `migrations/` directory.

/// Every column of `events`, in `EventRow` order.
pub const EVENT_COLUMNS: &str = "id, sequence_number, event_type, aggregate_type, aggregate_id, \
     data, metadata, created_by, user_id, created_at, correlation_id, causation_id, \
     idempotency_key, is_processed, processed_at, processing_error, processing_attempts";

/// Key of the transaction-scoped advisory lock that serializes appends.
///
/// Holding it while reading `MAX(sequence_number)` makes sequence assignment
/// gapless and the idempotency-key check race free.
pub const EVENT_LOG_APPEND_LOCK: i64 = 0x4A4F_5645_595F_4C4F;

/// Columns of `products`, with money read back as `float8`.
pub const PRODUCT_COLUMNS: &str = "id, sku, name, category_id, base_price::float8 AS base_price, \
     stock_quantity, low_stock_threshold, is_active, created_at, updated_at";

/// Columns of `orders`, with money read back as `float8`.
pub const ORDER_COLUMNS: &str = "id, customer_id, status, total::float8 AS total, lines, \
     amount_paid::float8 AS amount_paid, payment_method, transaction_id, tracking_number, \
     cancellation_reason, created_at, updated_at";

/// Columns of `customers`.
pub const CUSTOMER_COLUMNS: &str = "id, email, name, phone, created_at, updated_at";

/// Columns of `dealers`.
pub const DEALER_COLUMNS: &str =
    "id, business_name, email, status, approved_by, approved_at, created_at, updated_at";

/// Columns of `agent_decisions`.
pub const DECISION_COLUMNS: &str = "id, agent, decision_type, confidence, status, resolved_by, \
     rejection_reason, proposal, created_at, updated_at";
