//! Current-state records written by the Database Manager.
//!
//! These mirror the mutable tables (`products`, `orders`, ...) that handlers
//! derive from events. Reads go through the same unit of work as writes so
//! that a handler sees its own changes.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Column bounds of the current-state tables.
///
/// Handlers check values against these before writing, and the stores
/// reject rows that exceed them.
pub mod limits {
    /// `products.sku`.
    pub const SKU_LEN: usize = 100;
    /// Product, customer and business names.
    pub const NAME_LEN: usize = 200;
    /// Customer and dealer emails.
    pub const EMAIL_LEN: usize = 255;
    /// `customers.phone`.
    pub const PHONE_LEN: usize = 50;
    /// `orders.payment_method`.
    pub const PAYMENT_METHOD_LEN: usize = 50;
    /// `orders.transaction_id` and `orders.tracking_number`.
    pub const REFERENCE_LEN: usize = 255;
    /// Attribution columns (`approved_by`, `resolved_by`) and the agent and
    /// decision type of a proposal.
    pub const ATTRIBUTION_LEN: usize = 100;
    /// Largest amount a `NUMERIC(12, 2)` column holds.
    pub const MAX_MONEY: f64 = 9_999_999_999.99;

    /// Returns `true` if `value` fits in a column of `max` characters.
    #[must_use]
    pub fn fits(value: &str, max: usize) -> bool {
        value.chars().count() <= max
    }

    /// Returns `true` if `value` is a storable non-negative amount.
    #[must_use]
    pub fn is_money(value: f64) -> bool {
        value.is_finite() && (0.0..=MAX_MONEY).contains(&value)
    }
}

/// Row of the `products` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Product id (the aggregate id).
    pub id: Uuid,
    /// Stock keeping unit, uppercase.
    pub sku: String,
    /// Display name.
    pub name: String,
    /// Owning category.
    pub category_id: Option<Uuid>,
    /// List price.
    pub base_price: f64,
    /// Units on hand.
    pub stock_quantity: i64,
    /// Level at or below which stock counts as low.
    pub low_stock_threshold: i64,
    /// Whether the product is sold.
    pub is_active: bool,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last change time.
    pub updated_at: DateTime<Utc>,
}

/// Row of the `product_price_history` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    /// Product whose price changed.
    pub product_id: Uuid,
    /// Event that changed it.
    pub event_id: Uuid,
    /// Price before the change.
    pub old_price: f64,
    /// Price after the change.
    pub new_price: f64,
    /// Why the price changed.
    pub reason: Option<String>,
    /// When the change was recorded.
    pub changed_at: DateTime<Utc>,
}

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Placed, not paid.
    Pending,
    /// Paid in full.
    Paid,
    /// Being prepared.
    Processing,
    /// Handed to a carrier.
    Shipped,
    /// Delivered.
    Fulfilled,
    /// Cancelled.
    Cancelled,
}

impl OrderStatus {
    /// Database/wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Fulfilled => "fulfilled",
            Self::Cancelled => "cancelled",
        }
    }

    /// No transitions leave a terminal status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Fulfilled | Self::Cancelled)
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "fulfilled" => Ok(Self::Fulfilled),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::Validation(format!(
                "unknown order status {other:?}"
            ))),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One order line; quantities are reserved from product stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Ordered product.
    pub product_id: Uuid,
    /// Units ordered.
    pub quantity: i64,
}

/// Row of the `orders` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Order id (the aggregate id).
    pub id: Uuid,
    /// Ordering customer.
    pub customer_id: Uuid,
    /// Current status.
    pub status: OrderStatus,
    /// Order total.
    pub total: f64,
    /// Ordered lines.
    pub lines: Vec<OrderLine>,
    /// Sum of received payments.
    pub amount_paid: f64,
    /// Method of the latest payment.
    pub payment_method: Option<String>,
    /// Transaction id of the latest payment.
    pub transaction_id: Option<String>,
    /// Carrier tracking number.
    pub tracking_number: Option<String>,
    /// Why the order was cancelled.
    pub cancellation_reason: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last change time.
    pub updated_at: DateTime<Utc>,
}

/// Row of the `customers` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    /// Customer id (the aggregate id).
    pub id: Uuid,
    /// Contact email.
    pub email: String,
    /// Full name.
    pub name: String,
    /// Phone number.
    pub phone: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last change time.
    pub updated_at: DateTime<Utc>,
}

/// Approval state of a dealer account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealerStatus {
    /// Application received.
    Pending,
    /// Approved by staff.
    Approved,
}

impl DealerStatus {
    /// Database/wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
        }
    }
}

impl FromStr for DealerStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            other => Err(DomainError::Validation(format!(
                "unknown dealer status {other:?}"
            ))),
        }
    }
}

/// Row of the `dealers` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerRecord {
    /// Dealer id (the aggregate id).
    pub id: Uuid,
    /// Registered business name.
    pub business_name: String,
    /// Contact email.
    pub email: String,
    /// Approval state.
    pub status: DealerStatus,
    /// Who approved the dealer.
    pub approved_by: Option<String>,
    /// When the dealer was approved.
    pub approved_at: Option<DateTime<Utc>>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last change time.
    pub updated_at: DateTime<Utc>,
}

/// Row of the `dealer_prices` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealerPriceRecord {
    /// Dealer the price applies to.
    pub dealer_id: Uuid,
    /// Product the price applies to.
    pub product_id: Uuid,
    /// Negotiated price.
    pub dealer_price: f64,
    /// Last change time.
    pub updated_at: DateTime<Utc>,
}

/// Review state of an agent decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    /// Awaiting review.
    Proposed,
    /// Accepted by a reviewer.
    Approved,
    /// Declined by a reviewer.
    Rejected,
}

impl DecisionStatus {
    /// Database/wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for DecisionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(Self::Proposed),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::Validation(format!(
                "unknown decision status {other:?}"
            ))),
        }
    }
}

/// Row of the `agent_decisions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Decision id (the aggregate id).
    pub id: Uuid,
    /// Proposing agent.
    pub agent: String,
    /// Kind of decision.
    pub decision_type: String,
    /// Agent's confidence in `[0, 1]`.
    pub confidence: Option<f64>,
    /// Review state.
    pub status: DecisionStatus,
    /// Reviewer who approved or rejected.
    pub resolved_by: Option<String>,
    /// Why the decision was rejected.
    pub rejection_reason: Option<String>,
    /// The full proposal payload.
    pub proposal: serde_json::Value,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last change time.
    pub updated_at: DateTime<Utc>,
}

/// Read/write access to the current-state tables within one unit of work.
///
/// `load_*` returns rows as modified so far by the same unit; `save_*`
/// inserts or replaces by primary key.
#[async_trait]
pub trait StateWriter: Send {
    /// Loads a product.
    async fn load_product(&mut self, id: Uuid) -> Result<Option<ProductRecord>, DomainError>;
    /// Loads the product holding `sku`, if any.
    async fn find_product_by_sku(
        &mut self,
        sku: &str,
    ) -> Result<Option<ProductRecord>, DomainError>;
    /// Inserts or replaces a product.
    async fn save_product(&mut self, product: &ProductRecord) -> Result<(), DomainError>;
    /// Appends a price history entry.
    async fn append_price_history(&mut self, entry: &PriceHistoryEntry)
    -> Result<(), DomainError>;

    /// Loads an order.
    async fn load_order(&mut self, id: Uuid) -> Result<Option<OrderRecord>, DomainError>;
    /// Inserts or replaces an order.
    async fn save_order(&mut self, order: &OrderRecord) -> Result<(), DomainError>;

    /// Loads a customer.
    async fn load_customer(&mut self, id: Uuid) -> Result<Option<CustomerRecord>, DomainError>;
    /// Inserts or replaces a customer.
    async fn save_customer(&mut self, customer: &CustomerRecord) -> Result<(), DomainError>;

    /// Loads a dealer.
    async fn load_dealer(&mut self, id: Uuid) -> Result<Option<DealerRecord>, DomainError>;
    /// Inserts or replaces a dealer.
    async fn save_dealer(&mut self, dealer: &DealerRecord) -> Result<(), DomainError>;
    /// Inserts or replaces the price of one product for one dealer.
    async fn save_dealer_price(&mut self, price: &DealerPriceRecord) -> Result<(), DomainError>;

    /// Loads an agent decision.
    async fn load_decision(&mut self, id: Uuid) -> Result<Option<DecisionRecord>, DomainError>;
    /// Inserts or replaces an agent decision.
    async fn save_decision(&mut self, decision: &DecisionRecord) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::limits;

    #[test]
    fn test_money_bounds_follow_numeric_12_2() {
        assert!(limits::is_money(0.0));
        assert!(limits::is_money(limits::MAX_MONEY));
        assert!(!limits::is_money(10_000_000_000.0));
        assert!(!limits::is_money(-0.01));
        assert!(!limits::is_money(f64::NAN));
    }

    #[test]
    fn test_fits_counts_characters_not_bytes() {
        assert!(limits::fits("ÄÖÜ", 3));
        assert!(!limits::fits("ABCD", 3));
    }
}
