//! Static dispatch table: which event types the Database Manager applies and
//! what each one does to the current-state tables.

use std::str::FromStr;

use jovey_core::event::EventTypeDescriptor;
use serde::Serialize;
use serde_json::json;

use crate::error::ProjectionError;

/// Every event type with a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `product.created`
    ProductCreated,
    /// `product.updated`
    ProductUpdated,
    /// `product.price_changed`
    ProductPriceChanged,
    /// `product.stock_updated`
    ProductStockUpdated,
    /// `product.deactivated`
    ProductDeactivated,
    /// `order.created`
    OrderCreated,
    /// `order.payment_received`
    OrderPaymentReceived,
    /// `order.status_changed`
    OrderStatusChanged,
    /// `order.fulfilled`
    OrderFulfilled,
    /// `order.cancelled`
    OrderCancelled,
    /// `customer.registered`
    CustomerRegistered,
    /// `customer.profile_updated`
    CustomerProfileUpdated,
    /// `dealer.application_submitted`
    DealerApplicationSubmitted,
    /// `dealer.approved`
    DealerApproved,
    /// `dealer.pricing_updated`
    DealerPricingUpdated,
    /// `agent.decision_proposed`
    DecisionProposed,
    /// `agent.decision_approved`
    DecisionApproved,
    /// `agent.decision_rejected`
    DecisionRejected,
}

impl EventKind {
    /// The whole table, grouped by aggregate.
    pub const ALL: [EventKind; 18] = [
        Self::ProductCreated,
        Self::ProductUpdated,
        Self::ProductPriceChanged,
        Self::ProductStockUpdated,
        Self::ProductDeactivated,
        Self::OrderCreated,
        Self::OrderPaymentReceived,
        Self::OrderStatusChanged,
        Self::OrderFulfilled,
        Self::OrderCancelled,
        Self::CustomerRegistered,
        Self::CustomerProfileUpdated,
        Self::DealerApplicationSubmitted,
        Self::DealerApproved,
        Self::DealerPricingUpdated,
        Self::DecisionProposed,
        Self::DecisionApproved,
        Self::DecisionRejected,
    ];

    /// Dotted event type string.
    #[must_use]
    pub fn event_type(self) -> &'static str {
        match self {
            Self::ProductCreated => "product.created",
            Self::ProductUpdated => "product.updated",
            Self::ProductPriceChanged => "product.price_changed",
            Self::ProductStockUpdated => "product.stock_updated",
            Self::ProductDeactivated => "product.deactivated",
            Self::OrderCreated => "order.created",
            Self::OrderPaymentReceived => "order.payment_received",
            Self::OrderStatusChanged => "order.status_changed",
            Self::OrderFulfilled => "order.fulfilled",
            Self::OrderCancelled => "order.cancelled",
            Self::CustomerRegistered => "customer.registered",
            Self::CustomerProfileUpdated => "customer.profile_updated",
            Self::DealerApplicationSubmitted => "dealer.application_submitted",
            Self::DealerApproved => "dealer.approved",
            Self::DealerPricingUpdated => "dealer.pricing_updated",
            Self::DecisionProposed => "agent.decision_proposed",
            Self::DecisionApproved => "agent.decision_approved",
            Self::DecisionRejected => "agent.decision_rejected",
        }
    }

    /// Aggregate type the event must carry.
    #[must_use]
    pub fn aggregate_type(self) -> &'static str {
        match self {
            Self::ProductCreated
            | Self::ProductUpdated
            | Self::ProductPriceChanged
            | Self::ProductStockUpdated
            | Self::ProductDeactivated => "product",
            Self::OrderCreated
            | Self::OrderPaymentReceived
            | Self::OrderStatusChanged
            | Self::OrderFulfilled
            | Self::OrderCancelled => "order",
            Self::CustomerRegistered | Self::CustomerProfileUpdated => "customer",
            Self::DealerApplicationSubmitted | Self::DealerApproved | Self::DealerPricingUpdated => {
                "dealer"
            }
            Self::DecisionProposed | Self::DecisionApproved | Self::DecisionRejected => "decision",
        }
    }

    /// Human-readable summary.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::ProductCreated => "A product was added to the catalog",
            Self::ProductUpdated => "Product fields were changed",
            Self::ProductPriceChanged => "The base price of a product changed",
            Self::ProductStockUpdated => "The stock level of a product changed",
            Self::ProductDeactivated => "A product was withdrawn from sale",
            Self::OrderCreated => "A customer placed an order",
            Self::OrderPaymentReceived => "A payment was received for an order",
            Self::OrderStatusChanged => "An order moved to another status",
            Self::OrderFulfilled => "An order was shipped to the customer",
            Self::OrderCancelled => "An order was cancelled",
            Self::CustomerRegistered => "A new customer registered",
            Self::CustomerProfileUpdated => "A customer changed their profile",
            Self::DealerApplicationSubmitted => "A business applied for a dealer account",
            Self::DealerApproved => "Staff approved a dealer application",
            Self::DealerPricingUpdated => "A dealer-specific product price was set",
            Self::DecisionProposed => "An AI agent proposed a decision",
            Self::DecisionApproved => "Staff approved an agent decision",
            Self::DecisionRejected => "Staff rejected an agent decision",
        }
    }

    /// State-table operations the handler performs.
    #[must_use]
    pub fn operations(self) -> &'static [&'static str] {
        match self {
            Self::ProductCreated => &["insert product row"],
            Self::ProductUpdated => &["apply field changes"],
            Self::ProductPriceChanged => &["update base price", "append price history"],
            Self::ProductStockUpdated => &["set stock quantity", "flag low stock"],
            Self::ProductDeactivated => &["mark product inactive"],
            Self::OrderCreated => &["insert order", "reserve stock for each line"],
            Self::OrderPaymentReceived => &["accumulate amount paid", "mark paid when covered"],
            Self::OrderStatusChanged => &["transition order status"],
            Self::OrderFulfilled => &["mark fulfilled", "store tracking number"],
            Self::OrderCancelled => &["mark cancelled", "release reserved stock"],
            Self::CustomerRegistered => &["insert customer"],
            Self::CustomerProfileUpdated => &["apply profile changes"],
            Self::DealerApplicationSubmitted => &["insert pending dealer"],
            Self::DealerApproved => &["mark dealer approved"],
            Self::DealerPricingUpdated => &["upsert dealer price for product"],
            Self::DecisionProposed => &["insert proposed decision"],
            Self::DecisionApproved => &["mark decision approved"],
            Self::DecisionRejected => &["mark decision rejected"],
        }
    }

    /// Example payload, as served by the event type catalog.
    #[must_use]
    pub fn example(self) -> serde_json::Value {
        let some_id = "00000000-0000-0000-0000-000000000000";
        match self {
            Self::ProductCreated => json!({
                "sku": "PUMP-2HP-RES-SS", "name": "Residential pump",
                "base_price": 499.0, "stock_quantity": 20
            }),
            Self::ProductUpdated => json!({"changes": {"name": "Residential pump v2"}}),
            Self::ProductPriceChanged => {
                json!({"old_price": 499.0, "new_price": 459.0, "reason": "seasonal promotion"})
            }
            Self::ProductStockUpdated => {
                json!({"old_quantity": 20, "new_quantity": 8, "reason": "cycle count"})
            }
            Self::ProductDeactivated => json!({"reason": "discontinued"}),
            Self::OrderCreated => json!({
                "customer_id": some_id, "total": 918.0,
                "items": [{"product_id": some_id, "quantity": 2}]
            }),
            Self::OrderPaymentReceived => {
                json!({"amount": 918.0, "payment_method": "card", "transaction_id": "txn_123"})
            }
            Self::OrderStatusChanged => json!({
                "old_status": "paid", "new_status": "processing", "changed_by": "user:staff-1"
            }),
            Self::OrderFulfilled => json!({"tracking_number": "1Z999AA10123456784"}),
            Self::OrderCancelled => json!({"reason": "customer request", "refund_amount": 918.0}),
            Self::CustomerRegistered => json!({"email": "jane@example.com", "name": "Jane Doe"}),
            Self::CustomerProfileUpdated => json!({"changes": {"phone": "+1 555 0100"}}),
            Self::DealerApplicationSubmitted => {
                json!({"business_name": "Acme Water", "email": "sales@acme.example"})
            }
            Self::DealerApproved | Self::DecisionApproved => {
                json!({"approved_by": "user:staff-1"})
            }
            Self::DealerPricingUpdated => json!({"product_id": some_id, "dealer_price": 399.0}),
            Self::DecisionProposed => json!({
                "agent": "pricing", "decision_type": "price_adjustment", "confidence": 0.82
            }),
            Self::DecisionRejected => {
                json!({"rejected_by": "user:staff-1", "reason": "margin too low"})
            }
        }
    }

    /// Catalog entry for this event type.
    #[must_use]
    pub fn descriptor(self) -> EventTypeDescriptor {
        EventTypeDescriptor {
            event_type: self.event_type().to_owned(),
            aggregate_type: self.aggregate_type().to_owned(),
            description: Some(self.description().to_owned()),
            example: Some(self.example()),
        }
    }

    /// Introspection entry for this event type.
    #[must_use]
    pub fn mapping(self) -> EventMapping {
        EventMapping {
            event_type: self.event_type(),
            aggregate_type: self.aggregate_type(),
            description: self.description(),
            operations: self.operations().to_vec(),
        }
    }
}

impl FromStr for EventKind {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.event_type() == s)
            .ok_or_else(|| ProjectionError::HandlerNotFound(s.to_owned()))
    }
}

/// What one dispatch entry does, as reported by the mappings endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventMapping {
    /// Dotted event type.
    pub event_type: &'static str,
    /// Aggregate type.
    pub aggregate_type: &'static str,
    /// Human-readable summary.
    pub description: &'static str,
    /// State-table operations performed.
    pub operations: Vec<&'static str>,
}

/// Catalog entries for every registered event type.
#[must_use]
pub fn catalog() -> Vec<EventTypeDescriptor> {
    EventKind::ALL.into_iter().map(EventKind::descriptor).collect()
}
