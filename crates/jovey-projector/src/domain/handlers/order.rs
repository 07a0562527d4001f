//! Order lifecycle handlers. Orders reserve product stock on creation and
//! release it on cancellation.

use jovey_core::event::Event;
use jovey_core::state::limits::{self, PAYMENT_METHOD_LEN, REFERENCE_LEN};
use jovey_core::state::{OrderLine, OrderRecord, OrderStatus, StateWriter};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use super::{at_most, invalid, money, payload, precondition};
use crate::domain::dispatch::EventKind;
use crate::error::ProjectionError;

/// Payments within a cent of the total count as full payment.
const PAYMENT_TOLERANCE: f64 = 0.005;

/// Payload of `order.created`.
#[derive(Debug, Deserialize)]
struct OrderCreated {
    customer_id: Uuid,
    total: f64,
    items: Vec<OrderLine>,
}

/// Payload of `order.payment_received`.
#[derive(Debug, Deserialize)]
struct OrderPaymentReceived {
    amount: f64,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    transaction_id: Option<String>,
}

/// Payload of `order.status_changed`.
#[derive(Debug, Deserialize)]
struct OrderStatusChanged {
    #[serde(default)]
    old_status: Option<OrderStatus>,
    new_status: OrderStatus,
}

/// Payload of `order.fulfilled`.
#[derive(Debug, Deserialize)]
struct OrderFulfilled {
    #[serde(default)]
    tracking_number: Option<String>,
}

/// Payload of `order.cancelled`.
#[derive(Debug, Deserialize)]
struct OrderCancelled {
    #[serde(default)]
    reason: Option<String>,
}

async fn existing(
    state: &mut dyn StateWriter,
    order_id: Uuid,
) -> Result<OrderRecord, ProjectionError> {
    state
        .load_order(order_id)
        .await?
        .ok_or_else(|| precondition(format!("order {order_id} does not exist")))
}

fn ensure_open(order: &OrderRecord, action: &str) -> Result<(), ProjectionError> {
    if order.status.is_terminal() {
        return Err(precondition(format!(
            "cannot {action} order {}: it is already {}",
            order.id, order.status
        )));
    }
    Ok(())
}

pub(super) async fn created(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::OrderCreated;
    let p: OrderCreated = payload(kind, event)?;
    let total = money(kind, "total", p.total)?;
    if p.items.is_empty() {
        return Err(invalid(kind, "an order needs at least one item"));
    }
    if let Some(line) = p.items.iter().find(|line| line.quantity <= 0) {
        return Err(invalid(
            kind,
            format!("quantity for product {} must be positive", line.product_id),
        ));
    }
    if state.load_order(event.aggregate_id).await?.is_some() {
        return Err(precondition(format!(
            "order {} already exists",
            event.aggregate_id
        )));
    }

    let mut operations = Vec::with_capacity(p.items.len() + 1);
    for line in &p.items {
        let Some(mut product) = state.load_product(line.product_id).await? else {
            return Err(precondition(format!(
                "product {} does not exist",
                line.product_id
            )));
        };
        if !product.is_active {
            return Err(precondition(format!(
                "product {} is not active",
                product.sku
            )));
        }
        if product.stock_quantity < line.quantity {
            return Err(precondition(format!(
                "insufficient stock for {}: requested {}, available {}",
                product.sku, line.quantity, product.stock_quantity
            )));
        }
        product.stock_quantity -= line.quantity;
        product.updated_at = event.created_at;
        state.save_product(&product).await?;
        operations.push(format!("reserved {} x {}", line.quantity, product.sku));
    }

    state
        .save_order(&OrderRecord {
            id: event.aggregate_id,
            customer_id: p.customer_id,
            status: OrderStatus::Pending,
            total,
            lines: p.items,
            amount_paid: 0.0,
            payment_method: None,
            transaction_id: None,
            tracking_number: None,
            cancellation_reason: None,
            created_at: event.created_at,
            updated_at: event.created_at,
        })
        .await?;
    operations.insert(0, format!("inserted order with total {total:.2}"));
    Ok(operations)
}

pub(super) async fn payment_received(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::OrderPaymentReceived;
    let p: OrderPaymentReceived = payload(kind, event)?;
    let amount = money(kind, "amount", p.amount)?;
    if amount <= 0.0 {
        return Err(invalid(kind, "amount must be positive"));
    }
    let payment_method = at_most(kind, "payment_method", p.payment_method, PAYMENT_METHOD_LEN)?;
    let transaction_id = at_most(kind, "transaction_id", p.transaction_id, REFERENCE_LEN)?;
    let mut order = existing(state, event.aggregate_id).await?;
    if order.status == OrderStatus::Cancelled {
        return Err(precondition(format!(
            "cannot take payment for cancelled order {}",
            order.id
        )));
    }
    let amount_paid = order.amount_paid + amount;
    if !limits::is_money(amount_paid) {
        return Err(precondition(format!(
            "payment would bring order {} to {amount_paid:.2}, beyond the storable maximum",
            order.id
        )));
    }

    order.amount_paid = amount_paid;
    order.payment_method = payment_method.or(order.payment_method);
    order.transaction_id = transaction_id.or(order.transaction_id);
    order.updated_at = event.created_at;

    let mut operations = vec![format!("amount paid now {:.2}", order.amount_paid)];
    if order.status == OrderStatus::Pending && order.amount_paid + PAYMENT_TOLERANCE >= order.total
    {
        order.status = OrderStatus::Paid;
        operations.push("marked order paid".to_owned());
    }
    state.save_order(&order).await?;
    Ok(operations)
}

pub(super) async fn status_changed(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::OrderStatusChanged;
    let p: OrderStatusChanged = payload(kind, event)?;
    if p.new_status == OrderStatus::Cancelled {
        return Err(invalid(kind, "orders are cancelled through order.cancelled"));
    }
    let mut order = existing(state, event.aggregate_id).await?;
    ensure_open(&order, "change the status of")?;
    if let Some(expected) = p.old_status
        && expected != order.status
    {
        warn!(
            order_id = %order.id,
            expected = %expected,
            actual = %order.status,
            "status change was based on a stale status"
        );
    }

    let previous = order.status;
    order.status = p.new_status;
    order.updated_at = event.created_at;
    state.save_order(&order).await?;
    Ok(vec![format!("status {previous} -> {}", p.new_status)])
}

pub(super) async fn fulfilled(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::OrderFulfilled;
    let p: OrderFulfilled = payload(kind, event)?;
    let tracking_number = at_most(kind, "tracking_number", p.tracking_number, REFERENCE_LEN)?;
    let mut order = existing(state, event.aggregate_id).await?;
    ensure_open(&order, "fulfil")?;

    order.status = OrderStatus::Fulfilled;
    order.updated_at = event.created_at;
    let mut operations = vec!["marked order fulfilled".to_owned()];
    if let Some(tracking_number) = tracking_number {
        operations.push(format!("tracking number {tracking_number}"));
        order.tracking_number = Some(tracking_number);
    }
    state.save_order(&order).await?;
    Ok(operations)
}

pub(super) async fn cancelled(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let p: OrderCancelled = payload(EventKind::OrderCancelled, event)?;
    let mut order = existing(state, event.aggregate_id).await?;
    ensure_open(&order, "cancel")?;

    let mut operations = vec!["marked order cancelled".to_owned()];
    for line in &order.lines {
        match state.load_product(line.product_id).await? {
            Some(mut product) => {
                product.stock_quantity += line.quantity;
                product.updated_at = event.created_at;
                state.save_product(&product).await?;
                operations.push(format!("released {} x {}", line.quantity, product.sku));
            }
            None => warn!(
                order_id = %order.id,
                product_id = %line.product_id,
                "reserved product no longer exists; stock not released"
            ),
        }
    }

    order.status = OrderStatus::Cancelled;
    order.cancellation_reason = p.reason;
    order.updated_at = event.created_at;
    state.save_order(&order).await?;
    Ok(operations)
}
