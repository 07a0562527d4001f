//! Product catalog handlers.

use jovey_core::event::Event;
use jovey_core::state::limits::{NAME_LEN, SKU_LEN};
use jovey_core::state::{PriceHistoryEntry, ProductRecord, StateWriter};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use super::{invalid, money, non_blank, payload, precondition, too_long};
use crate::domain::dispatch::EventKind;
use crate::error::ProjectionError;

const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

fn default_low_stock_threshold() -> i64 {
    DEFAULT_LOW_STOCK_THRESHOLD
}

/// Payload of `product.created`.
#[derive(Debug, Deserialize)]
struct ProductCreated {
    sku: String,
    name: String,
    #[serde(default)]
    category_id: Option<Uuid>,
    base_price: f64,
    #[serde(default)]
    stock_quantity: i64,
    #[serde(default = "default_low_stock_threshold")]
    low_stock_threshold: i64,
}

/// Payload of `product.updated`.
#[derive(Debug, Deserialize)]
struct ProductUpdated {
    changes: ProductChanges,
}

#[derive(Debug, Deserialize)]
struct ProductChanges {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    category_id: Option<Uuid>,
    #[serde(default)]
    low_stock_threshold: Option<i64>,
}

/// Payload of `product.price_changed`.
#[derive(Debug, Deserialize)]
struct ProductPriceChanged {
    #[serde(default)]
    old_price: Option<f64>,
    new_price: f64,
    #[serde(default)]
    reason: Option<String>,
}

/// Payload of `product.stock_updated`.
#[derive(Debug, Deserialize)]
struct ProductStockUpdated {
    new_quantity: i64,
}

/// Uppercases a SKU and checks it has at least three hyphen-separated
/// alphanumeric segments, e.g. `PUMP-2HP-RES`.
fn normalize_sku(kind: EventKind, raw: &str) -> Result<String, ProjectionError> {
    let sku = raw.trim().to_uppercase();
    if sku.len() > SKU_LEN {
        return Err(too_long(kind, "sku", SKU_LEN));
    }
    let segments: Vec<&str> = sku.split('-').collect();
    let well_formed = segments.len() >= 3
        && segments
            .iter()
            .all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()));
    if well_formed {
        Ok(sku)
    } else {
        Err(invalid(
            kind,
            format!("sku {raw:?} must have at least three hyphen-separated segments"),
        ))
    }
}

async fn existing(
    state: &mut dyn StateWriter,
    product_id: Uuid,
) -> Result<ProductRecord, ProjectionError> {
    state
        .load_product(product_id)
        .await?
        .ok_or_else(|| precondition(format!("product {product_id} does not exist")))
}

pub(super) async fn created(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::ProductCreated;
    let p: ProductCreated = payload(kind, event)?;
    let sku = normalize_sku(kind, &p.sku)?;
    let name = non_blank(kind, "name", p.name, NAME_LEN)?;
    let base_price = money(kind, "base_price", p.base_price)?;
    if p.stock_quantity < 0 || p.low_stock_threshold < 0 {
        return Err(invalid(kind, "stock levels must not be negative"));
    }
    if state.load_product(event.aggregate_id).await?.is_some() {
        return Err(precondition(format!(
            "product {} already exists",
            event.aggregate_id
        )));
    }
    if let Some(holder) = state.find_product_by_sku(&sku).await? {
        return Err(precondition(format!(
            "sku {sku} is already used by product {}",
            holder.id
        )));
    }

    state
        .save_product(&ProductRecord {
            id: event.aggregate_id,
            sku: sku.clone(),
            name,
            category_id: p.category_id,
            base_price,
            stock_quantity: p.stock_quantity,
            low_stock_threshold: p.low_stock_threshold,
            is_active: true,
            created_at: event.created_at,
            updated_at: event.created_at,
        })
        .await?;
    Ok(vec![format!("inserted product {sku}")])
}

pub(super) async fn updated(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::ProductUpdated;
    let ProductUpdated { changes } = payload(kind, event)?;
    let mut product = existing(state, event.aggregate_id).await?;

    let mut operations = Vec::new();
    if let Some(name) = changes.name {
        product.name = non_blank(kind, "name", name, NAME_LEN)?;
        operations.push("updated name".to_owned());
    }
    if let Some(category_id) = changes.category_id {
        product.category_id = Some(category_id);
        operations.push("updated category".to_owned());
    }
    if let Some(threshold) = changes.low_stock_threshold {
        if threshold < 0 {
            return Err(invalid(kind, "low_stock_threshold must not be negative"));
        }
        product.low_stock_threshold = threshold;
        operations.push("updated low stock threshold".to_owned());
    }
    if operations.is_empty() {
        return Err(invalid(kind, "changes contain no updatable field"));
    }

    product.updated_at = event.created_at;
    state.save_product(&product).await?;
    Ok(operations)
}

pub(super) async fn price_changed(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::ProductPriceChanged;
    let p: ProductPriceChanged = payload(kind, event)?;
    let new_price = money(kind, "new_price", p.new_price)?;
    let mut product = existing(state, event.aggregate_id).await?;

    let old_price = product.base_price;
    if let Some(claimed) = p.old_price
        && (claimed - old_price).abs() > f64::EPSILON
    {
        warn!(
            product_id = %product.id,
            claimed_old_price = claimed,
            stored_price = old_price,
            "price change was based on a stale price"
        );
    }

    product.base_price = new_price;
    product.updated_at = event.created_at;
    state.save_product(&product).await?;
    state
        .append_price_history(&PriceHistoryEntry {
            product_id: product.id,
            event_id: event.id,
            old_price,
            new_price,
            reason: p.reason,
            changed_at: event.created_at,
        })
        .await?;

    Ok(vec![
        format!("base price {old_price:.2} -> {new_price:.2}"),
        "appended price history".to_owned(),
    ])
}

pub(super) async fn stock_updated(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::ProductStockUpdated;
    let p: ProductStockUpdated = payload(kind, event)?;
    if p.new_quantity < 0 {
        return Err(invalid(kind, "new_quantity must not be negative"));
    }
    let mut product = existing(state, event.aggregate_id).await?;

    product.stock_quantity = p.new_quantity;
    product.updated_at = event.created_at;
    state.save_product(&product).await?;

    let mut operations = vec![format!("stock set to {}", p.new_quantity)];
    if product.stock_quantity <= product.low_stock_threshold {
        warn!(
            product_id = %product.id,
            sku = %product.sku,
            stock_quantity = product.stock_quantity,
            low_stock_threshold = product.low_stock_threshold,
            "product stock is low"
        );
        operations.push(format!(
            "low stock: {} <= {}",
            product.stock_quantity, product.low_stock_threshold
        ));
    }
    Ok(operations)
}

pub(super) async fn deactivated(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let mut product = existing(state, event.aggregate_id).await?;
    product.is_active = false;
    product.updated_at = event.created_at;
    state.save_product(&product).await?;
    Ok(vec!["marked product inactive".to_owned()])
}
