//! Staged unit of work over the in-memory tables.
//!
//! Writes are checked against the constraints of the `PostgreSQL` tables: the
//! unique SKU, references to products and dealers, column widths and the
//! `NUMERIC(12, 2)` range.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jovey_core::error::DomainError;
use jovey_core::projection::{Claim, ProjectionUnit};
use jovey_core::state::limits::{
    self, ATTRIBUTION_LEN, EMAIL_LEN, NAME_LEN, PAYMENT_METHOD_LEN, PHONE_LEN, REFERENCE_LEN,
    SKU_LEN,
};
use jovey_core::state::{
    CustomerRecord, DealerPriceRecord, DealerRecord, DecisionRecord, OrderRecord,
    PriceHistoryEntry, ProductRecord, StateWriter,
};
use uuid::Uuid;

use crate::memory::{Inner, lock};

/// In-memory copy of the current-state tables.
#[derive(Debug, Clone, Default)]
pub struct StateTables {
    /// `products` by id.
    pub products: HashMap<Uuid, ProductRecord>,
    /// `product_price_history`, in insertion order.
    pub price_history: Vec<PriceHistoryEntry>,
    /// `orders` by id.
    pub orders: HashMap<Uuid, OrderRecord>,
    /// `customers` by id.
    pub customers: HashMap<Uuid, CustomerRecord>,
    /// `dealers` by id.
    pub dealers: HashMap<Uuid, DealerRecord>,
    /// `dealer_prices` by `(dealer_id, product_id)`.
    pub dealer_prices: HashMap<(Uuid, Uuid), DealerPriceRecord>,
    /// `agent_decisions` by id.
    pub decisions: HashMap<Uuid, DecisionRecord>,
}

impl StateTables {
    fn merge(&mut self, staged: StateTables) {
        self.products.extend(staged.products);
        self.price_history.extend(staged.price_history);
        self.orders.extend(staged.orders);
        self.customers.extend(staged.customers);
        self.dealers.extend(staged.dealers);
        self.dealer_prices.extend(staged.dealer_prices);
        self.decisions.extend(staged.decisions);
    }
}

/// Unit of work that buffers writes until `commit`.
///
/// Claimed events stay in the store's in-flight set until the unit commits,
/// rolls back or is dropped, which stands in for the row lock.
pub(crate) struct InMemoryUnit {
    shared: Arc<Mutex<Inner>>,
    staged: StateTables,
    claimed: Vec<Uuid>,
    processed: Vec<(Uuid, DateTime<Utc>)>,
    latency: Option<Duration>,
    finished: bool,
}

impl InMemoryUnit {
    pub(crate) fn new(shared: Arc<Mutex<Inner>>, latency: Option<Duration>) -> Self {
        Self {
            shared,
            staged: StateTables::default(),
            claimed: Vec::new(),
            processed: Vec::new(),
            latency,
            finished: false,
        }
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.finished {
            return Err(DomainError::Infrastructure(
                "unit of work already finished".into(),
            ));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.finished = true;
        let mut inner = lock(&self.shared);
        for id in self.claimed.drain(..) {
            inner.in_flight.remove(&id);
        }
    }
}

fn violation(message: impl Into<String>) -> DomainError {
    DomainError::ConstraintViolation(message.into())
}

fn check_width(column: &str, value: Option<&str>, max: usize) -> Result<(), DomainError> {
    match value {
        Some(v) if !limits::fits(v, max) => Err(violation(format!(
            "value too long for {column}: at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

fn check_numeric(column: &str, value: f64) -> Result<(), DomainError> {
    if value.is_finite() && value.abs() <= limits::MAX_MONEY {
        Ok(())
    } else {
        Err(violation(format!("numeric field overflow in {column}")))
    }
}

fn check_non_negative(column: &str, value: f64) -> Result<(), DomainError> {
    check_numeric(column, value)?;
    if value < 0.0 {
        return Err(violation(format!("check constraint on {column} >= 0")));
    }
    Ok(())
}

impl InMemoryUnit {
    fn product_exists(&self, id: Uuid) -> bool {
        self.staged.products.contains_key(&id)
            || lock(&self.shared).state.products.contains_key(&id)
    }

    fn dealer_exists(&self, id: Uuid) -> bool {
        self.staged.dealers.contains_key(&id)
            || lock(&self.shared).state.dealers.contains_key(&id)
    }

    /// Staged rows shadow committed rows with the same id.
    fn product_with_sku(&self, sku: &str) -> Option<ProductRecord> {
        if let Some(product) = self.staged.products.values().find(|p| p.sku == sku) {
            return Some(product.clone());
        }
        lock(&self.shared)
            .state
            .products
            .values()
            .find(|p| p.sku == sku && !self.staged.products.contains_key(&p.id))
            .cloned()
    }
}

impl Drop for InMemoryUnit {
    fn drop(&mut self) {
        if !self.finished {
            self.release();
        }
    }
}

#[async_trait]
impl ProjectionUnit for InMemoryUnit {
    async fn claim(&mut self, event_id: Uuid) -> Result<Claim, DomainError> {
        self.ensure_open()?;
        let mut inner = lock(&self.shared);
        inner.check_available()?;
        let Some(event) = inner.events.iter().find(|e| e.id == event_id).cloned() else {
            return Ok(Claim::NotFound);
        };
        if event.is_processed {
            return Ok(Claim::AlreadyProcessed);
        }
        if !inner.in_flight.insert(event_id) {
            return Ok(Claim::Locked);
        }
        drop(inner);
        self.claimed.push(event_id);
        Ok(Claim::Claimed(Box::new(event)))
    }

    fn state(&mut self) -> &mut dyn StateWriter {
        self
    }

    async fn mark_processed(
        &mut self,
        event_id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.processed.push((event_id, processed_at));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        self.ensure_open()?;
        {
            let mut inner = lock(&self.shared);
            inner.check_commit_allowed()?;
            inner.state.merge(std::mem::take(&mut self.staged));
            for (event_id, processed_at) in self.processed.drain(..) {
                if let Some(event) = inner.events.iter_mut().find(|e| e.id == event_id) {
                    event.is_processed = true;
                    event.processed_at = Some(processed_at);
                    event.processing_error = None;
                    event.processing_attempts += 1;
                }
            }
        }
        self.release();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        self.staged = StateTables::default();
        self.processed.clear();
        if !self.finished {
            self.release();
        }
        Ok(())
    }
}

#[async_trait]
impl StateWriter for InMemoryUnit {
    async fn load_product(&mut self, id: Uuid) -> Result<Option<ProductRecord>, DomainError> {
        self.pause().await;
        if let Some(product) = self.staged.products.get(&id) {
            return Ok(Some(product.clone()));
        }
        Ok(lock(&self.shared).state.products.get(&id).cloned())
    }

    async fn find_product_by_sku(
        &mut self,
        sku: &str,
    ) -> Result<Option<ProductRecord>, DomainError> {
        self.pause().await;
        Ok(self.product_with_sku(sku))
    }

    async fn save_product(&mut self, product: &ProductRecord) -> Result<(), DomainError> {
        self.pause().await;
        check_width("products.sku", Some(product.sku.as_str()), SKU_LEN)?;
        check_width("products.name", Some(product.name.as_str()), NAME_LEN)?;
        check_non_negative("products.base_price", product.base_price)?;
        if product.stock_quantity < 0 {
            return Err(violation("check constraint on products.stock_quantity >= 0"));
        }
        if let Some(holder) = self.product_with_sku(&product.sku)
            && holder.id != product.id
        {
            return Err(violation(format!(
                "duplicate key value violates unique constraint on products.sku ({})",
                product.sku
            )));
        }
        self.staged.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn append_price_history(
        &mut self,
        entry: &PriceHistoryEntry,
    ) -> Result<(), DomainError> {
        self.pause().await;
        check_numeric("product_price_history.old_price", entry.old_price)?;
        check_numeric("product_price_history.new_price", entry.new_price)?;
        if !self.product_exists(entry.product_id) {
            return Err(violation(format!(
                "product_price_history references missing product {}",
                entry.product_id
            )));
        }
        self.staged.price_history.push(entry.clone());
        Ok(())
    }

    async fn load_order(&mut self, id: Uuid) -> Result<Option<OrderRecord>, DomainError> {
        self.pause().await;
        if let Some(order) = self.staged.orders.get(&id) {
            return Ok(Some(order.clone()));
        }
        Ok(lock(&self.shared).state.orders.get(&id).cloned())
    }

    async fn save_order(&mut self, order: &OrderRecord) -> Result<(), DomainError> {
        self.pause().await;
        check_numeric("orders.total", order.total)?;
        check_numeric("orders.amount_paid", order.amount_paid)?;
        check_width("orders.payment_method", order.payment_method.as_deref(), PAYMENT_METHOD_LEN)?;
        check_width("orders.transaction_id", order.transaction_id.as_deref(), REFERENCE_LEN)?;
        check_width("orders.tracking_number", order.tracking_number.as_deref(), REFERENCE_LEN)?;
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn load_customer(&mut self, id: Uuid) -> Result<Option<CustomerRecord>, DomainError> {
        self.pause().await;
        if let Some(customer) = self.staged.customers.get(&id) {
            return Ok(Some(customer.clone()));
        }
        Ok(lock(&self.shared).state.customers.get(&id).cloned())
    }

    async fn save_customer(&mut self, customer: &CustomerRecord) -> Result<(), DomainError> {
        self.pause().await;
        check_width("customers.email", Some(customer.email.as_str()), EMAIL_LEN)?;
        check_width("customers.name", Some(customer.name.as_str()), NAME_LEN)?;
        check_width("customers.phone", customer.phone.as_deref(), PHONE_LEN)?;
        self.staged.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn load_dealer(&mut self, id: Uuid) -> Result<Option<DealerRecord>, DomainError> {
        self.pause().await;
        if let Some(dealer) = self.staged.dealers.get(&id) {
            return Ok(Some(dealer.clone()));
        }
        Ok(lock(&self.shared).state.dealers.get(&id).cloned())
    }

    async fn save_dealer(&mut self, dealer: &DealerRecord) -> Result<(), DomainError> {
        self.pause().await;
        check_width("dealers.business_name", Some(dealer.business_name.as_str()), NAME_LEN)?;
        check_width("dealers.email", Some(dealer.email.as_str()), EMAIL_LEN)?;
        check_width("dealers.approved_by", dealer.approved_by.as_deref(), ATTRIBUTION_LEN)?;
        self.staged.dealers.insert(dealer.id, dealer.clone());
        Ok(())
    }

    async fn save_dealer_price(&mut self, price: &DealerPriceRecord) -> Result<(), DomainError> {
        self.pause().await;
        check_non_negative("dealer_prices.dealer_price", price.dealer_price)?;
        if !self.dealer_exists(price.dealer_id) {
            return Err(violation(format!(
                "dealer_prices references missing dealer {}",
                price.dealer_id
            )));
        }
        self.staged
            .dealer_prices
            .insert((price.dealer_id, price.product_id), price.clone());
        Ok(())
    }

    async fn load_decision(&mut self, id: Uuid) -> Result<Option<DecisionRecord>, DomainError> {
        self.pause().await;
        if let Some(decision) = self.staged.decisions.get(&id) {
            return Ok(Some(decision.clone()));
        }
        Ok(lock(&self.shared).state.decisions.get(&id).cloned())
    }

    async fn save_decision(&mut self, decision: &DecisionRecord) -> Result<(), DomainError> {
        self.pause().await;
        check_width("agent_decisions.agent", Some(decision.agent.as_str()), ATTRIBUTION_LEN)?;
        check_width("agent_decisions.decision_type", Some(decision.decision_type.as_str()), ATTRIBUTION_LEN)?;
        check_width("agent_decisions.resolved_by", decision.resolved_by.as_deref(), ATTRIBUTION_LEN)?;
        self.staged.decisions.insert(decision.id, decision.clone());
        Ok(())
    }
}
