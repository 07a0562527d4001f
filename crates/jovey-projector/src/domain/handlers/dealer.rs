//! Dealer account handlers.

use chrono::{DateTime, Utc};
use jovey_core::event::Event;
use jovey_core::state::limits::{ATTRIBUTION_LEN, NAME_LEN};
use jovey_core::state::{DealerPriceRecord, DealerRecord, DealerStatus, StateWriter};
use serde::Deserialize;
use uuid::Uuid;

use super::{at_most, email, money, non_blank, payload, precondition};
use crate::domain::dispatch::EventKind;
use crate::error::ProjectionError;

/// Payload of `dealer.application_submitted`.
#[derive(Debug, Deserialize)]
struct DealerApplicationSubmitted {
    business_name: String,
    email: String,
}

/// Payload of `dealer.approved`. Both fields default to the event's own
/// attribution and timestamp.
#[derive(Debug, Deserialize)]
struct DealerApproved {
    #[serde(default)]
    approved_by: Option<String>,
    #[serde(default)]
    approved_at: Option<DateTime<Utc>>,
}

/// Payload of `dealer.pricing_updated`.
#[derive(Debug, Deserialize)]
struct DealerPricingUpdated {
    product_id: Uuid,
    dealer_price: f64,
}

async fn existing(
    state: &mut dyn StateWriter,
    dealer_id: Uuid,
) -> Result<DealerRecord, ProjectionError> {
    state
        .load_dealer(dealer_id)
        .await?
        .ok_or_else(|| precondition(format!("dealer {dealer_id} does not exist")))
}

pub(super) async fn application_submitted(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::DealerApplicationSubmitted;
    let p: DealerApplicationSubmitted = payload(kind, event)?;
    let business_name = non_blank(kind, "business_name", p.business_name, NAME_LEN)?;
    let email = email(kind, p.email)?;
    if state.load_dealer(event.aggregate_id).await?.is_some() {
        return Err(precondition(format!(
            "dealer {} has already applied",
            event.aggregate_id
        )));
    }

    state
        .save_dealer(&DealerRecord {
            id: event.aggregate_id,
            business_name: business_name.clone(),
            email,
            status: DealerStatus::Pending,
            approved_by: None,
            approved_at: None,
            created_at: event.created_at,
            updated_at: event.created_at,
        })
        .await?;
    Ok(vec![format!("inserted pending dealer {business_name}")])
}

pub(super) async fn approved(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::DealerApproved;
    let p: DealerApproved = payload(kind, event)?;
    let approved_by = at_most(kind, "approved_by", p.approved_by, ATTRIBUTION_LEN)?;
    let mut dealer = existing(state, event.aggregate_id).await?;
    if dealer.status == DealerStatus::Approved {
        return Err(precondition(format!(
            "dealer {} is already approved",
            dealer.id
        )));
    }

    let approved_by = approved_by.unwrap_or_else(|| event.created_by.to_string());
    dealer.status = DealerStatus::Approved;
    dealer.approved_at = Some(p.approved_at.unwrap_or(event.created_at));
    dealer.approved_by = Some(approved_by.clone());
    dealer.updated_at = event.created_at;
    state.save_dealer(&dealer).await?;
    Ok(vec![format!("approved dealer by {approved_by}")])
}

pub(super) async fn pricing_updated(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::DealerPricingUpdated;
    let p: DealerPricingUpdated = payload(kind, event)?;
    let dealer_price = money(kind, "dealer_price", p.dealer_price)?;
    let dealer = existing(state, event.aggregate_id).await?;
    if dealer.status != DealerStatus::Approved {
        return Err(precondition(format!(
            "dealer {} is not approved",
            dealer.id
        )));
    }
    let Some(product) = state.load_product(p.product_id).await? else {
        return Err(precondition(format!(
            "product {} does not exist",
            p.product_id
        )));
    };

    state
        .save_dealer_price(&DealerPriceRecord {
            dealer_id: dealer.id,
            product_id: product.id,
            dealer_price,
            updated_at: event.created_at,
        })
        .await?;
    Ok(vec![format!(
        "dealer price for {} set to {dealer_price:.2}",
        product.sku
    )])
}

#[cfg(test)]
mod tests {
    use jovey_core::event::CreatedBy;
    use jovey_core::projection::ProjectionStore;
    use jovey_test_support::InMemoryEventStore;
    use serde_json::json;

    use super::*;
    use crate::domain::handlers::apply;
    use crate::domain::handlers::fixtures::event;

    #[tokio::test]
    async fn test_approval_defaults_to_event_attribution() {
        // Arrange
        let store = InMemoryEventStore::new();
        let dealer_id = Uuid::new_v4();
        let submitted = event(
            EventKind::DealerApplicationSubmitted,
            dealer_id,
            json!({"business_name": "Acme Water", "email": "sales@acme.example"}),
        );
        let mut approved_evt = event(EventKind::DealerApproved, dealer_id, json!({}));
        approved_evt.created_by = CreatedBy::User("staff-7".into());

        // Act
        let mut unit = store.begin().await.unwrap();
        apply(EventKind::DealerApplicationSubmitted, &submitted, unit.state())
            .await
            .unwrap();
        apply(EventKind::DealerApproved, &approved_evt, unit.state())
            .await
            .unwrap();
        unit.commit().await.unwrap();

        // Assert
        let dealer = store.dealer(dealer_id).unwrap();
        assert_eq!(dealer.status, DealerStatus::Approved);
        assert_eq!(dealer.approved_by.as_deref(), Some("user:staff-7"));
        assert_eq!(dealer.approved_at, Some(approved_evt.created_at));
    }

    #[tokio::test]
    async fn test_pricing_requires_approved_dealer() {
        // Arrange
        let store = InMemoryEventStore::new();
        let dealer_id = Uuid::new_v4();
        let product_id = Uuid::new_v4();
        let mut unit = store.begin().await.unwrap();
        for (kind, aggregate_id, data) in [
            (
                EventKind::ProductCreated,
                product_id,
                json!({"sku": "PUMP-2HP-RES", "name": "Pump", "base_price": 499.0}),
            ),
            (
                EventKind::DealerApplicationSubmitted,
                dealer_id,
                json!({"business_name": "Acme", "email": "a@acme.example"}),
            ),
        ] {
            apply(kind, &event(kind, aggregate_id, data), unit.state())
                .await
                .unwrap();
        }
        let pricing = event(
            EventKind::DealerPricingUpdated,
            dealer_id,
            json!({"product_id": product_id, "dealer_price": 399.0}),
        );

        // Act
        let before_approval = apply(EventKind::DealerPricingUpdated, &pricing, unit.state()).await;
        apply(
            EventKind::DealerApproved,
            &event(EventKind::DealerApproved, dealer_id, json!({})),
            unit.state(),
        )
        .await
        .unwrap();
        apply(EventKind::DealerPricingUpdated, &pricing, unit.state())
            .await
            .unwrap();
        unit.commit().await.unwrap();

        // Assert
        assert!(matches!(before_approval, Err(ProjectionError::Precondition(_))));
        let price = store.dealer_price(dealer_id, product_id).unwrap();
        assert!((price.dealer_price - 399.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_approver_wider_than_its_column_is_rejected() {
        let store = InMemoryEventStore::new();
        let dealer_id = Uuid::new_v4();
        let mut unit = store.begin().await.unwrap();
        let submitted = event(
            EventKind::DealerApplicationSubmitted,
            dealer_id,
            json!({"business_name": "Acme Water", "email": "sales@acme.example"}),
        );
        apply(EventKind::DealerApplicationSubmitted, &submitted, unit.state())
            .await
            .unwrap();
        let approved = event(
            EventKind::DealerApproved,
            dealer_id,
            json!({"approved_by": "s".repeat(ATTRIBUTION_LEN + 1)}),
        );

        let result = apply(EventKind::DealerApproved, &approved, unit.state()).await;

        assert!(matches!(result, Err(ProjectionError::InvalidPayload { .. })));
    }
}
