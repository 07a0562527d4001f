//! Customer handlers.

use jovey_core::event::Event;
use jovey_core::state::limits::{NAME_LEN, PHONE_LEN};
use jovey_core::state::{CustomerRecord, StateWriter};
use serde::Deserialize;

use super::{at_most, email, invalid, non_blank, payload, precondition};
use crate::domain::dispatch::EventKind;
use crate::error::ProjectionError;

/// Payload of `customer.registered`.
#[derive(Debug, Deserialize)]
struct CustomerRegistered {
    email: String,
    name: String,
    #[serde(default)]
    phone: Option<String>,
}

/// Payload of `customer.profile_updated`.
#[derive(Debug, Deserialize)]
struct CustomerProfileUpdated {
    changes: ProfileChanges,
}

#[derive(Debug, Deserialize)]
struct ProfileChanges {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

pub(super) async fn registered(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::CustomerRegistered;
    let p: CustomerRegistered = payload(kind, event)?;
    let email = email(kind, p.email)?;
    let name = non_blank(kind, "name", p.name, NAME_LEN)?;
    let phone = at_most(kind, "phone", p.phone, PHONE_LEN)?;
    if state.load_customer(event.aggregate_id).await?.is_some() {
        return Err(precondition(format!(
            "customer {} is already registered",
            event.aggregate_id
        )));
    }

    state
        .save_customer(&CustomerRecord {
            id: event.aggregate_id,
            email: email.clone(),
            name,
            phone,
            created_at: event.created_at,
            updated_at: event.created_at,
        })
        .await?;
    Ok(vec![format!("inserted customer {email}")])
}

pub(super) async fn profile_updated(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::CustomerProfileUpdated;
    let CustomerProfileUpdated { changes } = payload(kind, event)?;
    let Some(mut customer) = state.load_customer(event.aggregate_id).await? else {
        return Err(precondition(format!(
            "customer {} does not exist",
            event.aggregate_id
        )));
    };

    let mut operations = Vec::new();
    if let Some(value) = changes.email {
        customer.email = email(kind, value)?;
        operations.push("updated email".to_owned());
    }
    if let Some(name) = changes.name {
        customer.name = non_blank(kind, "name", name, NAME_LEN)?;
        operations.push("updated name".to_owned());
    }
    if let Some(phone) = changes.phone {
        customer.phone = at_most(kind, "phone", Some(phone), PHONE_LEN)?;
        operations.push("updated phone".to_owned());
    }
    if operations.is_empty() {
        return Err(invalid(kind, "changes contain no updatable field"));
    }

    customer.updated_at = event.created_at;
    state.save_customer(&customer).await?;
    Ok(operations)
}

#[cfg(test)]
mod tests {
    use jovey_core::projection::ProjectionStore;
    use jovey_test_support::InMemoryEventStore;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::domain::handlers::apply;
    use crate::domain::handlers::fixtures::event;

    #[tokio::test]
    async fn test_register_then_update_profile() {
        // Arrange
        let store = InMemoryEventStore::new();
        let customer_id = Uuid::new_v4();
        let registered = event(
            EventKind::CustomerRegistered,
            customer_id,
            json!({"email": "Jane@Example.com", "name": "Jane Doe"}),
        );
        let updated = event(
            EventKind::CustomerProfileUpdated,
            customer_id,
            json!({"changes": {"phone": "+1 555 0100"}}),
        );

        // Act
        let mut unit = store.begin().await.unwrap();
        apply(EventKind::CustomerRegistered, &registered, unit.state())
            .await
            .unwrap();
        let operations = apply(EventKind::CustomerProfileUpdated, &updated, unit.state())
            .await
            .unwrap();
        unit.commit().await.unwrap();

        // Assert
        assert_eq!(operations, vec!["updated phone".to_owned()]);
        let customer = store.customer(customer_id).unwrap();
        assert_eq!(customer.email, "jane@example.com");
        assert_eq!(customer.phone.as_deref(), Some("+1 555 0100"));
    }

    #[tokio::test]
    async fn test_duplicate_registration_fails_precondition() {
        // Arrange
        let store = InMemoryEventStore::new();
        let customer_id = Uuid::new_v4();
        let registered = event(
            EventKind::CustomerRegistered,
            customer_id,
            json!({"email": "jane@example.com", "name": "Jane"}),
        );
        let mut unit = store.begin().await.unwrap();
        apply(EventKind::CustomerRegistered, &registered, unit.state())
            .await
            .unwrap();

        // Act
        let again = apply(EventKind::CustomerRegistered, &registered, unit.state()).await;

        // Assert
        assert!(matches!(again, Err(ProjectionError::Precondition(_))));
    }

    #[tokio::test]
    async fn test_invalid_email_is_rejected() {
        let store = InMemoryEventStore::new();
        let mut unit = store.begin().await.unwrap();
        let evt = event(
            EventKind::CustomerRegistered,
            Uuid::new_v4(),
            json!({"email": "not-an-email", "name": "Jane"}),
        );

        let result = apply(EventKind::CustomerRegistered, &evt, unit.state()).await;

        assert!(matches!(result, Err(ProjectionError::InvalidPayload { .. })));
    }

    #[tokio::test]
    async fn test_overlong_phone_is_rejected_on_update() {
        // Arrange
        let store = InMemoryEventStore::new();
        let customer_id = Uuid::new_v4();
        let mut unit = store.begin().await.unwrap();
        let registered = event(
            EventKind::CustomerRegistered,
            customer_id,
            json!({"email": "jane@example.com", "name": "Jane Doe", "phone": "+1 555 0100"}),
        );
        apply(EventKind::CustomerRegistered, &registered, unit.state())
            .await
            .unwrap();
        let updated = event(
            EventKind::CustomerProfileUpdated,
            customer_id,
            json!({"changes": {"phone": "5".repeat(PHONE_LEN + 1)}}),
        );

        // Act
        let result = apply(EventKind::CustomerProfileUpdated, &updated, unit.state()).await;

        // Assert
        assert!(matches!(result, Err(ProjectionError::InvalidPayload { .. })));
    }
}
