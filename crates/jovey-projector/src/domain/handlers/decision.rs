//! Agent decision handlers: proposals from AI agents and their review.

use jovey_core::event::Event;
use jovey_core::state::limits::ATTRIBUTION_LEN;
use jovey_core::state::{DecisionRecord, DecisionStatus, StateWriter};
use serde::Deserialize;
use uuid::Uuid;

use super::{at_most, invalid, non_blank, payload, precondition};
use crate::domain::dispatch::EventKind;
use crate::error::ProjectionError;

/// Payload of `agent.decision_proposed`. The whole payload is kept as the
/// proposal; only these fields are interpreted.
#[derive(Debug, Deserialize)]
struct DecisionProposed {
    agent: String,
    decision_type: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Payload of `agent.decision_approved`.
#[derive(Debug, Deserialize)]
struct DecisionApproved {
    #[serde(default)]
    approved_by: Option<String>,
}

/// Payload of `agent.decision_rejected`.
#[derive(Debug, Deserialize)]
struct DecisionRejected {
    #[serde(default)]
    rejected_by: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

async fn proposed_decision(
    state: &mut dyn StateWriter,
    decision_id: Uuid,
) -> Result<DecisionRecord, ProjectionError> {
    let Some(decision) = state.load_decision(decision_id).await? else {
        return Err(precondition(format!(
            "decision {decision_id} does not exist"
        )));
    };
    if decision.status != DecisionStatus::Proposed {
        return Err(precondition(format!(
            "decision {decision_id} was already {}",
            decision.status.as_str()
        )));
    }
    Ok(decision)
}

pub(super) async fn proposed(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::DecisionProposed;
    let p: DecisionProposed = payload(kind, event)?;
    let agent = non_blank(kind, "agent", p.agent, ATTRIBUTION_LEN)?;
    let decision_type = non_blank(kind, "decision_type", p.decision_type, ATTRIBUTION_LEN)?;
    if let Some(confidence) = p.confidence
        && !(0.0..=1.0).contains(&confidence)
    {
        return Err(invalid(
            kind,
            format!("confidence must be within [0, 1], got {confidence}"),
        ));
    }
    if state.load_decision(event.aggregate_id).await?.is_some() {
        return Err(precondition(format!(
            "decision {} already exists",
            event.aggregate_id
        )));
    }

    let operation = format!("inserted {decision_type} proposal from {agent}");
    state
        .save_decision(&DecisionRecord {
            id: event.aggregate_id,
            agent,
            decision_type,
            confidence: p.confidence,
            status: DecisionStatus::Proposed,
            resolved_by: None,
            rejection_reason: None,
            proposal: event.data.clone(),
            created_at: event.created_at,
            updated_at: event.created_at,
        })
        .await?;
    Ok(vec![operation])
}

pub(super) async fn approved(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::DecisionApproved;
    let p: DecisionApproved = payload(kind, event)?;
    let approved_by = at_most(kind, "approved_by", p.approved_by, ATTRIBUTION_LEN)?;
    let mut decision = proposed_decision(state, event.aggregate_id).await?;

    let reviewer = approved_by.unwrap_or_else(|| event.created_by.to_string());
    decision.status = DecisionStatus::Approved;
    decision.resolved_by = Some(reviewer.clone());
    decision.updated_at = event.created_at;
    state.save_decision(&decision).await?;
    Ok(vec![format!("approved by {reviewer}")])
}

pub(super) async fn rejected(
    event: &Event,
    state: &mut dyn StateWriter,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::DecisionRejected;
    let p: DecisionRejected = payload(kind, event)?;
    let rejected_by = at_most(kind, "rejected_by", p.rejected_by, ATTRIBUTION_LEN)?;
    let mut decision = proposed_decision(state, event.aggregate_id).await?;

    let reviewer = rejected_by.unwrap_or_else(|| event.created_by.to_string());
    decision.status = DecisionStatus::Rejected;
    decision.resolved_by = Some(reviewer.clone());
    decision.rejection_reason = p.reason;
    decision.updated_at = event.created_at;
    state.save_decision(&decision).await?;
    Ok(vec![format!("rejected by {reviewer}")])
}

#[cfg(test)]
mod tests {
    use jovey_core::projection::ProjectionStore;
    use jovey_test_support::InMemoryEventStore;
    use serde_json::json;

    use super::*;
    use crate::domain::handlers::apply;
    use crate::domain::handlers::fixtures::event;

    fn proposal(decision_id: Uuid) -> Event {
        event(
            EventKind::DecisionProposed,
            decision_id,
            json!({
                "agent": "pricing",
                "decision_type": "price_adjustment",
                "confidence": 0.82,
                "product_id": Uuid::nil(),
                "suggested_price": 459.0
            }),
        )
    }

    #[tokio::test]
    async fn test_proposal_keeps_full_payload() {
        // Arrange
        let store = InMemoryEventStore::new();
        let decision_id = Uuid::new_v4();
        let evt = proposal(decision_id);

        // Act
        let mut unit = store.begin().await.unwrap();
        apply(EventKind::DecisionProposed, &evt, unit.state())
            .await
            .unwrap();
        unit.commit().await.unwrap();

        // Assert
        let decision = store.decision(decision_id).unwrap();
        assert_eq!(decision.status, DecisionStatus::Proposed);
        assert_eq!(decision.proposal, evt.data);
        assert_eq!(decision.confidence, Some(0.82));
    }

    #[tokio::test]
    async fn test_confidence_outside_unit_interval_is_rejected() {
        let store = InMemoryEventStore::new();
        let mut unit = store.begin().await.unwrap();
        let evt = event(
            EventKind::DecisionProposed,
            Uuid::new_v4(),
            json!({"agent": "pricing", "decision_type": "x", "confidence": 1.5}),
        );

        let result = apply(EventKind::DecisionProposed, &evt, unit.state()).await;

        assert!(matches!(result, Err(ProjectionError::InvalidPayload { .. })));
    }

    #[tokio::test]
    async fn test_rejection_is_final() {
        // Arrange
        let store = InMemoryEventStore::new();
        let decision_id = Uuid::new_v4();
        let mut unit = store.begin().await.unwrap();
        apply(EventKind::DecisionProposed, &proposal(decision_id), unit.state())
            .await
            .unwrap();
        let reject = event(
            EventKind::DecisionRejected,
            decision_id,
            json!({"rejected_by": "user:staff-2", "reason": "margin too low"}),
        );
        let approve = event(EventKind::DecisionApproved, decision_id, json!({}));

        // Act
        apply(EventKind::DecisionRejected, &reject, unit.state())
            .await
            .unwrap();
        let late_approval = apply(EventKind::DecisionApproved, &approve, unit.state()).await;
        unit.commit().await.unwrap();

        // Assert
        assert!(matches!(late_approval, Err(ProjectionError::Precondition(_))));
        let decision = store.decision(decision_id).unwrap();
        assert_eq!(decision.status, DecisionStatus::Rejected);
        assert_eq!(decision.resolved_by.as_deref(), Some("user:staff-2"));
        assert_eq!(decision.rejection_reason.as_deref(), Some("margin too low"));
    }

    #[tokio::test]
    async fn test_agent_name_wider_than_its_column_is_rejected() {
        let store = InMemoryEventStore::new();
        let mut unit = store.begin().await.unwrap();
        let evt = event(
            EventKind::DecisionProposed,
            Uuid::new_v4(),
            json!({"agent": "a".repeat(ATTRIBUTION_LEN + 1), "decision_type": "price_adjustment"}),
        );

        let result = apply(EventKind::DecisionProposed, &evt, unit.state()).await;

        assert!(matches!(result, Err(ProjectionError::InvalidPayload { .. })));
    }
}
