use super::errors::{ActionError, ActionResult};
use super::events::DecommissionEvent;
use super::guards::{AttemptOutcome, ConcurrencyGuard};
use super::states::DecommissionState;
use crate::events::{EventPublisher, LifecycleEvent};
use crate::ledger::TransferLedger;
use crate::logging::log_decommission_operation;
use crate::membership::ClusterMembership;
use crate::models::{AttemptId, NodeId};
use async_trait::async_trait;
use std::sync::Arc;

/// What an action sees of the transition being applied
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    pub node_id: &'a NodeId,
    pub attempt_id: AttemptId,
    pub from_state: DecommissionState,
    pub to_state: DecommissionState,
    pub event: &'a DecommissionEvent,
}

/// Trait for implementing state transition actions
#[async_trait]
pub trait StateAction: Send + Sync {
    /// Execute the action
    async fn execute(&self, context: &TransitionContext<'_>) -> ActionResult<()>;

    /// Get a description of this action for logging
    fn description(&self) -> &'static str;

    /// Whether a failure is logged and skipped instead of aborting the
    /// remaining actions
    fn is_best_effort(&self) -> bool {
        false
    }
}

/// Action to hand the node's leaving marker back to membership once the
/// attempt reaches an end state
pub struct ReleaseLockAction {
    guard: Arc<ConcurrencyGuard>,
}

impl ReleaseLockAction {
    pub fn new(guard: Arc<ConcurrencyGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl StateAction for ReleaseLockAction {
    async fn execute(&self, context: &TransitionContext<'_>) -> ActionResult<()> {
        let outcome = match context.to_state {
            DecommissionState::Decommissioned => AttemptOutcome::Succeeded,
            DecommissionState::Failed => AttemptOutcome::Failed,
            _ => return Ok(()),
        };

        self.guard
            .release(context.node_id, context.attempt_id, outcome)
            .await
            .map_err(|e| ActionError::LockRelease(e.to_string()))?;
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Release the decommission lock held in membership"
    }
}

/// Action to drop a decommissioned node's tokens from the ring
pub struct RemoveFromRingAction {
    membership: Arc<dyn ClusterMembership>,
}

impl RemoveFromRingAction {
    pub fn new(membership: Arc<dyn ClusterMembership>) -> Self {
        Self { membership }
    }
}

#[async_trait]
impl StateAction for RemoveFromRingAction {
    async fn execute(&self, context: &TransitionContext<'_>) -> ActionResult<()> {
        if context.to_state == DecommissionState::Decommissioned {
            self.membership.remove_node(context.node_id).await?;
            tracing::info!(node_id = %context.node_id, "Node removed from the ring");
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Remove the node from the token ring"
    }
}

/// Action to forget ledger history of a node that has left
pub struct ResetLedgerAction {
    ledger: Arc<dyn TransferLedger>,
}

impl ResetLedgerAction {
    pub fn new(ledger: Arc<dyn TransferLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl StateAction for ResetLedgerAction {
    async fn execute(&self, context: &TransitionContext<'_>) -> ActionResult<()> {
        if context.to_state == DecommissionState::Decommissioned {
            self.ledger.reset(context.node_id).await?;
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Reset the transfer ledger for the departed node"
    }

    /// The node has already left; stale history only costs disk space
    fn is_best_effort(&self) -> bool {
        true
    }
}

/// Action to publish lifecycle events when state transitions occur
pub struct PublishTransitionEventAction {
    event_publisher: EventPublisher,
}

impl PublishTransitionEventAction {
    pub fn new(event_publisher: EventPublisher) -> Self {
        Self { event_publisher }
    }
}

#[async_trait]
impl StateAction for PublishTransitionEventAction {
    async fn execute(&self, context: &TransitionContext<'_>) -> ActionResult<()> {
        if let Some(event) = lifecycle_event_for(context) {
            log_decommission_operation(
                context.event.event_type(),
                context.node_id.as_str(),
                Some(&context.attempt_id.to_string()),
                &context.to_state.to_string(),
                context.event.error_message(),
            );
            self.event_publisher.publish(event);
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Publish lifecycle event for decommission transition"
    }
}

fn lifecycle_event_for(context: &TransitionContext<'_>) -> Option<LifecycleEvent> {
    let node_id = context.node_id.clone();
    let attempt_id = context.attempt_id;

    match (context.to_state, context.event) {
        (DecommissionState::Decommissioning, DecommissionEvent::Start) => {
            Some(LifecycleEvent::DecommissioningStarted {
                node_id,
                attempt_id,
            })
        }
        (DecommissionState::Decommissioned, DecommissionEvent::Complete) => {
            Some(LifecycleEvent::Decommissioned {
                node_id,
                attempt_id,
            })
        }
        (DecommissionState::Failed, DecommissionEvent::Fail(reason)) => {
            Some(LifecycleEvent::DecommissionFailed {
                node_id,
                attempt_id,
                reason: reason.clone(),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_event_mapping() {
        let node = NodeId::from("node1");
        let attempt = AttemptId::new();
        let fail = DecommissionEvent::fail_with_error("target down");

        let context = TransitionContext {
            node_id: &node,
            attempt_id: attempt,
            from_state: DecommissionState::Decommissioning,
            to_state: DecommissionState::Failed,
            event: &fail,
        };
        assert_eq!(
            lifecycle_event_for(&context),
            Some(LifecycleEvent::DecommissionFailed {
                node_id: node.clone(),
                attempt_id: attempt,
                reason: "target down".to_string(),
            })
        );

        let start = DecommissionEvent::Start;
        let context = TransitionContext {
            node_id: &node,
            attempt_id: attempt,
            from_state: DecommissionState::NotStarted,
            to_state: DecommissionState::Decommissioning,
            event: &start,
        };
        assert!(matches!(
            lifecycle_event_for(&context),
            Some(LifecycleEvent::DecommissioningStarted { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_action_emits_event() {
        let publisher = EventPublisher::new(16);
        let mut events = publisher.subscribe();
        let action = PublishTransitionEventAction::new(publisher);
        let node = NodeId::from("node1");
        let complete = DecommissionEvent::Complete;

        action
            .execute(&TransitionContext {
                node_id: &node,
                attempt_id: AttemptId::new(),
                from_state: DecommissionState::Decommissioning,
                to_state: DecommissionState::Decommissioned,
                event: &complete,
            })
            .await
            .unwrap();

        let published = events.recv().await.unwrap();
        assert!(matches!(
            published.event,
            LifecycleEvent::Decommissioned { .. }
        ));
    }

    #[test]
    fn test_only_ledger_reset_is_best_effort() {
        let membership = Arc::new(crate::membership::InMemoryMembership::new());
        let ledger = Arc::new(crate::ledger::InMemoryTransferLedger::new());

        assert!(ResetLedgerAction::new(ledger).is_best_effort());
        assert!(!RemoveFromRingAction::new(membership).is_best_effort());
        assert!(!PublishTransitionEventAction::new(EventPublisher::new(4)).is_best_effort());
    }
}
