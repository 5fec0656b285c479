use super::errors::StateMachineResult;
use super::states::DecommissionState;
use crate::models::{AttemptId, NodeId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// One recorded state change of a node's decommission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecommissionTransition {
    pub node_id: NodeId,
    pub attempt_id: AttemptId,
    pub from_state: DecommissionState,
    pub to_state: DecommissionState,
    pub event: String,
    pub sort_key: u32,
    pub most_recent: bool,
    pub created_at: DateTime<Utc>,
}

/// Trait for persisting state transitions
#[async_trait]
pub trait TransitionPersistence: Send + Sync {
    /// Persist a state transition
    async fn persist_transition(
        &self,
        node_id: &NodeId,
        attempt_id: AttemptId,
        from_state: DecommissionState,
        to_state: DecommissionState,
        event: &str,
    ) -> StateMachineResult<()>;

    /// Resolve the current state from persisted transitions
    async fn resolve_current_state(
        &self,
        node_id: &NodeId,
    ) -> StateMachineResult<Option<DecommissionState>>;

    /// Transition history of the node, oldest first
    async fn transitions(&self, node_id: &NodeId) -> StateMachineResult<Vec<DecommissionTransition>>;
}

/// Process-local transition history
#[derive(Debug, Default)]
pub struct InMemoryTransitionPersistence {
    history: DashMap<NodeId, Vec<DecommissionTransition>>,
}

impl InMemoryTransitionPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransitionPersistence for InMemoryTransitionPersistence {
    async fn persist_transition(
        &self,
        node_id: &NodeId,
        attempt_id: AttemptId,
        from_state: DecommissionState,
        to_state: DecommissionState,
        event: &str,
    ) -> StateMachineResult<()> {
        let mut history = self.history.entry(node_id.clone()).or_default();

        for previous in history.iter_mut() {
            previous.most_recent = false;
        }
        let sort_key = history.len() as u32 + 1;

        history.push(DecommissionTransition {
            node_id: node_id.clone(),
            attempt_id,
            from_state,
            to_state,
            event: event.to_string(),
            sort_key,
            most_recent: true,
            created_at: Utc::now(),
        });

        Ok(())
    }

    async fn resolve_current_state(
        &self,
        node_id: &NodeId,
    ) -> StateMachineResult<Option<DecommissionState>> {
        Ok(self.history.get(node_id).and_then(|history| {
            history
                .iter()
                .find(|transition| transition.most_recent)
                .map(|transition| transition.to_state)
        }))
    }

    async fn transitions(&self, node_id: &NodeId) -> StateMachineResult<Vec<DecommissionTransition>> {
        Ok(self
            .history
            .get(node_id)
            .map(|history| history.clone())
            .unwrap_or_default())
    }
}
