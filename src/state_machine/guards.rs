use super::errors::{GuardError, GuardResult};
use crate::error::{DecommissionError, Result};
use crate::ledger::TransferLedger;
use crate::membership::{ClusterMembership, MembershipError};
use crate::models::{AttemptId, MembershipState, NodeId, NodeStatus, StreamPlan};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Trait for implementing state transition guards
#[async_trait]
pub trait StateGuard<T: ?Sized + Sync> {
    /// Check if a transition is allowed
    async fn check(&self, entity: &T) -> GuardResult<bool>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Guard to check that every planned task is recorded as completed before
/// the node is allowed to leave the ring
pub struct AllTransfersCompleteGuard {
    node_id: NodeId,
    ledger: Arc<dyn TransferLedger>,
}

impl AllTransfersCompleteGuard {
    pub fn new(node_id: NodeId, ledger: Arc<dyn TransferLedger>) -> Self {
        Self { node_id, ledger }
    }
}

#[async_trait]
impl StateGuard<StreamPlan> for AllTransfersCompleteGuard {
    async fn check(&self, plan: &StreamPlan) -> GuardResult<bool> {
        let completed = self.ledger.completed_ranges(&self.node_id).await?;
        let outstanding = plan.iter().filter(|task| !completed.contains(task)).count();

        if outstanding > 0 {
            return Err(GuardError::TransfersOutstanding {
                outstanding,
                planned: plan.len(),
            });
        }

        Ok(true)
    }

    fn description(&self) -> &'static str {
        "All planned range transfers must be completed"
    }
}

/// How an attempt ended, deciding the status the node is released into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
}

/// Proof that an attempt holds a node's leaving marker
#[derive(Debug)]
pub struct AttemptHandle {
    attempt_id: AttemptId,
    node_id: NodeId,
    started_at: DateTime<Utc>,
}

impl AttemptHandle {
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Mutual exclusion for decommission attempts.
///
/// The lock lives in cluster membership: an attempt owns a node exactly while
/// the node's status is `Leaving` tagged with that attempt's id. Acquiring and
/// releasing are compare-and-set operations, so two attempts racing on the
/// same node cannot both win.
pub struct ConcurrencyGuard {
    membership: Arc<dyn ClusterMembership>,
}

impl ConcurrencyGuard {
    pub fn new(membership: Arc<dyn ClusterMembership>) -> Self {
        Self { membership }
    }

    /// Move the node from `Joined` to `Leaving` under a fresh attempt id.
    ///
    /// A node already leaving yields [`DecommissionError::ConcurrentOperation`]
    /// and is left untouched.
    pub async fn begin(&self, node_id: &NodeId) -> Result<AttemptHandle> {
        let attempt_id = AttemptId::new();

        match self
            .membership
            .compare_and_set_status(node_id, NodeStatus::joined(), NodeStatus::leaving(attempt_id))
            .await
        {
            Ok(()) => {
                info!(
                    node_id = %node_id,
                    attempt_id = %attempt_id,
                    "Acquired decommission lock"
                );
                Ok(AttemptHandle {
                    attempt_id,
                    node_id: node_id.clone(),
                    started_at: Utc::now(),
                })
            }
            Err(MembershipError::StatusMismatch { actual, .. })
                if actual.state == MembershipState::Leaving =>
            {
                warn!(
                    node_id = %node_id,
                    active_attempt = ?actual.attempt,
                    "Rejected decommission: another attempt is in progress"
                );
                Err(DecommissionError::ConcurrentOperation {
                    node_id: node_id.clone(),
                    active_attempt: actual.attempt,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Release the node held by `handle` according to the attempt's outcome
    pub async fn end(&self, handle: AttemptHandle, outcome: AttemptOutcome) -> Result<NodeStatus> {
        self.release(&handle.node_id, handle.attempt_id, outcome).await
    }

    pub(crate) async fn release(
        &self,
        node_id: &NodeId,
        attempt_id: AttemptId,
        outcome: AttemptOutcome,
    ) -> Result<NodeStatus> {
        let released = match outcome {
            AttemptOutcome::Succeeded => NodeStatus::left(),
            AttemptOutcome::Failed => NodeStatus::joined(),
        };

        self.membership
            .compare_and_set_status(node_id, NodeStatus::leaving(attempt_id), released)
            .await?;

        info!(
            node_id = %node_id,
            attempt_id = %attempt_id,
            state = %released.state,
            "Released decommission lock"
        );
        Ok(released)
    }

    /// Revert a leaving marker left behind by an attempt that died with its process.
    ///
    /// Only meaningful on startup, before this process starts any attempt of
    /// its own. Returns whether a marker was cleared.
    pub async fn recover_stale(&self, node_id: &NodeId) -> Result<bool> {
        let status = self.membership.node_status(node_id).await?;
        if status.state != MembershipState::Leaving {
            return Ok(false);
        }

        self.membership
            .compare_and_set_status(node_id, status, NodeStatus::joined())
            .await?;

        warn!(
            node_id = %node_id,
            stale_attempt = ?status.attempt,
            "Cleared stale decommission lock"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryTransferLedger;
    use crate::membership::InMemoryMembership;
    use crate::models::{StreamTask, Token, TokenRange, TransferRecord, TransferStatus};
    use tokio_test::{assert_err, assert_ok};

    fn membership() -> Arc<InMemoryMembership> {
        let membership = InMemoryMembership::new();
        membership.add_node(NodeId::from("node1"), vec![Token(0)]);
        membership.add_node(NodeId::from("node2"), vec![Token(100)]);
        Arc::new(membership)
    }

    #[tokio::test]
    async fn test_second_begin_is_rejected_without_mutation() {
        let membership = membership();
        let guard = ConcurrencyGuard::new(membership.clone());
        let node = NodeId::from("node1");

        let handle = assert_ok!(guard.begin(&node).await);
        let err = assert_err!(guard.begin(&node).await);

        match err {
            DecommissionError::ConcurrentOperation { active_attempt, .. } => {
                assert_eq!(active_attempt, Some(handle.attempt_id()));
            }
            other => panic!("unexpected error: {other}"),
        }
        let status = membership.node_status(&node).await.unwrap();
        assert_eq!(status, NodeStatus::leaving(handle.attempt_id()));
    }

    #[tokio::test]
    async fn test_end_releases_by_outcome() {
        let membership = membership();
        let guard = ConcurrencyGuard::new(membership.clone());
        let node = NodeId::from("node1");

        let handle = guard.begin(&node).await.unwrap();
        let status = guard.end(handle, AttemptOutcome::Failed).await.unwrap();
        assert_eq!(status, NodeStatus::joined());

        let handle = guard.begin(&node).await.unwrap();
        let status = guard.end(handle, AttemptOutcome::Succeeded).await.unwrap();
        assert_eq!(status.state, MembershipState::Left);

        // A node that left cannot be locked again
        let err = assert_err!(guard.begin(&node).await);
        assert!(matches!(err, DecommissionError::Membership(_)));
    }

    #[tokio::test]
    async fn test_recover_stale_marker() {
        let membership = membership();
        let guard = ConcurrencyGuard::new(membership.clone());
        let node = NodeId::from("node1");

        assert!(!guard.recover_stale(&node).await.unwrap());

        let crashed = guard.begin(&node).await.unwrap();
        drop(crashed);
        assert!(guard.recover_stale(&node).await.unwrap());
        assert_eq!(
            membership.node_status(&node).await.unwrap(),
            NodeStatus::joined()
        );
        assert_ok!(guard.begin(&node).await);
    }

    #[tokio::test]
    async fn test_all_transfers_complete_guard() {
        let ledger = Arc::new(InMemoryTransferLedger::new());
        let node = NodeId::from("node1");
        let task = StreamTask::new("ks", TokenRange::new(Token(0), Token(100)), NodeId::from("node2"));
        let plan = StreamPlan::new(node.clone(), vec![task.clone()]);
        let guard = AllTransfersCompleteGuard::new(node.clone(), ledger.clone());

        let err = guard.check(&plan).await.unwrap_err();
        assert!(matches!(
            err,
            GuardError::TransfersOutstanding { outstanding: 1, planned: 1 }
        ));

        ledger
            .record(TransferRecord::new(
                AttemptId::new(),
                node.clone(),
                task,
                TransferStatus::Completed,
            ))
            .await
            .unwrap();
        assert!(guard.check(&plan).await.unwrap());
    }
}
