//! Lifecycle events observable by monitoring and test harnesses.

use crate::models::{AttemptId, NodeId, TokenRange};
use serde::{Deserialize, Serialize};

/// Stable event names
pub mod constants {
    pub const DECOMMISSIONING_STARTED: &str = "DECOMMISSIONING_STARTED";
    pub const RANGE_TRANSFER_SKIPPED: &str = "RANGE_TRANSFER_SKIPPED";
    pub const RANGE_TRANSFERRED: &str = "RANGE_TRANSFERRED";
    pub const DECOMMISSION_FAILED: &str = "DECOMMISSION_FAILED";
    pub const DECOMMISSIONED: &str = "DECOMMISSIONED";
}

/// Milestones of a decommission, in the order they can occur
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEvent {
    /// Attempt admitted; emitted before any data moves
    DecommissioningStarted {
        node_id: NodeId,
        attempt_id: AttemptId,
    },
    /// Range excluded from this attempt because an earlier one finished it
    RangeTransferSkipped {
        node_id: NodeId,
        keyspace: String,
        range: TokenRange,
        target: NodeId,
    },
    /// One planned transfer committed on its target
    RangeTransferred {
        node_id: NodeId,
        keyspace: String,
        range: TokenRange,
        target: NodeId,
        rows: u64,
        bytes: u64,
    },
    DecommissionFailed {
        node_id: NodeId,
        attempt_id: AttemptId,
        reason: String,
    },
    /// Terminal success, emitted exactly once per node
    Decommissioned {
        node_id: NodeId,
        attempt_id: AttemptId,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DecommissioningStarted { .. } => constants::DECOMMISSIONING_STARTED,
            Self::RangeTransferSkipped { .. } => constants::RANGE_TRANSFER_SKIPPED,
            Self::RangeTransferred { .. } => constants::RANGE_TRANSFERRED,
            Self::DecommissionFailed { .. } => constants::DECOMMISSION_FAILED,
            Self::Decommissioned { .. } => constants::DECOMMISSIONED,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::DecommissioningStarted { node_id, .. }
            | Self::RangeTransferSkipped { node_id, .. }
            | Self::RangeTransferred { node_id, .. }
            | Self::DecommissionFailed { node_id, .. }
            | Self::Decommissioned { node_id, .. } => node_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::DecommissionFailed { .. } | Self::Decommissioned { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Token;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = LifecycleEvent::RangeTransferSkipped {
            node_id: NodeId::from("node2"),
            keyspace: "ks".to_string(),
            range: TokenRange::new(Token(1), Token(2)),
            target: NodeId::from("node1"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], constants::RANGE_TRANSFER_SKIPPED);
        assert_eq!(json["target"], "node1");
        assert_eq!(event.name(), constants::RANGE_TRANSFER_SKIPPED);
        assert!(!event.is_terminal());
    }
}
