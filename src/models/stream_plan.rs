use super::node::NodeId;
use super::token::TokenRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One unit of streaming work: push a keyspace's range to a target node.
///
/// `(keyspace, range, target)` is the identity the ledger keys completed
/// transfers on, so it must stay stable across attempts on an unchanged ring.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamTask {
    pub keyspace: String,
    pub range: TokenRange,
    pub target: NodeId,
}

impl StreamTask {
    pub fn new(keyspace: impl Into<String>, range: TokenRange, target: NodeId) -> Self {
        Self {
            keyspace: keyspace.into(),
            range,
            target,
        }
    }
}

impl fmt::Display for StreamTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} -> {}", self.keyspace, self.range, self.target)
    }
}

/// Ordered transfer tasks computed for one decommission attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPlan {
    pub node_id: NodeId,
    pub tasks: Vec<StreamTask>,
    pub created_at: DateTime<Utc>,
}

impl StreamPlan {
    pub fn new(node_id: NodeId, tasks: Vec<StreamTask>) -> Self {
        Self {
            node_id,
            tasks,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamTask> {
        self.tasks.iter()
    }

    /// Distinct `(keyspace, range)` pairs covered by the plan
    pub fn ranges(&self) -> BTreeSet<(String, TokenRange)> {
        self.tasks
            .iter()
            .map(|task| (task.keyspace.clone(), task.range))
            .collect()
    }

    pub fn targets(&self) -> BTreeSet<NodeId> {
        self.tasks.iter().map(|task| task.target.clone()).collect()
    }
}
