use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of a storage node within the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a single decommission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(Uuid);

impl AttemptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cluster membership state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipState {
    /// Normal member serving reads and writes for its ranges
    Joined,
    /// A decommission attempt currently holds this node
    Leaving,
    /// Node has handed off all ranges and left the ring
    Left,
}

impl MembershipState {
    /// Whether the node may be selected as a streaming target or replica
    pub fn is_eligible_replica(&self) -> bool {
        matches!(self, Self::Joined)
    }
}

impl fmt::Display for MembershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Joined => write!(f, "joined"),
            Self::Leaving => write!(f, "leaving"),
            Self::Left => write!(f, "left"),
        }
    }
}

impl std::str::FromStr for MembershipState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "joined" => Ok(Self::Joined),
            "leaving" => Ok(Self::Leaving),
            "left" => Ok(Self::Left),
            _ => Err(format!("Invalid membership state: {s}")),
        }
    }
}

/// Membership status as stored in the shared cluster view.
///
/// The attempt id is the lock owner while the node is `Leaving`; compare-and-set
/// operations match on the whole status, so two attempts can never both move
/// the node out of `Joined`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub state: MembershipState,
    pub attempt: Option<AttemptId>,
}

impl NodeStatus {
    pub fn joined() -> Self {
        Self {
            state: MembershipState::Joined,
            attempt: None,
        }
    }

    pub fn leaving(attempt: AttemptId) -> Self {
        Self {
            state: MembershipState::Leaving,
            attempt: Some(attempt),
        }
    }

    pub fn left() -> Self {
        Self {
            state: MembershipState::Left,
            attempt: None,
        }
    }
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::joined()
    }
}
