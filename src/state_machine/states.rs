use serde::{Deserialize, Serialize};
use std::fmt;

/// Decommission lifecycle of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecommissionState {
    /// No attempt has been made on this node
    NotStarted,
    /// An attempt holds the node and is streaming its ranges
    Decommissioning,
    /// All ranges handed off and the node left the ring
    Decommissioned,
    /// The last attempt failed; a new attempt may start
    Failed,
}

impl DecommissionState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Decommissioned)
    }

    /// Check if this is an error state that may allow recovery
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Check if an attempt is currently running
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Decommissioning)
    }

    /// Whether a new attempt may be started from this state
    pub fn can_start(&self) -> bool {
        matches!(self, Self::NotStarted | Self::Failed)
    }
}

impl fmt::Display for DecommissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Decommissioning => write!(f, "decommissioning"),
            Self::Decommissioned => write!(f, "decommissioned"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for DecommissionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "decommissioning" => Ok(Self::Decommissioning),
            "decommissioned" => Ok(Self::Decommissioned),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid decommission state: {s}")),
        }
    }
}

impl Default for DecommissionState {
    fn default() -> Self {
        Self::NotStarted
    }
}
