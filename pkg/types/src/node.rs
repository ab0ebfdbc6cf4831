use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- Node status ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeStatus {
    Ready,
    NotReady,
    Unknown,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Ready => write!(f, "Ready"),
            NodeStatus::NotReady => write!(f, "NotReady"),
            NodeStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

// --- Node condition ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub last_transition_time: Option<DateTime<Utc>>,
}

// --- Persisted Node object ---

/// A cluster node as seen by the controller. Read-only: the controller
/// never writes nodes back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub status: NodeStatus,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

impl Node {
    /// True if the node carries a condition of the given type, whatever its status.
    pub fn has_condition(&self, condition_type: &str) -> bool {
        self.conditions
            .iter()
            .any(|c| c.condition_type == condition_type)
    }
}
