use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lightweight view of an active remediation resource.
///
/// One record maps to exactly one node, but several kinds may be active
/// for the same node while escalation steps overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationRecord {
    /// Remediation kind, e.g. "SelfNodeRemediation"
    pub kind: String,
    pub node_name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl RemediationRecord {
    pub fn new(kind: &str, node_name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            node_name: node_name.to_string(),
            created_at: None,
        }
    }
}
