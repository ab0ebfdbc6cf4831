use anyhow::{Result, bail};
use pkg_constants::lease::{MAX_REMEDIATION_TIMEOUT_SECS, TEMPLATE_SUFFIX};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::validate::validate_name;

// --- NodeHealthCheck configuration ---

/// Reference to a remediation template, e.g. `SelfNodeRemediationTemplate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// One user-authored escalation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalatingRemediation {
    #[serde(alias = "remediation-template")]
    pub remediation_template: TemplateRef,
    /// How long this remediation may run before escalating. Zero means "use
    /// the default lease duration".
    #[serde(default, alias = "timeout-seconds")]
    pub timeout_seconds: u64,
}

/// User-authored health check configuration.
///
/// Stored at `/registry/nodehealthchecks/<name>`. The order of
/// `escalating_remediations` is significant: the first entry whose kind
/// matches a remediation wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealthCheck {
    pub name: String,
    #[serde(default, alias = "escalating-remediations")]
    pub escalating_remediations: Vec<EscalatingRemediation>,
}

impl NodeHealthCheck {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        for esc in &self.escalating_remediations {
            if !esc.remediation_template.kind.ends_with(TEMPLATE_SUFFIX) {
                bail!(
                    "health check '{}': remediation template kind '{}' must end with '{}'",
                    self.name,
                    esc.remediation_template.kind,
                    TEMPLATE_SUFFIX
                );
            }
            if esc.timeout_seconds > MAX_REMEDIATION_TIMEOUT_SECS {
                bail!(
                    "health check '{}': timeout {}s for '{}' exceeds the maximum of {}s",
                    self.name,
                    esc.timeout_seconds,
                    esc.remediation_template.kind,
                    MAX_REMEDIATION_TIMEOUT_SECS
                );
            }
        }
        Ok(())
    }
}

// --- Escalation policy ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationStep {
    /// Template kind with the `Template` suffix removed
    pub remediation_kind: String,
    pub timeout: Duration,
}

impl EscalationStep {
    pub fn from_template_kind(template_kind: &str, timeout: Duration) -> Self {
        let kind = template_kind
            .strip_suffix(TEMPLATE_SUFFIX)
            .unwrap_or(template_kind);
        Self {
            remediation_kind: kind.to_string(),
            timeout,
        }
    }
}

/// Ordered escalation steps plus a `kind → timeout` table of the first
/// matching step, built once so lookups don't rescan the list.
#[derive(Debug, Clone, Default)]
pub struct EscalationPolicy {
    steps: Vec<EscalationStep>,
    first_match: HashMap<String, Duration>,
}

impl EscalationPolicy {
    pub fn new(steps: Vec<EscalationStep>) -> Self {
        let mut first_match = HashMap::with_capacity(steps.len());
        for step in &steps {
            // Duplicate kinds: the earliest entry wins.
            first_match
                .entry(step.remediation_kind.clone())
                .or_insert(step.timeout);
        }
        Self { steps, first_match }
    }

    /// A policy without escalation; every remediation gets the default duration.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_health_check(nhc: &NodeHealthCheck) -> Self {
        Self::new(
            nhc.escalating_remediations
                .iter()
                .map(|esc| {
                    EscalationStep::from_template_kind(
                        &esc.remediation_template.kind,
                        Duration::from_secs(esc.timeout_seconds),
                    )
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[EscalationStep] {
        &self.steps
    }

    /// Timeout of the first step matching `kind` (case-sensitive), if any.
    pub fn timeout_for(&self, kind: &str) -> Option<Duration> {
        self.first_match.get(kind).copied()
    }
}

// --- Competing machine health checks ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnhealthyCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default)]
    pub timeout_seconds: u64,
}

/// A health check owned by a different fleet-management controller.
/// Stored at `/registry/machinehealthchecks/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineHealthCheck {
    pub name: String,
    #[serde(default)]
    pub unhealthy_conditions: Vec<UnhealthyCondition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escalation(kind: &str, timeout_seconds: u64) -> EscalatingRemediation {
        EscalatingRemediation {
            remediation_template: TemplateRef {
                kind: kind.to_string(),
                name: "tmpl".to_string(),
                namespace: None,
            },
            timeout_seconds,
        }
    }

    #[test]
    fn test_template_suffix_is_stripped() {
        let step = EscalationStep::from_template_kind("SelfNodeRemediationTemplate", Duration::ZERO);
        assert_eq!(step.remediation_kind, "SelfNodeRemediation");

        // Only a trailing, exact-case suffix is removed.
        let step = EscalationStep::from_template_kind("TemplateReboot", Duration::ZERO);
        assert_eq!(step.remediation_kind, "TemplateReboot");
        let step = EscalationStep::from_template_kind("Rebootemplate", Duration::ZERO);
        assert_eq!(step.remediation_kind, "Rebootemplate");
        let step = EscalationStep::from_template_kind("RebootTEMPLATE", Duration::ZERO);
        assert_eq!(step.remediation_kind, "RebootTEMPLATE");
    }

    #[test]
    fn test_policy_first_match_wins() {
        let nhc = NodeHealthCheck {
            name: "workers".to_string(),
            escalating_remediations: vec![
                escalation("SoftRebootTemplate", 300),
                escalation("PowerCycleTemplate", 1200),
                escalation("SoftRebootTemplate", 900),
            ],
        };
        let policy = EscalationPolicy::from_health_check(&nhc);
        assert_eq!(policy.steps().len(), 3);
        assert_eq!(policy.timeout_for("SoftReboot"), Some(Duration::from_secs(300)));
        assert_eq!(policy.timeout_for("PowerCycle"), Some(Duration::from_secs(1200)));
        assert_eq!(policy.timeout_for("softreboot"), None);
        assert_eq!(policy.timeout_for("SoftRebootTemplate"), None);
    }

    #[test]
    fn test_empty_policy() {
        let policy = EscalationPolicy::from_health_check(&NodeHealthCheck {
            name: "workers".to_string(),
            escalating_remediations: vec![],
        });
        assert!(policy.is_empty());
        assert_eq!(policy.timeout_for("SoftReboot"), None);
    }

    #[test]
    fn test_validate_health_check() {
        let mut nhc = NodeHealthCheck {
            name: "workers".to_string(),
            escalating_remediations: vec![escalation("SoftRebootTemplate", 300)],
        };
        assert!(nhc.validate().is_ok());

        nhc.escalating_remediations.push(escalation("PowerCycle", 600));
        assert!(nhc.validate().is_err());

        nhc.escalating_remediations.pop();
        nhc.escalating_remediations
            .push(escalation("PowerCycleTemplate", MAX_REMEDIATION_TIMEOUT_SECS));
        assert!(nhc.validate().is_ok());
        nhc.escalating_remediations
            .push(escalation("ReprovisionTemplate", 10_000_000_000_000));
        assert!(nhc.validate().is_err());

        nhc.escalating_remediations.truncate(1);
        nhc.name = "Workers".to_string();
        assert!(nhc.validate().is_err());
    }

    #[test]
    fn test_health_check_from_yaml() {
        let yaml = r#"
name: workers
escalating-remediations:
  - remediation-template:
      kind: SoftRebootTemplate
      name: soft
    timeout-seconds: 300
  - remediation-template:
      kind: PowerCycleTemplate
      name: hard
"#;
        let nhc: NodeHealthCheck = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(nhc.escalating_remediations.len(), 2);
        assert_eq!(nhc.escalating_remediations[1].timeout_seconds, 0);
    }
}
