use pkg_types::healthcheck::EscalationPolicy;
use pkg_types::remediation::RemediationRecord;
use std::time::Duration;

/// Computes how long a node lease must be held, from the escalation policy.
#[derive(Debug, Clone, Copy)]
pub struct DurationPolicy {
    default_lease_duration: Duration,
}

impl DurationPolicy {
    pub fn new(default_lease_duration: Duration) -> Self {
        Self {
            default_lease_duration,
        }
    }

    /// Timeout of the first escalation step matching the remediation's kind.
    /// Falls back to the default duration when nothing matches or the
    /// matched timeout is zero.
    pub fn duration_for_remediation(
        &self,
        remediation: &RemediationRecord,
        policy: &EscalationPolicy,
    ) -> Duration {
        match policy.timeout_for(&remediation.kind) {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => self.default_lease_duration,
        }
    }

    /// Duration needed by the most severe active remediation.
    ///
    /// Without escalation this is always the default duration. With
    /// escalation, callers must pass at least one remediation: an empty set
    /// yields `Duration::ZERO`.
    pub fn required_duration(
        &self,
        policy: &EscalationPolicy,
        remediations: &[RemediationRecord],
    ) -> Duration {
        if policy.is_empty() {
            return self.default_lease_duration;
        }
        remediations
            .iter()
            .map(|r| self.duration_for_remediation(r, policy))
            .max()
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::healthcheck::EscalationStep;

    const MIN: u64 = 60;

    fn policy(steps: &[(&str, u64)]) -> EscalationPolicy {
        EscalationPolicy::new(
            steps
                .iter()
                .map(|(kind, secs)| {
                    EscalationStep::from_template_kind(kind, Duration::from_secs(*secs))
                })
                .collect(),
        )
    }

    fn durations() -> DurationPolicy {
        DurationPolicy::new(Duration::from_secs(10 * MIN))
    }

    #[test]
    fn test_matching_step_timeout() {
        let p = policy(&[("SoftRebootTemplate", 5 * MIN), ("PowerCycleTemplate", 20 * MIN)]);
        let r = RemediationRecord::new("PowerCycle", "worker-1");
        assert_eq!(
            durations().duration_for_remediation(&r, &p),
            Duration::from_secs(20 * MIN)
        );
    }

    #[test]
    fn test_default_when_no_step_matches() {
        let p = policy(&[("SoftRebootTemplate", 5 * MIN)]);
        let r = RemediationRecord::new("Reprovision", "worker-1");
        assert_eq!(
            durations().duration_for_remediation(&r, &p),
            Duration::from_secs(10 * MIN)
        );
    }

    #[test]
    fn test_default_when_matched_timeout_is_zero() {
        // The first match decides, even if a later duplicate has a timeout.
        let p = policy(&[("SoftRebootTemplate", 0), ("SoftRebootTemplate", 5 * MIN)]);
        let r = RemediationRecord::new("SoftReboot", "worker-1");
        assert_eq!(
            durations().duration_for_remediation(&r, &p),
            Duration::from_secs(10 * MIN)
        );
    }

    #[test]
    fn test_required_duration_without_escalation() {
        let p = EscalationPolicy::empty();
        let d = durations();
        assert_eq!(d.required_duration(&p, &[]), Duration::from_secs(10 * MIN));
        let many = vec![
            RemediationRecord::new("SoftReboot", "worker-1"),
            RemediationRecord::new("PowerCycle", "worker-1"),
            RemediationRecord::new("Reprovision", "worker-1"),
        ];
        assert_eq!(d.required_duration(&p, &many), Duration::from_secs(10 * MIN));
    }

    #[test]
    fn test_required_duration_is_maximum() {
        let p = policy(&[("SoftRebootTemplate", 5 * MIN), ("PowerCycleTemplate", 20 * MIN)]);
        let active = vec![
            RemediationRecord::new("SoftReboot", "worker-1"),
            RemediationRecord::new("PowerCycle", "worker-1"),
        ];
        assert_eq!(
            durations().required_duration(&p, &active),
            Duration::from_secs(20 * MIN)
        );
    }

    #[test]
    fn test_required_duration_includes_default_fallbacks() {
        let p = policy(&[("SoftRebootTemplate", 5 * MIN)]);
        let active = vec![
            RemediationRecord::new("SoftReboot", "worker-1"),
            RemediationRecord::new("Unlisted", "worker-1"),
        ];
        assert_eq!(
            durations().required_duration(&p, &active),
            Duration::from_secs(10 * MIN)
        );
    }

    #[test]
    fn test_required_duration_empty_set_with_escalation_is_zero() {
        let p = policy(&[("SoftRebootTemplate", 5 * MIN)]);
        assert_eq!(durations().required_duration(&p, &[]), Duration::ZERO);
    }
}
