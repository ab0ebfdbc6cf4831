use chrono::{DateTime, Utc};
use pkg_types::healthcheck::EscalationPolicy;
use pkg_types::lease::{Lease, checked_add_duration};
use pkg_types::remediation::RemediationRecord;

use crate::duration::DurationPolicy;
use crate::error::LeaseError;

/// Decides whether a held lease has used up its extension budget.
///
/// A lease may live for the initial period plus `max_extensions` renewals,
/// each one `required_duration` long, counted from `acquire_time`.
#[derive(Debug, Clone, Copy)]
pub struct OverdueDetector {
    durations: DurationPolicy,
    max_extensions: u32,
}

impl OverdueDetector {
    pub fn new(durations: DurationPolicy, max_extensions: u32) -> Self {
        Self {
            durations,
            max_extensions,
        }
    }

    /// Latest instant the lease may still be held.
    pub fn deadline(
        &self,
        lease: &Lease,
        policy: &EscalationPolicy,
        remediations: &[RemediationRecord],
    ) -> Result<DateTime<Utc>, LeaseError> {
        let acquired = lease.acquire_time.ok_or_else(|| LeaseError::MalformedLease {
            node: lease.node_name.clone(),
        })?;
        let required = self.durations.required_duration(policy, remediations);
        // +1 for the initial acquisition period
        required
            .checked_mul(self.max_extensions.saturating_add(1))
            .and_then(|budget| checked_add_duration(acquired, budget))
            .ok_or_else(|| LeaseError::DurationOverflow {
                node: lease.node_name.clone(),
            })
    }

    pub fn is_overdue(
        &self,
        lease: &Lease,
        policy: &EscalationPolicy,
        remediations: &[RemediationRecord],
        now: DateTime<Utc>,
    ) -> Result<bool, LeaseError> {
        Ok(now > self.deadline(lease, policy, remediations)?)
    }
}
