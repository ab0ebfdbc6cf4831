use pkg_constants::lease::{
    DEFAULT_LEASE_DURATION_SECS, HOLDER_IDENTITY, LEASE_BUFFER_SECS, MAX_LEASE_EXTENSIONS,
    REQUEUE_IF_TAKEN_SECS,
};
use pkg_state::clock::Clock;
use pkg_state::lease_store::{LeaseStore, LeaseStoreError};
use pkg_types::healthcheck::EscalationPolicy;
use pkg_types::lease::checked_add_duration;
use pkg_types::remediation::RemediationRecord;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::duration::DurationPolicy;
use crate::error::LeaseError;
use crate::overdue::OverdueDetector;

/// Lease tunables, fixed for the lifetime of an arbiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseConfig {
    pub holder_identity: String,
    /// Added to the TTL requested from the store, never to recheck hints
    pub lease_buffer: Duration,
    /// Recheck hint when another holder owns the lease
    pub requeue_if_taken: Duration,
    pub default_lease_duration: Duration,
    pub max_extensions: u32,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            holder_identity: HOLDER_IDENTITY.to_string(),
            lease_buffer: Duration::from_secs(LEASE_BUFFER_SECS),
            requeue_if_taken: Duration::from_secs(REQUEUE_IF_TAKEN_SECS),
            default_lease_duration: Duration::from_secs(DEFAULT_LEASE_DURATION_SECS),
            max_extensions: MAX_LEASE_EXTENSIONS,
        }
    }
}

/// Per-node lease arbitration.
///
/// Holds no state between calls: everything durable lives in the lease
/// store, and time only moves forward when the caller invokes us again
/// after the returned recheck hint. Calls for the same node must not
/// overlap.
pub struct LeaseArbiter {
    store: Arc<dyn LeaseStore>,
    clock: Arc<dyn Clock>,
    config: LeaseConfig,
    durations: DurationPolicy,
    overdue: OverdueDetector,
}

impl LeaseArbiter {
    pub fn new(store: Arc<dyn LeaseStore>, clock: Arc<dyn Clock>, config: LeaseConfig) -> Self {
        let durations = DurationPolicy::new(config.default_lease_duration);
        let overdue = OverdueDetector::new(durations, config.max_extensions);
        Self {
            store,
            clock,
            config,
            durations,
            overdue,
        }
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Acquire the node lease for a newly requested remediation.
    ///
    /// Returns the recheck hint (the remediation's duration, without the
    /// buffer). Contention is reported as [`LeaseError::AlreadyHeld`]
    /// carrying `requeue_if_taken`.
    pub async fn obtain_lease(
        &self,
        node: &str,
        remediation: &RemediationRecord,
        policy: &EscalationPolicy,
    ) -> Result<Duration, LeaseError> {
        let duration = self.durations.duration_for_remediation(remediation, policy);
        let ttl = self.buffered_ttl(node, duration)?;

        match self
            .store
            .request_lease(node, ttl, &self.config.holder_identity)
            .await
        {
            Ok(()) => {
                info!(
                    "Obtained lease for node {} ({} remediation, ttl={}s)",
                    node,
                    remediation.kind,
                    ttl.as_secs()
                );
                Ok(duration)
            }
            Err(LeaseStoreError::AlreadyHeld { holder, .. }) => {
                info!(
                    "Can't acquire lease for node {}, it is already held by {}",
                    node, holder
                );
                Err(LeaseError::AlreadyHeld {
                    node: node.to_string(),
                    holder,
                    requeue_after: self.config.requeue_if_taken,
                })
            }
            Err(e) => {
                error!("Couldn't obtain lease for node {}: {}", node, e);
                Err(e.into())
            }
        }
    }

    /// Extend, release, or leave alone the node lease depending on the
    /// remediations still active for the node.
    ///
    /// Returns when to call again; `Duration::ZERO` means there is nothing
    /// left to manage.
    pub async fn manage_lease(
        &self,
        node: &str,
        policy: &EscalationPolicy,
        active_remediations: &[RemediationRecord],
    ) -> Result<Duration, LeaseError> {
        let lease = match self.store.get_lease(node).await {
            Ok(lease) => lease,
            Err(LeaseStoreError::NotFound { .. }) => return Ok(Duration::ZERO),
            Err(e) => {
                error!("Managing lease: couldn't fetch lease for node {}: {}", node, e);
                return Err(e.into());
            }
        };

        let owned = lease.is_held_by(&self.config.holder_identity);
        if active_remediations.is_empty() && owned {
            info!("Lease for node {} has no remediations left, releasing", node);
            return self.release(node).await;
        }

        let now = self.clock.now();
        let overdue = self
            .overdue
            .is_overdue(&lease, policy, active_remediations, now)
            .inspect_err(|e| error!("Managing lease: {}", e))?;
        if overdue {
            info!(
                "Lease for node {} (held by {}) is overdue, releasing",
                node, lease.holder_identity
            );
            return self.release(node).await;
        }

        let required = self.durations.required_duration(policy, active_remediations);
        let expected_expiry = checked_add_duration(now, required).ok_or_else(|| {
            LeaseError::DurationOverflow {
                node: node.to_string(),
            }
        })?;
        // None: the lease runs past any representable instant
        let actual_expiry = lease.expires_at();
        debug!(
            "Managing lease for node {}: {} remediation(s), owned={}, expires {:?}, needed until {}",
            node,
            active_remediations.len(),
            owned,
            actual_expiry,
            expected_expiry
        );

        if actual_expiry.is_some_and(|expiry| expiry < expected_expiry) {
            let ttl = self.buffered_ttl(node, required)?;
            self.store
                .request_lease(node, ttl, &self.config.holder_identity)
                .await
                .inspect_err(|e| error!("Couldn't extend lease for node {}: {}", node, e))?;
            info!("Extended lease for node {} (ttl={}s)", node, ttl.as_secs());
        }
        Ok(required)
    }

    fn buffered_ttl(&self, node: &str, duration: Duration) -> Result<Duration, LeaseError> {
        duration
            .checked_add(self.config.lease_buffer)
            .ok_or_else(|| LeaseError::DurationOverflow {
                node: node.to_string(),
            })
    }

    async fn release(&self, node: &str) -> Result<Duration, LeaseError> {
        self.store.invalidate_lease(node).await?;
        Ok(Duration::ZERO)
    }
}
