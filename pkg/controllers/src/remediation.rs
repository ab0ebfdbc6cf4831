use chrono::{DateTime, Utc};
use pkg_constants::state::{NODE_HEALTH_CHECKS_PREFIX, NODES_PREFIX, REMEDIATIONS_PREFIX};
use pkg_state::client::StateStore;
use pkg_state::clock::Clock;
use pkg_types::healthcheck::{EscalationPolicy, NodeHealthCheck};
use pkg_types::lease::checked_add_duration;
use pkg_types::node::Node;
use pkg_types::remediation::RemediationRecord;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::conflict::ConflictGate;
use crate::lease::LeaseArbiter;

/// Key under which a remediation record is stored.
pub fn remediation_key(record: &RemediationRecord) -> String {
    format!("{}{}/{}", REMEDIATIONS_PREFIX, record.node_name, record.kind)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaseState {
    /// We hold the lease and manage it when due
    Held,
    /// Another holder owns it; obtain again when due
    Waiting,
    /// The lease was given up while remediation is still under way. It is not
    /// obtained again until every record for the node is gone.
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scheduled {
    due: DateTime<Utc>,
    state: LeaseState,
}

impl Scheduled {
    fn after(now: DateTime<Utc>, wait: Duration, state: LeaseState) -> Self {
        Self {
            due: checked_add_duration(now, wait).unwrap_or(DateTime::<Utc>::MAX_UTC),
            state,
        }
    }
}

/// Background controller that drives the lease arbiter for every node with
/// active remediation records.
///
/// New nodes get `obtain_lease`; nodes we hold a lease for get
/// `manage_lease` once their recheck hint has elapsed; nodes whose records
/// disappeared get one last `manage_lease` so the lease is released. A lease
/// released while records remain (overdue) is never obtained again for the
/// same remediation.
pub struct RemediationController {
    store: StateStore,
    arbiter: Arc<LeaseArbiter>,
    gate: Arc<dyn ConflictGate>,
    clock: Arc<dyn Clock>,
    health_check: String,
    check_interval: Duration,
    schedule: HashMap<String, Scheduled>,
}

impl RemediationController {
    pub fn new(
        store: StateStore,
        arbiter: Arc<LeaseArbiter>,
        gate: Arc<dyn ConflictGate>,
        clock: Arc<dyn Clock>,
        health_check: String,
        check_interval: Duration,
    ) -> Self {
        Self {
            store,
            arbiter,
            gate,
            clock,
            health_check,
            check_interval,
            schedule: HashMap::new(),
        }
    }

    /// Start the controller loop as a background task.
    pub fn start(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "RemediationController started (health check={}, interval={}s)",
                self.health_check,
                self.check_interval.as_secs()
            );
            let mut interval = tokio::time::interval(self.check_interval);
            loop {
                interval.tick().await;
                if let Err(e) = self.reconcile().await {
                    warn!("RemediationController reconcile error: {}", e);
                }
            }
        })
    }

    async fn load_policy(&self) -> anyhow::Result<EscalationPolicy> {
        let key = format!("{}{}", NODE_HEALTH_CHECKS_PREFIX, self.health_check);
        match self.store.get_json::<NodeHealthCheck>(&key).await? {
            Some(nhc) => {
                nhc.validate()?;
                Ok(EscalationPolicy::from_health_check(&nhc))
            }
            None => {
                debug!(
                    "Health check {} not found, using default lease duration",
                    self.health_check
                );
                Ok(EscalationPolicy::empty())
            }
        }
    }

    /// One pass over all remediation records.
    pub async fn reconcile(&mut self) -> anyhow::Result<()> {
        if self.gate.need_disable_orchestration() {
            warn!("Remediation orchestration disabled by a competing health checker");
            return Ok(());
        }

        let policy = self.load_policy().await?;
        let records: Vec<RemediationRecord> = self.store.list_json(REMEDIATIONS_PREFIX).await?;
        let mut by_node: BTreeMap<String, Vec<RemediationRecord>> = BTreeMap::new();
        for record in records {
            by_node
                .entry(record.node_name.clone())
                .or_default()
                .push(record);
        }

        let gone: Vec<String> = self
            .schedule
            .keys()
            .filter(|node| !by_node.contains_key(*node))
            .cloned()
            .collect();
        for node in gone {
            self.finish(&node, &policy).await;
        }

        let now = self.clock.now();
        for (node, active) in &by_node {
            match self.schedule.get(node).copied() {
                Some(Scheduled {
                    state: LeaseState::Released,
                    ..
                }) => {}
                Some(s) if s.due > now => {}
                Some(Scheduled {
                    state: LeaseState::Held,
                    ..
                }) => self.manage(node, &policy, active, now).await,
                _ => self.obtain(node, &policy, active, now).await,
            }
        }
        Ok(())
    }

    /// Remediations for `node` are gone: let the arbiter release our lease.
    async fn finish(&mut self, node: &str, policy: &EscalationPolicy) {
        let Some(scheduled) = self.schedule.get(node).copied() else {
            return;
        };
        if scheduled.state != LeaseState::Held {
            self.schedule.remove(node);
            return;
        }
        match self.arbiter.manage_lease(node, policy, &[]).await {
            Ok(_) => {
                self.schedule.remove(node);
            }
            Err(e) => warn!("Failed to release lease for node {}: {}", node, e),
        }
    }

    async fn obtain(
        &mut self,
        node: &str,
        policy: &EscalationPolicy,
        active: &[RemediationRecord],
        now: DateTime<Utc>,
    ) {
        let key = format!("{}{}", NODES_PREFIX, node);
        let node_obj: Node = match self.store.get_json(&key).await {
            Ok(Some(n)) => n,
            Ok(None) => {
                debug!("Node {} not found, skipping remediation lease", node);
                return;
            }
            Err(e) => {
                warn!("Failed to read node {}: {}", node, e);
                return;
            }
        };
        if self.gate.need_ignore_node(&node_obj) {
            self.schedule.remove(node);
            return;
        }

        // The most recently requested remediation decides the first lease.
        let Some(newest) = active.iter().max_by_key(|r| r.created_at) else {
            return;
        };
        match self.arbiter.obtain_lease(node, newest, policy).await {
            Ok(recheck) => {
                self.schedule.insert(
                    node.to_string(),
                    Scheduled::after(now, recheck, LeaseState::Held),
                );
            }
            Err(e) => match e.requeue_after() {
                Some(requeue) => {
                    self.schedule.insert(
                        node.to_string(),
                        Scheduled::after(now, requeue, LeaseState::Waiting),
                    );
                }
                None => warn!("Failed to obtain lease for node {}: {}", node, e),
            },
        }
    }

    async fn manage(
        &mut self,
        node: &str,
        policy: &EscalationPolicy,
        active: &[RemediationRecord],
        now: DateTime<Utc>,
    ) {
        match self.arbiter.manage_lease(node, policy, active).await {
            Ok(recheck) if recheck.is_zero() => {
                warn!(
                    "Lease for node {} is gone while {} remediation(s) are still active",
                    node,
                    active.len()
                );
                self.schedule.insert(
                    node.to_string(),
                    Scheduled {
                        due: DateTime::<Utc>::MAX_UTC,
                        state: LeaseState::Released,
                    },
                );
            }
            Ok(recheck) => {
                self.schedule.insert(
                    node.to_string(),
                    Scheduled::after(now, recheck, LeaseState::Held),
                );
            }
            Err(e) if e.is_contention() => {
                info!("Lease for node {} was taken over: {}", node, e);
                self.schedule.remove(node);
            }
            Err(e) => warn!("Failed to manage lease for node {}: {}", node, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::NoopGate;
    use crate::lease::LeaseConfig;
    use pkg_state::clock::FixedClock;
    use pkg_state::lease_store::{KvLeaseStore, LeaseStore, LeaseStoreError};
    use pkg_types::healthcheck::{EscalatingRemediation, TemplateRef};
    use pkg_types::node::NodeStatus;

    struct Harness {
        store: StateStore,
        leases: Arc<KvLeaseStore>,
        clock: FixedClock,
        controller: RemediationController,
    }

    struct DisabledGate;

    impl ConflictGate for DisabledGate {
        fn need_disable_orchestration(&self) -> bool {
            true
        }
        fn need_ignore_node(&self, _node: &Node) -> bool {
            false
        }
    }

    async fn harness(gate: Arc<dyn ConflictGate>) -> Harness {
        let dir = std::env::temp_dir().join(format!("nhc-remediation-{}", uuid::Uuid::new_v4()));
        let store = StateStore::new(dir.to_str().unwrap()).await.unwrap();
        let clock = FixedClock::new(Utc::now());
        let leases = Arc::new(KvLeaseStore::new(store.clone(), Arc::new(clock.clone())));
        let arbiter = Arc::new(LeaseArbiter::new(
            leases.clone(),
            Arc::new(clock.clone()),
            LeaseConfig::default(),
        ));
        let controller = RemediationController::new(
            store.clone(),
            arbiter,
            gate,
            Arc::new(clock.clone()),
            "workers".to_string(),
            Duration::from_secs(15),
        );
        Harness {
            store,
            leases,
            clock,
            controller,
        }
    }

    async fn put_node(store: &StateStore, name: &str) {
        let node = Node {
            name: name.to_string(),
            status: NodeStatus::NotReady,
            last_heartbeat: Utc::now(),
            labels: HashMap::new(),
            conditions: vec![],
        };
        store
            .put_json(&format!("{}{}", NODES_PREFIX, name), &node)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lease_follows_remediation_lifecycle() {
        let mut h = harness(Arc::new(NoopGate)).await;
        put_node(&h.store, "worker-1").await;
        let nhc = NodeHealthCheck {
            name: "workers".to_string(),
            escalating_remediations: vec![EscalatingRemediation {
                remediation_template: TemplateRef {
                    kind: "SoftRebootTemplate".to_string(),
                    name: "soft".to_string(),
                    namespace: None,
                },
                timeout_seconds: 300,
            }],
        };
        h.store
            .put_json(&format!("{}workers", NODE_HEALTH_CHECKS_PREFIX), &nhc)
            .await
            .unwrap();
        let record = RemediationRecord::new("SoftReboot", "worker-1");
        h.store.put_json(&remediation_key(&record), &record).await.unwrap();

        h.controller.reconcile().await.unwrap();
        let lease = h.leases.get_lease("worker-1").await.unwrap();
        assert_eq!(lease.holder_identity, "Node-Healthcheck");
        assert_eq!(lease.duration_seconds, 360);

        // Recheck hint (5m) elapsed: lease ends at +6m, needed until +10m.
        h.clock.advance(Duration::from_secs(300));
        h.controller.reconcile().await.unwrap();
        let extended = h.leases.get_lease("worker-1").await.unwrap();
        assert_eq!(extended.acquire_time, lease.acquire_time);
        assert_eq!(extended.renew_time, lease.renew_time + chrono::Duration::seconds(300));

        h.store.delete(&remediation_key(&record)).await.unwrap();
        h.controller.reconcile().await.unwrap();
        assert!(matches!(
            h.leases.get_lease("worker-1").await,
            Err(LeaseStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_overdue_lease_is_not_obtained_again() {
        let mut h = harness(Arc::new(NoopGate)).await;
        put_node(&h.store, "worker-4").await;
        let record = RemediationRecord::new("SoftReboot", "worker-4");
        h.store.put_json(&remediation_key(&record), &record).await.unwrap();

        h.controller.reconcile().await.unwrap();
        let first = h.leases.get_lease("worker-4").await.unwrap();

        // Default 10m lease, two extensions: released after 30m and never
        // taken again while the record is still there.
        for _ in 0..120 {
            h.clock.advance(Duration::from_secs(60));
            h.controller.reconcile().await.unwrap();
            if let Ok(current) = h.leases.get_lease("worker-4").await {
                assert_eq!(current.acquire_time, first.acquire_time);
            }
        }
        assert!(matches!(
            h.leases.get_lease("worker-4").await,
            Err(LeaseStoreError::NotFound { .. })
        ));

        // Once the remediation is done a new one starts a fresh lease.
        h.store.delete(&remediation_key(&record)).await.unwrap();
        h.controller.reconcile().await.unwrap();
        let next = RemediationRecord::new("PowerCycle", "worker-4");
        h.store.put_json(&remediation_key(&next), &next).await.unwrap();
        h.controller.reconcile().await.unwrap();
        let fresh = h.leases.get_lease("worker-4").await.unwrap();
        assert_eq!(fresh.acquire_time, Some(h.clock.now()));
    }

    #[tokio::test]
    async fn test_contended_node_is_retried_later() {
        let mut h = harness(Arc::new(NoopGate)).await;
        put_node(&h.store, "worker-2").await;
        h.leases
            .request_lease("worker-2", Duration::from_secs(90), "other-operator")
            .await
            .unwrap();
        let record = RemediationRecord::new("SoftReboot", "worker-2");
        h.store.put_json(&remediation_key(&record), &record).await.unwrap();

        h.controller.reconcile().await.unwrap();
        assert_eq!(
            h.leases.get_lease("worker-2").await.unwrap().holder_identity,
            "other-operator"
        );

        // The other holder's lease lapses after 90s; we retry after 1m + 1m.
        h.clock.advance(Duration::from_secs(60));
        h.controller.reconcile().await.unwrap();
        h.clock.advance(Duration::from_secs(60));
        h.controller.reconcile().await.unwrap();
        assert_eq!(
            h.leases.get_lease("worker-2").await.unwrap().holder_identity,
            "Node-Healthcheck"
        );
    }

    #[tokio::test]
    async fn test_disabled_gate_takes_no_leases() {
        let mut h = harness(Arc::new(DisabledGate)).await;
        put_node(&h.store, "worker-3").await;
        let record = RemediationRecord::new("SoftReboot", "worker-3");
        h.store.put_json(&remediation_key(&record), &record).await.unwrap();

        h.controller.reconcile().await.unwrap();
        assert!(h.leases.get_lease("worker-3").await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_node_is_skipped() {
        let mut h = harness(Arc::new(NoopGate)).await;
        let record = RemediationRecord::new("SoftReboot", "ghost");
        h.store.put_json(&remediation_key(&record), &record).await.unwrap();

        h.controller.reconcile().await.unwrap();
        assert!(h.leases.get_lease("ghost").await.is_err());
    }
}
