use pkg_constants::lease::NODE_CONDITION_TERMINATING;
use pkg_constants::state::MACHINE_HEALTH_CHECKS_PREFIX;
use pkg_state::client::StateStore;
use pkg_types::healthcheck::MachineHealthCheck;
use pkg_types::node::Node;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{info, warn};

/// Gate consulted before any lease is requested for a node.
pub trait ConflictGate: Send + Sync {
    /// True if a competing health checker owns remediation cluster-wide.
    fn need_disable_orchestration(&self) -> bool;

    /// True if this particular node is handled by someone else.
    fn need_ignore_node(&self, node: &Node) -> bool;
}

/// Gate for clusters without a competing health checker.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGate;

impl ConflictGate for NoopGate {
    fn need_disable_orchestration(&self) -> bool {
        false
    }

    fn need_ignore_node(&self, _node: &Node) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompetingStatus {
    /// Not looked yet
    Unknown,
    NoCompeting,
    /// A single checker that only reacts to `Terminating` nodes
    TerminationOnly,
    /// Anything else may fight us over the same nodes
    Custom,
}

impl CompetingStatus {
    pub fn classify(checks: &[MachineHealthCheck]) -> Self {
        match checks {
            [] => CompetingStatus::NoCompeting,
            [only]
                if only.unhealthy_conditions.len() == 1
                    && only.unhealthy_conditions[0].condition_type
                        == NODE_CONDITION_TERMINATING =>
            {
                CompetingStatus::TerminationOnly
            }
            _ => CompetingStatus::Custom,
        }
    }
}

/// Watches machine health checks owned by a fleet-management controller.
///
/// A lone termination-handler check is tolerated (we skip the nodes it
/// handles); any other competing check disables orchestration entirely.
pub struct MachineHealthCheckGate {
    store: StateStore,
    status: RwLock<CompetingStatus>,
}

impl MachineHealthCheckGate {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            status: RwLock::new(CompetingStatus::Unknown),
        }
    }

    pub fn status(&self) -> CompetingStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-list competing checks and update the status. Changes are logged once.
    pub async fn update_status(&self) -> anyhow::Result<()> {
        let checks: Vec<MachineHealthCheck> =
            self.store.list_json(MACHINE_HEALTH_CHECKS_PREFIX).await?;
        let next = CompetingStatus::classify(&checks);

        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        if *status != next {
            match next {
                CompetingStatus::NoCompeting => info!("No competing machine health check found"),
                CompetingStatus::TerminationOnly => info!(
                    "Found termination handler machine health check, will ignore nodes with {} condition",
                    NODE_CONDITION_TERMINATING
                ),
                CompetingStatus::Custom => {
                    warn!("Found custom machine health check, disabling remediation orchestration")
                }
                CompetingStatus::Unknown => {}
            }
            *status = next;
        }
        Ok(())
    }

    /// Start the refresh loop as a background task.
    pub fn start(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "MachineHealthCheckGate started (interval={}s)",
                interval.as_secs()
            );
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.update_status().await {
                    warn!("MachineHealthCheckGate update error: {}", e);
                }
            }
        })
    }
}

impl ConflictGate for MachineHealthCheckGate {
    fn need_disable_orchestration(&self) -> bool {
        self.status() == CompetingStatus::Custom
    }

    fn need_ignore_node(&self, node: &Node) -> bool {
        if self.status() == CompetingStatus::NoCompeting {
            return false;
        }
        if node.has_condition(NODE_CONDITION_TERMINATING) {
            info!(
                "Ignoring unhealthy node {}, it is terminating and handled by a machine health check",
                node.name
            );
            return true;
        }
        false
    }
}
