use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use pkg_constants::state::NODE_LEASE_PREFIX;
use pkg_types::lease::Lease;
use pkg_types::validate::validate_name;

use crate::client::StateStore;
use crate::clock::Clock;

/// Errors a lease backend may report. Callers match on the variant instead
/// of inspecting backend error values.
#[derive(Debug, Error)]
pub enum LeaseStoreError {
    /// No lease exists for the node
    #[error("no lease found for node {node}")]
    NotFound { node: String },

    /// Another holder owns a lease with time remaining
    #[error("lease for node {node} is already held by {holder}")]
    AlreadyHeld { node: String, holder: String },

    /// The backend failed (unreachable, corrupt record, ...)
    #[error("lease store failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Versioned per-node lease records with atomic check-and-set.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Create the lease, renew it if `holder_identity` already owns it, or take
    /// it over if the current holder's lease has expired. Fails with
    /// [`LeaseStoreError::AlreadyHeld`] while another holder's lease is valid.
    async fn request_lease(
        &self,
        node: &str,
        ttl: Duration,
        holder_identity: &str,
    ) -> Result<(), LeaseStoreError>;

    /// Fetch the lease for `node`.
    async fn get_lease(&self, node: &str) -> Result<Lease, LeaseStoreError>;

    /// Release the lease for `node`. Releasing a missing lease succeeds.
    async fn invalidate_lease(&self, node: &str) -> Result<(), LeaseStoreError>;
}

fn lease_key(node: &str) -> String {
    format!("{}{}", NODE_LEASE_PREFIX, node)
}

fn new_lease(node: &str, holder_identity: &str, ttl: Duration, now: DateTime<Utc>) -> Lease {
    Lease {
        node_name: node.to_string(),
        holder_identity: holder_identity.to_string(),
        acquire_time: Some(now),
        renew_time: now,
        duration_seconds: ttl.as_secs(),
    }
}

/// [`LeaseStore`] backed by the SlateDB state store.
///
/// Read-modify-write cycles run under one async mutex, so every caller
/// sharing this handle sees check-and-set semantics.
pub struct KvLeaseStore {
    store: StateStore,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl KvLeaseStore {
    pub fn new(store: StateStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    async fn read(&self, node: &str) -> Result<Option<Lease>, LeaseStoreError> {
        Ok(self.store.get_json(&lease_key(node)).await?)
    }

    async fn write(&self, lease: &Lease) -> Result<(), LeaseStoreError> {
        Ok(self
            .store
            .put_json(&lease_key(&lease.node_name), lease)
            .await?)
    }
}

#[async_trait]
impl LeaseStore for KvLeaseStore {
    async fn request_lease(
        &self,
        node: &str,
        ttl: Duration,
        holder_identity: &str,
    ) -> Result<(), LeaseStoreError> {
        validate_name(node)?;
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();

        match self.read(node).await? {
            Some(lease) if lease.is_held_by(holder_identity) => {
                // Ours: renew, keeping the first acquisition time
                let renewed = Lease {
                    renew_time: now,
                    duration_seconds: ttl.as_secs(),
                    ..lease
                };
                debug!(
                    "Renewed lease for node {} ({}s)",
                    node, renewed.duration_seconds
                );
                self.write(&renewed).await
            }
            Some(lease) if lease.is_expired_at(now) => {
                info!(
                    "Lease for node {} expired (held by {}), acquiring for {}",
                    node, lease.holder_identity, holder_identity
                );
                self.write(&new_lease(node, holder_identity, ttl, now)).await
            }
            Some(lease) => Err(LeaseStoreError::AlreadyHeld {
                node: node.to_string(),
                holder: lease.holder_identity,
            }),
            None => {
                info!("No existing lease for node {}, acquiring for {}", node, holder_identity);
                self.write(&new_lease(node, holder_identity, ttl, now)).await
            }
        }
    }

    async fn get_lease(&self, node: &str) -> Result<Lease, LeaseStoreError> {
        self.read(node)
            .await?
            .ok_or_else(|| LeaseStoreError::NotFound {
                node: node.to_string(),
            })
    }

    async fn invalidate_lease(&self, node: &str) -> Result<(), LeaseStoreError> {
        let _guard = self.write_lock.lock().await;
        self.store.delete(&lease_key(node)).await?;
        Ok(())
    }
}
