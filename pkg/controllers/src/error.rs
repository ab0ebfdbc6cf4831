//! Errors returned by the lease arbiter.

use pkg_state::lease_store::LeaseStoreError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeaseError {
    /// Another holder owns the node lease. Expected under contention;
    /// `requeue_after` says when to try again.
    #[error("lease for node {node} is already held by {holder}")]
    AlreadyHeld {
        node: String,
        holder: String,
        requeue_after: Duration,
    },

    /// The stored lease has no acquire time and cannot be time-bounded
    #[error("lease for node {node} is malformed: acquire time is not set")]
    MalformedLease { node: String },

    /// Lease arithmetic left the representable time range
    #[error("lease duration for node {node} is out of range")]
    DurationOverflow { node: String },

    /// Store failure, propagated unchanged
    #[error(transparent)]
    Store(#[from] LeaseStoreError),
}

impl LeaseError {
    /// True for "someone else holds it" outcomes, which callers should not alert on.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            LeaseError::AlreadyHeld { .. } | LeaseError::Store(LeaseStoreError::AlreadyHeld { .. })
        )
    }

    /// Recheck hint carried by the error, if any.
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            LeaseError::AlreadyHeld { requeue_after, .. } => Some(*requeue_after),
            _ => None,
        }
    }
}
