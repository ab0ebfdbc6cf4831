use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A time-bounded exclusive-ownership record for one node.
/// Stored at `/registry/leases/nodes/<node-name>` in SlateDB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Name of the node this lease guards
    pub node_name: String,
    /// Logical owner of the lease
    pub holder_identity: String,
    /// When the current holder first acquired the lease.
    /// Set once on acquisition and never touched by renewals; a lease
    /// without it cannot be time-bounded.
    #[serde(default)]
    pub acquire_time: Option<DateTime<Utc>>,
    /// When the lease was last renewed
    pub renew_time: DateTime<Utc>,
    /// Lease time-to-live in seconds, counted from `renew_time`
    pub duration_seconds: u64,
}

impl Lease {
    /// Instant at which the lease lapses unless renewed, or `None` if that
    /// lies beyond the representable range (the lease never lapses).
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        checked_add_duration(self.renew_time, Duration::from_secs(self.duration_seconds))
    }

    /// Check if this lease has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expiry| now > expiry)
    }

    pub fn is_held_by(&self, holder_identity: &str) -> bool {
        self.holder_identity == holder_identity
    }
}

/// Convert a std duration to a chrono duration at millisecond precision.
/// `None` if it does not fit.
pub fn chrono_duration(d: Duration) -> Option<TimeDelta> {
    i64::try_from(d.as_millis())
        .ok()
        .and_then(TimeDelta::try_milliseconds)
}

/// `t + d`, or `None` on overflow.
pub fn checked_add_duration(t: DateTime<Utc>, d: Duration) -> Option<DateTime<Utc>> {
    chrono_duration(d).and_then(|delta| t.checked_add_signed(delta))
}
