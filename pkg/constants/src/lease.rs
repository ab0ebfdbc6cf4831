//! Node lease constants.
//!
//! These are the defaults of `LeaseConfig`; every value can be overridden
//! when the arbiter is constructed.

/// Holder identity written on every lease this controller owns.
pub const HOLDER_IDENTITY: &str = "Node-Healthcheck";

/// Extra time added to the TTL requested from the store (never to recheck hints).
pub const LEASE_BUFFER_SECS: u64 = 60;

/// Recheck hint returned when another holder owns the lease.
pub const REQUEUE_IF_TAKEN_SECS: u64 = 60;

/// Lease duration used when no escalation step applies.
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 10 * 60;

/// How many times a lease may be extended after the initial acquisition.
pub const MAX_LEASE_EXTENSIONS: u32 = 2;

/// Upper bound on an escalation step timeout (30 days).
pub const MAX_REMEDIATION_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

/// Suffix stripped from a remediation template kind to get the remediation kind.
pub const TEMPLATE_SUFFIX: &str = "Template";

/// Condition type carried by nodes that a termination-handler health check owns.
pub const NODE_CONDITION_TERMINATING: &str = "Terminating";
