//! State store key layout.

/// Prefix for per-node leases. Full key = prefix + node name.
pub const NODE_LEASE_PREFIX: &str = "/registry/leases/nodes/";

/// Prefix for persisted nodes.
pub const NODES_PREFIX: &str = "/registry/nodes/";

/// Prefix for node health check configurations.
pub const NODE_HEALTH_CHECKS_PREFIX: &str = "/registry/nodehealthchecks/";

/// Prefix for active remediation records.
/// Full key = prefix + `<node>/<kind>`.
pub const REMEDIATIONS_PREFIX: &str = "/registry/remediations/";

/// Prefix for competing machine health checks watched by the conflict gate.
pub const MACHINE_HEALTH_CHECKS_PREFIX: &str = "/registry/machinehealthchecks/";
