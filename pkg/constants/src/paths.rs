//! Filesystem path and controller defaults.

/// Default config file path for the controller.
pub const DEFAULT_CONTROLLER_CONFIG: &str = "/etc/nhc/config.yaml";

/// Default data directory for the state store.
pub const DEFAULT_DATA_DIR: &str = "/tmp/nhc-data";

/// Name of the node health check the controller follows when none is configured.
pub const DEFAULT_HEALTH_CHECK_NAME: &str = "default";

/// How often the remediation controller looks for due work, in seconds.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 15;
