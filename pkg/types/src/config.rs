use serde::{Deserialize, Serialize};

/// Controller configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// data-dir: /var/lib/nhc/data
/// health-check: workers
/// reconcile-interval-secs: 15
/// holder-identity: Node-Healthcheck
/// lease-buffer-secs: 60
/// requeue-if-taken-secs: 60
/// default-lease-duration-secs: 600
/// max-lease-extensions: 2
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfigFile {
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    #[serde(default, alias = "health-check")]
    pub health_check: Option<String>,
    #[serde(default, alias = "reconcile-interval-secs")]
    pub reconcile_interval_secs: Option<u64>,
    #[serde(default, alias = "holder-identity")]
    pub holder_identity: Option<String>,
    #[serde(default, alias = "lease-buffer-secs")]
    pub lease_buffer_secs: Option<u64>,
    #[serde(default, alias = "requeue-if-taken-secs")]
    pub requeue_if_taken_secs: Option<u64>,
    #[serde(default, alias = "default-lease-duration-secs")]
    pub default_lease_duration_secs: Option<u64>,
    #[serde(default, alias = "max-lease-extensions")]
    pub max_lease_extensions: Option<u32>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let cfg: ControllerConfigFile =
            load_config_file("/nonexistent/nhc/config.yaml").unwrap();
        assert!(cfg.data_dir.is_none());
        assert!(cfg.max_lease_extensions.is_none());
    }

    #[test]
    fn test_kebab_case_keys() {
        let yaml = "health-check: workers\nlease-buffer-secs: 30\nmax-lease-extensions: 4\n";
        let cfg: ControllerConfigFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.health_check.as_deref(), Some("workers"));
        assert_eq!(cfg.lease_buffer_secs, Some(30));
        assert_eq!(cfg.max_lease_extensions, Some(4));
        assert!(cfg.holder_identity.is_none());
    }
}
