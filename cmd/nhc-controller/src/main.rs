use clap::Parser;
use pkg_constants::paths::{
    DEFAULT_CONTROLLER_CONFIG, DEFAULT_DATA_DIR, DEFAULT_HEALTH_CHECK_NAME,
    DEFAULT_RECONCILE_INTERVAL_SECS,
};
use pkg_controllers::conflict::MachineHealthCheckGate;
use pkg_controllers::remediation::RemediationController;
use pkg_controllers::{LeaseArbiter, LeaseConfig};
use pkg_state::client::StateStore;
use pkg_state::clock::{Clock, SystemClock};
use pkg_state::lease_store::KvLeaseStore;
use pkg_types::config::{ControllerConfigFile, load_config_file};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nhc-controller", about = "Node health remediation lease controller")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_CONTROLLER_CONFIG)]
    config: String,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Name of the node health check whose escalation policy applies
    #[arg(long)]
    health_check: Option<String>,

    /// Seconds between reconcile passes
    #[arg(long)]
    reconcile_interval_secs: Option<u64>,

    /// Identity written on leases this controller holds
    #[arg(long)]
    holder_identity: Option<String>,

    /// Extra seconds added to every requested lease TTL
    #[arg(long)]
    lease_buffer_secs: Option<u64>,

    /// Seconds to wait before retrying a lease held by someone else
    #[arg(long)]
    requeue_if_taken_secs: Option<u64>,

    /// Lease duration when no escalation step applies
    #[arg(long)]
    default_lease_duration_secs: Option<u64>,

    /// How many times a lease may be extended
    #[arg(long)]
    max_lease_extensions: Option<u32>,
}

/// Merge: CLI args > config file > defaults.
fn lease_config(cli: &Cli, file_cfg: &ControllerConfigFile) -> LeaseConfig {
    let defaults = LeaseConfig::default();
    let secs = |arg: Option<u64>, file: Option<u64>, default: Duration| {
        arg.or(file).map(Duration::from_secs).unwrap_or(default)
    };
    LeaseConfig {
        holder_identity: cli
            .holder_identity
            .clone()
            .or_else(|| file_cfg.holder_identity.clone())
            .unwrap_or(defaults.holder_identity),
        lease_buffer: secs(
            cli.lease_buffer_secs,
            file_cfg.lease_buffer_secs,
            defaults.lease_buffer,
        ),
        requeue_if_taken: secs(
            cli.requeue_if_taken_secs,
            file_cfg.requeue_if_taken_secs,
            defaults.requeue_if_taken,
        ),
        default_lease_duration: secs(
            cli.default_lease_duration_secs,
            file_cfg.default_lease_duration_secs,
            defaults.default_lease_duration,
        ),
        max_extensions: cli
            .max_lease_extensions
            .or(file_cfg.max_lease_extensions)
            .unwrap_or(defaults.max_extensions),
    }
}

/// `RUST_LOG` directives if set and valid, otherwise `info`.
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok()))
        .init();
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let file_cfg: ControllerConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    let data_dir = cli
        .data_dir
        .clone()
        .or(file_cfg.data_dir.clone())
        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
    let health_check = cli
        .health_check
        .clone()
        .or(file_cfg.health_check.clone())
        .unwrap_or_else(|| DEFAULT_HEALTH_CHECK_NAME.to_string());
    let interval = Duration::from_secs(
        cli.reconcile_interval_secs
            .or(file_cfg.reconcile_interval_secs)
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS),
    );
    let config = lease_config(&cli, &file_cfg);

    info!("Starting nhc-controller");
    info!("  Data dir:        {}", data_dir);
    info!("  Health check:    {}", health_check);
    info!("  Holder identity: {}", config.holder_identity);
    info!(
        "  Lease:           default={}s buffer={}s requeue={}s max-extensions={}",
        config.default_lease_duration.as_secs(),
        config.lease_buffer.as_secs(),
        config.requeue_if_taken.as_secs(),
        config.max_extensions
    );

    let store = StateStore::new(&data_dir).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let leases = Arc::new(KvLeaseStore::new(store.clone(), clock.clone()));
    let arbiter = Arc::new(LeaseArbiter::new(leases, clock.clone(), config));

    let gate = Arc::new(MachineHealthCheckGate::new(store.clone()));
    gate.update_status().await?;
    let gate_handle = gate.clone().start(interval);

    let controller = RemediationController::new(
        store.clone(),
        arbiter,
        gate,
        clock,
        health_check,
        interval,
    );
    let controller_handle = controller.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down nhc-controller");
    controller_handle.abort();
    gate_handle.abort();
    let _ = controller_handle.await;
    let _ = gate_handle.await;
    store.close().await?;

    Ok(())
}
