// crates/bastion-daemon/src/main.rs
//
// Binary entrypoint for the Bastion safety module daemon.
//
// Initializes tracing, parses CLI arguments, loads configuration,
// restores the persisted asset bank, deploys the configured modules
// (replacing them with persisted snapshots where present), runs the fee
// drip scheduler, and writes snapshots on shutdown.

mod config;
mod persist;
mod scheduler;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use config::DaemonConfig;
use scheduler::DripScheduler;
use state::{DaemonState, DaemonStateMachine};

use bastion_core::{DripModel, InMemoryAssetBank};
use bastion_ledger::{DripModelExponential, NoDrip};
use bastion_manager::{Manager, ManagerRoles, SystemClock};

/// Bastion daemon: hosts safety modules and drips their fees.
#[derive(Parser, Debug)]
#[command(name = "bastion-daemon", version = "0.1.0", about = "Bastion safety module daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.bastion/config.toml")]
    config: String,

    /// Override the data directory from the configuration file.
    #[arg(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration from TOML file, falling back to defaults if the file
    // is not found.
    let config_path = expand_tilde(&args.config);
    let loaded = DaemonConfig::load(&config_path);
    let log_level = match &loaded {
        Ok(cfg) => cfg.log_level.clone(),
        Err(_) => DaemonConfig::default().log_level,
    };

    // Initialize tracing subscriber for structured logging. RUST_LOG wins
    // over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    let mut daemon_config = match loaded {
        Ok(cfg) => {
            tracing::info!("Loaded configuration from {}", config_path);
            cfg
        }
        Err(e) => {
            tracing::warn!(
                "Could not load config from {}: {}. Using defaults.",
                config_path,
                e
            );
            DaemonConfig::default()
        }
    };

    // CLI --data-dir flag overrides the config file value.
    if let Some(dir) = args.data_dir {
        daemon_config.data_dir = dir;
    }
    let data_dir = PathBuf::from(expand_tilde(&daemon_config.data_dir));

    tracing::info!("Bastion Daemon v0.1.0");
    tracing::info!("Data directory: {}", data_dir.display());
    tracing::info!("Drip interval: {}s", daemon_config.drip_interval_secs);
    tracing::info!("Modules configured: {}", daemon_config.modules.len());

    let mut state_machine = DaemonStateMachine::new();

    // Balances backing persisted modules must come back before they do.
    let bank = match persist::load_bank(&data_dir) {
        Ok(Some(state)) => {
            tracing::info!("Restored asset bank from {}", persist::bank_path(&data_dir).display());
            Arc::new(InMemoryAssetBank::from_state(state))
        }
        Ok(None) => Arc::new(InMemoryAssetBank::new()),
        Err(e) => {
            tracing::warn!("Ignoring asset bank snapshot: {}", e);
            Arc::new(InMemoryAssetBank::new())
        }
    };
    for asset in &daemon_config.assets {
        bank.register_asset(asset.id, asset.decimals);
        tracing::info!("Registered asset {} ({} decimals)", asset.id, asset.decimals);
    }

    let default_drip_model: Arc<dyn DripModel> = if daemon_config.default_drip_rate_per_second > 0 {
        Arc::new(DripModelExponential::new(u128::from(
            daemon_config.default_drip_rate_per_second,
        )))
    } else {
        Arc::new(NoDrip)
    };
    tracing::info!("Default drip model: {:?}", default_drip_model);

    let manager = Arc::new(Manager::new(
        ManagerRoles {
            manager: daemon_config.manager_account,
            owner: daemon_config.manager_owner,
            pauser: daemon_config.manager_pauser,
        },
        bank.clone(),
        default_drip_model,
        Arc::new(SystemClock),
    ));

    for entry in &daemon_config.modules {
        let salt = entry.salt_bytes()?;
        let handle = manager
            .deploy(
                entry.deployer,
                entry.owner,
                entry.guardian,
                entry.to_config_update(),
                salt,
            )
            .await?;
        tracing::info!("Module {} ready", handle.module_id());
    }

    state_machine.transition(DaemonState::Restoring)?;
    for module_id in manager.module_ids().await {
        match persist::load_snapshot(&data_dir, &module_id) {
            Ok(Some(snapshot)) => {
                manager.restore(snapshot).await?;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Ignoring snapshot for module {}: {}", module_id, e);
            }
        }
    }

    state_machine.transition(DaemonState::Running)?;
    let mut scheduler = DripScheduler::new(manager.clone(), daemon_config.drip_interval_secs);
    if let Err(e) = scheduler.run().await {
        tracing::error!("Drip scheduler error: {}", e);
    }

    // Transition to shutting down.
    state_machine.transition(DaemonState::ShuttingDown)?;
    let snapshots = manager.snapshot_all().await?;
    let written = persist::save_snapshots(&data_dir, &snapshots)?;
    persist::save_bank(&data_dir, &bank.snapshot())?;
    tracing::info!("Wrote {} module snapshots and the asset bank", written);
    tracing::info!("Bastion daemon shut down gracefully");

    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}
