// crates/bastion-daemon/src/config.rs
//
// Runtime configuration for the Bastion daemon.
// Loaded from a TOML file or populated with sensible defaults.

use serde::Deserialize;
use std::fs;

use bastion_core::{AccountId, AssetId, DetectorId};
use bastion_ledger::{BindingUpdate, ConfigUpdate, Delays, PoolConfig};

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Directory for module snapshots.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between fee drips across all modules.
    #[serde(default = "default_drip_interval_secs")]
    pub drip_interval_secs: u64,

    /// WAD-scaled per-second rate of the default exponential drip model.
    /// Zero disables drip for modules without an override. TOML integers
    /// are 64-bit; a rate never exceeds WAD, which fits.
    #[serde(default)]
    pub default_drip_rate_per_second: u64,

    /// Account the manager acts as on every module it deploys.
    #[serde(default)]
    pub manager_account: AccountId,

    #[serde(default)]
    pub manager_owner: AccountId,

    #[serde(default)]
    pub manager_pauser: AccountId,

    /// Assets the in-process asset bank knows about.
    #[serde(default)]
    pub assets: Vec<AssetEntry>,

    /// Modules deployed at startup.
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetEntry {
    pub id: AssetId,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleEntry {
    /// Hex-encoded 32-byte deployment salt.
    pub salt: String,
    pub deployer: AccountId,
    pub owner: AccountId,
    pub guardian: AccountId,
    pub config_update_delay: u64,
    pub config_update_grace_period: u64,
    pub withdrawal_delay: u64,
    #[serde(default)]
    pub pools: Vec<PoolEntry>,
    #[serde(default)]
    pub bindings: Vec<BindingEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolEntry {
    pub asset: AssetId,
    pub max_loss_fraction: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BindingEntry {
    pub detector: DetectorId,
    pub payout_authority: AccountId,
}

fn default_data_dir() -> String {
    "~/.bastion/data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_drip_interval_secs() -> u64 {
    60
}

fn default_decimals() -> u8 {
    18
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            drip_interval_secs: default_drip_interval_secs(),
            default_drip_rate_per_second: 0,
            manager_account: AccountId::default(),
            manager_owner: AccountId::default(),
            manager_pauser: AccountId::default(),
            assets: Vec::new(),
            modules: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: DaemonConfig = toml::from_str(contents)?;
        Ok(config)
    }
}

impl ModuleEntry {
    pub fn salt_bytes(&self) -> Result<[u8; 32], String> {
        let hex_str = self.salt.strip_prefix("0x").unwrap_or(&self.salt);
        let bytes = hex::decode(hex_str).map_err(|e| format!("Invalid salt {}: {}", self.salt, e))?;
        bytes
            .try_into()
            .map_err(|_| format!("Salt {} must be exactly 32 bytes", self.salt))
    }

    /// The module's initial configuration.
    pub fn to_config_update(&self) -> ConfigUpdate {
        ConfigUpdate {
            pools: self
                .pools
                .iter()
                .map(|p| PoolConfig {
                    max_loss_fraction: p.max_loss_fraction,
                    asset: p.asset,
                })
                .collect(),
            bindings: self
                .bindings
                .iter()
                .map(|b| BindingUpdate {
                    detector: b.detector,
                    payout_authority: b.payout_authority,
                    exists: true,
                })
                .collect(),
            delays: Delays {
                config_update_delay: self.config_update_delay,
                config_update_grace_period: self.config_update_grace_period,
                withdrawal_delay: self.withdrawal_delay,
            },
        }
    }
}
