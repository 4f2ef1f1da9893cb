// crates/bastion-ledger/src/config.rs
//
// Configuration update payloads and their commitment.
//
// A `ConfigUpdate` is a full replacement configuration: the complete pool
// list (existing pools first, in order, then any new ones), the binding
// updates, and the new delays. Only its SHA-256 commitment is stored while
// an update is queued; finalizing re-supplies the payload and must hash to
// the same digest.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use bastion_core::{AccountId, AssetId, BastionError, CommitEncoder, DetectorId, Digest32, ZOC};

use crate::delays::Delays;

/// Maximum number of reserve pools a module may hold.
pub const MAX_RESERVE_POOLS: usize = 255;

/// Domain tag for config update commitments.
const CONFIG_UPDATE_DOMAIN: &[u8] = b"bastion/config-update/v1";

/// Requested configuration for one reserve pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Largest fraction (ZOC-scaled) a single loss call may take.
    pub max_loss_fraction: u16,
    /// Asset held by the pool. Must match for existing pools.
    pub asset: AssetId,
}

/// Binds (or unbinds) a loss-detector to a payout authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingUpdate {
    pub detector: DetectorId,
    /// Account entitled to apply a loss when the detector fires.
    pub payout_authority: AccountId,
    /// `false` removes the binding's ability to fire.
    pub exists: bool,
}

/// A full replacement configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub pools: Vec<PoolConfig>,
    pub bindings: Vec<BindingUpdate>,
    pub delays: Delays,
}

impl ConfigUpdate {
    /// Digest over the order-preserving encoding of pools, bindings and delays.
    pub fn commitment(&self) -> Digest32 {
        let mut enc = CommitEncoder::new(CONFIG_UPDATE_DOMAIN);

        enc.put_len(self.pools.len());
        for pool in &self.pools {
            enc.put_u16(pool.max_loss_fraction).put_id(pool.asset.as_bytes());
        }

        enc.put_len(self.bindings.len());
        for binding in &self.bindings {
            enc.put_id(binding.detector.as_bytes())
                .put_id(binding.payout_authority.as_bytes())
                .put_bool(binding.exists);
        }

        enc.put_u64(self.delays.config_update_delay)
            .put_u64(self.delays.config_update_grace_period)
            .put_u64(self.delays.withdrawal_delay);

        enc.finish()
    }

    /// Checks that do not depend on the module's current state.
    pub fn validate_generic(&self) -> Result<(), BastionError> {
        if self.pools.len() > MAX_RESERVE_POOLS {
            return Err(BastionError::InvalidConfiguration(format!(
                "{} pools exceeds the maximum of {}",
                self.pools.len(),
                MAX_RESERVE_POOLS
            )));
        }

        self.delays.validate()?;

        if let Some((i, pool)) = self
            .pools
            .iter()
            .enumerate()
            .find(|(_, p)| p.max_loss_fraction > ZOC)
        {
            return Err(BastionError::InvalidConfiguration(format!(
                "pool {} max_loss_fraction {} exceeds {}",
                i, pool.max_loss_fraction, ZOC
            )));
        }

        let mut seen = HashSet::new();
        for binding in &self.bindings {
            if !seen.insert(binding.detector) {
                return Err(BastionError::InvalidConfiguration(format!(
                    "detector {} listed more than once",
                    binding.detector
                )));
            }
            if binding.exists && binding.payout_authority.is_zero() {
                return Err(BastionError::InvalidConfiguration(format!(
                    "detector {} bound to the zero payout authority",
                    binding.detector
                )));
            }
        }

        Ok(())
    }
}

/// The pending (queued, not yet finalized) config update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigUpdateMetadata {
    /// Commitment to the queued update; zero when nothing is queued.
    pub queued_config_hash: Digest32,
    /// Earliest time the update may be finalized.
    pub update_earliest_time: u64,
    /// Latest time the update may be finalized.
    pub update_deadline: u64,
}

impl ConfigUpdateMetadata {
    pub fn is_queued(&self) -> bool {
        !self.queued_config_hash.is_zero()
    }
}
