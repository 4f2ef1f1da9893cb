// crates/bastion-ledger/src/delays.rs
//
// Delay registry: the three durations (in seconds) every other component
// reads. Replaced wholesale by a finalized config update.

use serde::{Deserialize, Serialize};

use bastion_core::BastionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delays {
    /// Minimum wait between queueing and finalizing a config update.
    pub config_update_delay: u64,
    /// How long after the earliest finalize time a queued update stays valid.
    pub config_update_grace_period: u64,
    /// Wait between queueing and completing a withdrawal.
    pub withdrawal_delay: u64,
}

impl Delays {
    /// A config change must not be able to take effect before a withdrawal
    /// queued at the same moment could complete.
    pub fn validate(&self) -> Result<(), BastionError> {
        if self.config_update_delay <= self.withdrawal_delay {
            return Err(BastionError::InvalidConfiguration(format!(
                "config_update_delay ({}) must exceed withdrawal_delay ({})",
                self.config_update_delay, self.withdrawal_delay
            )));
        }
        Ok(())
    }
}
