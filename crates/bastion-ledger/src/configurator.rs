// crates/bastion-ledger/src/configurator.rs
//
// Two-phase configuration changes: queue a commitment, wait out the
// config-update delay, then finalize inside the grace window by
// re-supplying the exact payload that was queued.
//
//   queue(update) at t  -> earliest = t + config_update_delay
//                          deadline = earliest + config_update_grace_period
//   finalize(update) at t' with earliest <= t' <= deadline
//                          and commitment(update) == queued hash
//
// Queueing again overwrites the previous proposal. There is no cancel:
// an unfinalized proposal simply lapses after its deadline.

use bastion_core::{BastionError, ClaimToken, Digest32, PoolId};

use crate::config::{ConfigUpdate, ConfigUpdateMetadata};
use crate::engine::Engine;
use crate::lifecycle::{LossBinding, ModuleState};
use crate::pool::ReservePool;
use crate::roles::Caller;

impl Engine {
    /// Queue a full replacement configuration. Owner only.
    ///
    /// # Errors
    /// - `Unauthorized` if the caller is not the owner.
    /// - `InvalidState` while the module is Triggered.
    /// - `InvalidConfiguration` if the update fails generic or contextual validation.
    pub fn queue_config_update(
        &mut self,
        caller: &Caller,
        update: &ConfigUpdate,
        now: u64,
    ) -> Result<ConfigUpdateMetadata, BastionError> {
        self.authorize(caller)?;
        caller.require_owner()?;
        self.require_not_triggered("queue a config update")?;

        update.validate_generic()?;
        self.validate_against_state(update)?;

        let delays = self.inner.delays;
        let earliest = now.saturating_add(delays.config_update_delay);
        let metadata = ConfigUpdateMetadata {
            queued_config_hash: update.commitment(),
            update_earliest_time: earliest,
            update_deadline: earliest.saturating_add(delays.config_update_grace_period),
        };

        if self.inner.config_update.is_queued() {
            tracing::info!(
                "Module {}: replacing queued config update {}",
                self.inner.module_id,
                self.inner.config_update.queued_config_hash
            );
        }
        self.inner.config_update = metadata;

        tracing::info!(
            "Module {}: queued config update {} (earliest {}, deadline {})",
            self.inner.module_id,
            metadata.queued_config_hash,
            metadata.update_earliest_time,
            metadata.update_deadline
        );
        Ok(metadata)
    }

    /// Apply the queued configuration. Anyone may finalize, but only with
    /// the exact payload that was queued.
    ///
    /// # Errors
    /// - `InvalidState` while the module is Triggered.
    /// - `InvalidTimestamp` outside `[update_earliest_time, update_deadline]`.
    /// - `InvalidConfiguration` if the payload does not match the queued
    ///   commitment (including when nothing is queued) or no longer passes
    ///   contextual validation.
    pub fn finalize_config_update(
        &mut self,
        update: &ConfigUpdate,
        now: u64,
    ) -> Result<(), BastionError> {
        self.require_not_triggered("finalize a config update")?;

        let metadata = self.inner.config_update;
        let supplied = update.commitment();
        if !metadata.is_queued() {
            return Err(BastionError::InvalidConfiguration(format!(
                "no config update queued, cannot finalize {}",
                supplied
            )));
        }
        if now < metadata.update_earliest_time {
            return Err(BastionError::InvalidTimestamp(format!(
                "config update not finalizable before {} (now {})",
                metadata.update_earliest_time, now
            )));
        }
        if now > metadata.update_deadline {
            return Err(BastionError::InvalidTimestamp(format!(
                "config update window closed at {} (now {})",
                metadata.update_deadline, now
            )));
        }

        if supplied != metadata.queued_config_hash {
            return Err(BastionError::InvalidConfiguration(format!(
                "config hash {} does not match queued {}",
                supplied, metadata.queued_config_hash
            )));
        }

        // A binding may have fired since the update was queued.
        self.validate_against_state(update)?;

        self.apply_config(update, now);
        self.inner.config_update = ConfigUpdateMetadata::default();
        self.debug_check_invariants();

        tracing::info!(
            "Module {}: finalized config update {} ({} pools, {} bindings)",
            self.inner.module_id,
            supplied,
            self.inner.pools.len(),
            self.inner.bindings.len()
        );
        Ok(())
    }

    /// Hash of the queued update, zero when nothing is queued.
    pub fn queued_config_hash(&self) -> Digest32 {
        self.inner.config_update.queued_config_hash
    }

    /// Checks that depend on the module's current pools and bindings.
    fn validate_against_state(&self, update: &ConfigUpdate) -> Result<(), BastionError> {
        let existing = &self.inner.pools;
        if update.pools.len() < existing.len() {
            return Err(BastionError::InvalidConfiguration(format!(
                "update lists {} pools but the module already has {}; pools cannot be removed",
                update.pools.len(),
                existing.len()
            )));
        }

        for (i, (current, proposed)) in existing.iter().zip(&update.pools).enumerate() {
            if current.asset != proposed.asset {
                return Err(BastionError::InvalidConfiguration(format!(
                    "pool {} asset cannot change from {} to {}",
                    i, current.asset, proposed.asset
                )));
            }
        }

        for binding in &update.bindings {
            if self
                .inner
                .bindings
                .get(&binding.detector)
                .is_some_and(|b| b.has_fired)
            {
                return Err(BastionError::InvalidConfiguration(format!(
                    "detector {} has already fired and cannot be rebound",
                    binding.detector
                )));
            }
        }

        Ok(())
    }

    /// Write a validated configuration into the module.
    pub(crate) fn apply_config(&mut self, update: &ConfigUpdate, now: u64) {
        let module_id = self.inner.module_id;

        for (i, pool_config) in update.pools.iter().enumerate() {
            match self.inner.pools.get_mut(i) {
                Some(pool) => pool.max_loss_fraction = pool_config.max_loss_fraction,
                None => {
                    let pool_id = PoolId(i as u16);
                    self.inner.pools.push(ReservePool::new(
                        pool_config.asset,
                        pool_config.max_loss_fraction,
                        ClaimToken::new(module_id, pool_id),
                        now,
                    ));
                    tracing::info!(
                        "Module {}: added {} for asset {}",
                        module_id,
                        pool_id,
                        pool_config.asset
                    );
                }
            }
        }

        for binding in &update.bindings {
            self.inner.bindings.insert(
                binding.detector,
                LossBinding {
                    exists: binding.exists,
                    payout_authority: binding.payout_authority,
                    has_fired: false,
                },
            );
        }

        self.inner.delays = update.delays;
    }

    pub(crate) fn require_not_triggered(&self, action: &str) -> Result<(), BastionError> {
        if self.inner.state == ModuleState::Triggered {
            return Err(BastionError::InvalidState(format!(
                "cannot {} while module {} is Triggered",
                action, self.inner.module_id
            )));
        }
        Ok(())
    }
}
