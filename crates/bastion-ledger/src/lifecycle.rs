// crates/bastion-ledger/src/lifecycle.rs
//
// Module lifecycle and loss authorization.
//
//   Active --fire--> Triggered --apply_loss (last owed)--> Active
//   Active | Triggered --pause--> Paused --unpause--> Active | Triggered
//
// Firing a bound detector grants its payout authority one loss event.
// While any loss is owed the module is Triggered: config changes and
// withdrawals wait until every owed loss has been applied.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use bastion_core::math::{mul_zoc_down, Amount};
use bastion_core::{
    AccountId, AssetId, BastionError, DetectorId, DetectorState, LossDetector, PoolId,
};

use crate::engine::Engine;
use crate::roles::Caller;

/// Lifecycle state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleState {
    /// Normal operation.
    Active,
    /// At least one loss event is owed to a payout authority.
    Triggered,
    /// Deposits halted, fee drip stopped, withdrawals pay out immediately.
    Paused,
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleState::Active => write!(f, "Active"),
            ModuleState::Triggered => write!(f, "Triggered"),
            ModuleState::Paused => write!(f, "Paused"),
        }
    }
}

/// Binding of a loss-detector to the account allowed to apply its loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossBinding {
    pub exists: bool,
    pub payout_authority: AccountId,
    /// Set on the first successful fire and never cleared.
    pub has_fired: bool,
}

/// One pool's share of a loss event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossSpec {
    pub pool_id: PoolId,
    pub amount: Amount,
}

impl Engine {
    /// Fire a bound detector that reports `Triggered`. Anyone may call.
    ///
    /// # Errors
    /// `InvalidTrigger` if the detector is unbound, already fired, or not
    /// reporting `Triggered`.
    pub fn fire(&mut self, detector: &dyn LossDetector, now: u64) -> Result<(), BastionError> {
        let detector_id = detector.id();
        let module_id = self.inner.module_id;

        let binding = match self.inner.bindings.get(&detector_id) {
            Some(b) if b.exists => *b,
            _ => {
                tracing::warn!("Module {}: fire from unbound detector {}", module_id, detector_id);
                return Err(BastionError::InvalidTrigger(format!(
                    "detector {} is not bound to module {}",
                    detector_id, module_id
                )));
            }
        };
        if binding.has_fired {
            tracing::warn!("Module {}: detector {} already fired", module_id, detector_id);
            return Err(BastionError::InvalidTrigger(format!(
                "detector {} has already fired",
                detector_id
            )));
        }
        let reported = detector.state();
        if reported != DetectorState::Triggered {
            tracing::warn!(
                "Module {}: detector {} reports {:?}, not Triggered",
                module_id,
                detector_id,
                reported
            );
            return Err(BastionError::InvalidTrigger(format!(
                "detector {} reports {:?}",
                detector_id, reported
            )));
        }

        self.mark_fired(&detector_id, binding.payout_authority);

        tracing::info!(
            "Module {}: detector {} fired at {}, {} now entitled ({} losses pending, state {})",
            module_id,
            detector_id,
            now,
            binding.payout_authority,
            self.inner.pending_loss_count,
            self.inner.state
        );
        Ok(())
    }

    fn mark_fired(&mut self, detector_id: &DetectorId, payout_authority: AccountId) {
        if let Some(b) = self.inner.bindings.get_mut(detector_id) {
            b.has_fired = true;
        }
        *self.inner.entitlements.entry(payout_authority).or_insert(0) += 1;
        self.inner.pending_loss_count += 1;
        if self.inner.state == ModuleState::Active {
            self.transition(ModuleState::Triggered);
        }
    }

    /// Seize `losses` from the pools and send them to `receiver`, consuming
    /// one of the caller's loss entitlements.
    ///
    /// An empty or all-zero `losses` settles the entitlement without
    /// moving funds.
    ///
    /// # Errors
    /// - `Unauthorized` if the caller holds no entitlement.
    /// - `InvalidState` unless the module is Triggered.
    /// - `NotFound` for an unknown pool, `InvalidConfiguration` for a pool
    ///   listed twice, `ExceedsMaxLoss` above the pool's max loss fraction.
    /// - `Asset` if the module's balance cannot cover the transfers.
    pub fn apply_loss(
        &mut self,
        caller: &Caller,
        losses: &[LossSpec],
        receiver: AccountId,
        now: u64,
    ) -> Result<(), BastionError> {
        self.authorize(caller)?;
        let authority = caller.account();
        if self.entitlement(&authority) == 0 {
            return Err(BastionError::Unauthorized(format!(
                "{} holds no loss entitlement on module {}",
                authority, self.inner.module_id
            )));
        }
        if self.inner.state != ModuleState::Triggered {
            return Err(BastionError::InvalidState(format!(
                "module {} is {}, losses apply only while Triggered",
                self.inner.module_id, self.inner.state
            )));
        }

        let mut seen = HashSet::new();
        let mut per_asset: HashMap<AssetId, Amount> = HashMap::new();
        for loss in losses {
            if !seen.insert(loss.pool_id) {
                return Err(BastionError::InvalidConfiguration(format!(
                    "{} listed more than once in one loss",
                    loss.pool_id
                )));
            }
            let pool = self.pool(loss.pool_id)?;
            let max = mul_zoc_down(pool.deposit_amount, pool.max_loss_fraction);
            if loss.amount > max {
                return Err(BastionError::ExceedsMaxLoss(format!(
                    "{} loss of {} exceeds max {} ({} of {} deposits)",
                    loss.pool_id, loss.amount, max, pool.max_loss_fraction, pool.deposit_amount
                )));
            }
            *per_asset.entry(pool.asset).or_insert(0) += loss.amount;
        }

        self.require_module_holds(&per_asset, "loss")?;

        let module_account = self.module_account();
        for loss in losses.iter().filter(|l| l.amount > 0) {
            let asset = self.inner.pools[loss.pool_id.index()].asset;
            self.assets
                .transfer(&asset, &module_account, &receiver, loss.amount)?;
        }

        for loss in losses {
            let pool = self.pool_mut(loss.pool_id)?;
            pool.apply_loss(loss.amount);
            if loss.amount > 0 {
                tracing::info!(
                    "Module {}: {} lost {} to {} (deposits now {}, pending {})",
                    self.inner.module_id,
                    loss.pool_id,
                    loss.amount,
                    receiver,
                    self.inner.pools[loss.pool_id.index()].deposit_amount,
                    self.inner.pools[loss.pool_id.index()].pending_withdrawal_amount
                );
            }
        }

        if let Some(count) = self.inner.entitlements.get_mut(&authority) {
            *count -= 1;
            if *count == 0 {
                self.inner.entitlements.remove(&authority);
            }
        }
        self.inner.pending_loss_count -= 1;
        if self.inner.pending_loss_count == 0 {
            self.transition(ModuleState::Active);
        }
        self.debug_check_invariants();

        tracing::info!(
            "Module {}: loss applied by {} at {} ({} losses still pending)",
            self.inner.module_id,
            authority,
            now,
            self.inner.pending_loss_count
        );
        Ok(())
    }

    /// Halt deposits and fee drip. Owner, guardian or manager.
    ///
    /// Fees owed up to `now` are dripped before the pause takes effect.
    pub fn pause(&mut self, caller: &Caller, now: u64) -> Result<(), BastionError> {
        self.authorize(caller)?;
        caller.require_pauser()?;
        if self.inner.state == ModuleState::Paused {
            return Err(BastionError::InvalidStateTransition(format!(
                "module {} is already Paused",
                self.inner.module_id
            )));
        }

        let fees = self.pending_fees(self.drip_model.as_ref(), now)?;
        self.settle_fees(&fees, now);
        self.transition(ModuleState::Paused);

        tracing::info!("Module {} paused by {}", self.inner.module_id, caller.account());
        Ok(())
    }

    /// Resume a paused module. Returns to Triggered if losses are still owed.
    ///
    /// Drip restarts from `now`; the paused interval accrues no fees.
    pub fn unpause(&mut self, caller: &Caller, now: u64) -> Result<(), BastionError> {
        self.authorize(caller)?;
        caller.require_pauser()?;
        if self.inner.state != ModuleState::Paused {
            return Err(BastionError::InvalidStateTransition(format!(
                "module {} is {}, not Paused",
                self.inner.module_id, self.inner.state
            )));
        }

        for pool in &mut self.inner.pools {
            pool.last_fee_drip_time = now;
        }
        let next = if self.inner.pending_loss_count > 0 {
            ModuleState::Triggered
        } else {
            ModuleState::Active
        };
        self.transition(next);

        tracing::info!("Module {} unpaused by {}", self.inner.module_id, caller.account());
        Ok(())
    }

    fn transition(&mut self, to: ModuleState) {
        let from = self.inner.state;
        if from != to {
            tracing::info!("Module {}: {} -> {}", self.inner.module_id, from, to);
            self.inner.state = to;
        }
    }
}
