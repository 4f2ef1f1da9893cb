// crates/bastion-ledger/src/drip.rs
//
// Fee drip: moves a fraction of each pool's unreserved deposits into its
// fee bucket as time passes, and pays the bucket out to the manager.
//
//   elapsed = now - last_fee_drip_time
//   factor  = model.drip_factor(last_fee_drip_time, elapsed, deposit_amount)   (WAD-scaled, <= WAD)
//   fee     = (deposit_amount - pending_withdrawal_amount) * factor / WAD
//
// The reservation for pending withdrawals is excluded from the base so a
// drip can never push deposits below it. Nothing accrues while Paused.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use bastion_core::math::{mul_wad_down, wad_pow, Amount, WAD};
use bastion_core::{AccountId, AssetId, BastionError, DripModel, PoolId};

use crate::engine::Engine;
use crate::lifecycle::ModuleState;
use crate::pool::ReservePool;
use crate::roles::Caller;

/// Continuous exponential decay at a fixed per-second rate.
///
/// After `elapsed` seconds the retained fraction is `(1 - rate)^elapsed`,
/// so the drip factor is `1 - (1 - rate)^elapsed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DripModelExponential {
    /// WAD-scaled fraction dripped per second.
    pub rate_per_second: u128,
}

impl DripModelExponential {
    pub fn new(rate_per_second: u128) -> Self {
        Self {
            rate_per_second: rate_per_second.min(WAD),
        }
    }
}

impl DripModel for DripModelExponential {
    fn drip_factor(&self, _last_drip_time: u64, elapsed: u64, _deposit_amount: Amount) -> u128 {
        if elapsed == 0 || self.rate_per_second == 0 {
            return 0;
        }
        let retained = wad_pow(WAD - self.rate_per_second.min(WAD), elapsed);
        WAD - retained
    }
}

/// Returns the same factor on every call, regardless of elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DripModelConstantFactor(pub u128);

impl DripModel for DripModelConstantFactor {
    fn drip_factor(&self, _last_drip_time: u64, _elapsed: u64, _deposit_amount: Amount) -> u128 {
        self.0
    }
}

/// Never drips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoDrip;

impl DripModel for NoDrip {
    fn drip_factor(&self, _last_drip_time: u64, _elapsed: u64, _deposit_amount: Amount) -> u128 {
        0
    }
}

/// Fee owed by `pool` at `now` under `model`, without mutating anything.
pub fn fee_due(
    pool: &ReservePool,
    model: &dyn DripModel,
    now: u64,
    paused: bool,
) -> Result<Amount, BastionError> {
    let elapsed = now.saturating_sub(pool.last_fee_drip_time);
    if paused || elapsed == 0 || pool.deposit_amount == 0 {
        return Ok(0);
    }
    let factor = model.drip_factor(pool.last_fee_drip_time, elapsed, pool.deposit_amount);
    if factor > WAD {
        return Err(BastionError::InvalidDripFactor(format!(
            "{:?} returned {} (> {})",
            model, factor, WAD
        )));
    }
    Ok(mul_wad_down(pool.available_amount(), factor))
}

impl Engine {
    /// Drip every pool up to `now`.
    pub fn drip_fees(&mut self, now: u64) -> Result<(), BastionError> {
        let fees = self.pending_fees(self.drip_model.as_ref(), now)?;
        self.settle_fees(&fees, now);
        Ok(())
    }

    /// Drip a single pool up to `now`.
    pub fn drip_pool_fees(&mut self, pool_id: PoolId, now: u64) -> Result<(), BastionError> {
        let fee = self.fee_due(pool_id, now)?;
        self.settle_pool_fee(pool_id, fee, now)
    }

    /// Drip every pool with `model`, then pay out all accrued fees to
    /// `receiver`. Manager only. Returns the amount paid per pool.
    pub fn claim_fees(
        &mut self,
        caller: &Caller,
        receiver: AccountId,
        model: &dyn DripModel,
        now: u64,
    ) -> Result<Vec<(PoolId, Amount)>, BastionError> {
        self.authorize(caller)?;
        caller.require_manager()?;

        let fees = self.pending_fees(model, now)?;
        let payouts: Vec<(PoolId, Amount)> = self
            .inner
            .pools
            .iter()
            .zip(&fees)
            .enumerate()
            .map(|(i, (pool, fee))| (PoolId(i as u16), pool.fee_amount + fee))
            .collect();

        let mut per_asset: HashMap<AssetId, Amount> = HashMap::new();
        for (pool_id, amount) in &payouts {
            let total = per_asset
                .entry(self.inner.pools[pool_id.index()].asset)
                .or_insert(0);
            *total = total.saturating_add(*amount);
        }
        self.require_module_holds(&per_asset, "fee claim")?;

        let module_account = self.module_account();
        for (pool_id, amount) in payouts.iter().filter(|(_, a)| *a > 0) {
            let asset = self.inner.pools[pool_id.index()].asset;
            self.assets
                .transfer(&asset, &module_account, &receiver, *amount)?;
        }

        self.settle_fees(&fees, now);
        for pool in &mut self.inner.pools {
            pool.fee_amount = 0;
        }

        let total = payouts
            .iter()
            .fold(0 as Amount, |acc, (_, a)| acc.saturating_add(*a));
        tracing::info!(
            "Module {}: claimed {} in fees across {} pools to {}",
            self.inner.module_id,
            total,
            payouts.len(),
            receiver
        );
        Ok(payouts)
    }

    /// Fee owed by one pool at `now` under the engine's drip model.
    pub(crate) fn fee_due(&self, pool_id: PoolId, now: u64) -> Result<Amount, BastionError> {
        let pool = self.pool(pool_id)?;
        fee_due(
            pool,
            self.drip_model.as_ref(),
            now,
            self.inner.state == ModuleState::Paused,
        )
    }

    /// Fees owed by every pool, in pool order.
    pub(crate) fn pending_fees(
        &self,
        model: &dyn DripModel,
        now: u64,
    ) -> Result<Vec<Amount>, BastionError> {
        let paused = self.inner.state == ModuleState::Paused;
        self.inner
            .pools
            .iter()
            .map(|pool| fee_due(pool, model, now, paused))
            .collect()
    }

    pub(crate) fn settle_fees(&mut self, fees: &[Amount], now: u64) {
        let module_id = self.inner.module_id;
        for (i, (pool, fee)) in self.inner.pools.iter_mut().zip(fees).enumerate() {
            pool.apply_drip(*fee, now);
            if *fee > 0 {
                tracing::debug!("Module {}: pool#{} dripped {} in fees", module_id, i, fee);
            }
        }
    }

    pub(crate) fn settle_pool_fee(
        &mut self,
        pool_id: PoolId,
        fee: Amount,
        now: u64,
    ) -> Result<(), BastionError> {
        let module_id = self.inner.module_id;
        self.pool_mut(pool_id)?.apply_drip(fee, now);
        if fee > 0 {
            tracing::debug!("Module {}: {} dripped {} in fees", module_id, pool_id, fee);
        }
        Ok(())
    }
}
