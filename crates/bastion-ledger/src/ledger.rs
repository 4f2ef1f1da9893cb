// crates/bastion-ledger/src/ledger.rs
//
// Deposits, exchange-rate views, and claim-token movements between holders.

use bastion_core::math::Amount;
use bastion_core::{AccountId, BastionError, PoolId};

use crate::engine::Engine;
use crate::lifecycle::ModuleState;
use crate::roles::Caller;

impl Engine {
    /// Deposit `amount` of the pool's asset from the caller and mint claim
    /// tokens to `receiver`. Returns the number of claim tokens minted.
    ///
    /// The caller must have approved the module account to pull `amount`.
    ///
    /// # Errors
    /// - `InvalidState` while Paused.
    /// - `AmountIsZero` for a zero amount, `RoundsToZero` when the amount
    ///   is worth no claim tokens at the current rate.
    /// - `Asset` if the transfer into the module fails.
    pub fn deposit(
        &mut self,
        caller: &Caller,
        pool_id: PoolId,
        amount: Amount,
        receiver: AccountId,
        now: u64,
    ) -> Result<Amount, BastionError> {
        self.authorize(caller)?;
        if self.inner.state == ModuleState::Paused {
            return Err(BastionError::InvalidState(format!(
                "module {} is Paused, deposits are halted",
                self.inner.module_id
            )));
        }
        if amount == 0 {
            return Err(BastionError::AmountIsZero);
        }

        let fee = self.fee_due(pool_id, now)?;
        let pool = self.pool(pool_id)?;
        let minted = pool.claim_amount_for(amount, fee);
        if minted == 0 {
            return Err(BastionError::RoundsToZero(format!(
                "deposit of {} into {} mints no claim tokens",
                amount, pool_id
            )));
        }
        if pool.claim_token.total_supply().checked_add(minted).is_none()
            || pool.deposit_amount.checked_add(amount).is_none()
        {
            return Err(BastionError::InvalidState(format!(
                "deposit of {} would overflow {}",
                amount, pool_id
            )));
        }

        let asset = pool.asset;
        let module_account = self.module_account();
        self.assets.transfer_from(
            &asset,
            &module_account,
            &caller.account(),
            &module_account,
            amount,
        )?;

        self.settle_pool_fee(pool_id, fee, now)?;
        let pool = self.pool_mut(pool_id)?;
        pool.claim_token.mint(&receiver, minted)?;
        pool.deposit_amount += amount;
        self.debug_check_invariants();

        tracing::debug!(
            "Module {}: {} deposited {} into {}, minted {} to {}",
            self.inner.module_id,
            caller.account(),
            amount,
            pool_id,
            minted,
            receiver
        );
        Ok(minted)
    }

    /// Claim tokens `asset_amount` would mint at `now`, counting fees not yet dripped.
    pub fn convert_to_claim_amount(
        &self,
        pool_id: PoolId,
        asset_amount: Amount,
        now: u64,
    ) -> Result<Amount, BastionError> {
        let fee = self.fee_due(pool_id, now)?;
        Ok(self.pool(pool_id)?.claim_amount_for(asset_amount, fee))
    }

    /// Assets `claim_amount` is worth at `now`, counting fees not yet dripped.
    pub fn convert_to_asset_amount(
        &self,
        pool_id: PoolId,
        claim_amount: Amount,
        now: u64,
    ) -> Result<Amount, BastionError> {
        let fee = self.fee_due(pool_id, now)?;
        Ok(self.pool(pool_id)?.asset_amount_for(claim_amount, fee))
    }

    pub fn transfer_claim_tokens(
        &mut self,
        caller: &Caller,
        pool_id: PoolId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), BastionError> {
        self.authorize(caller)?;
        self.pool_mut(pool_id)?
            .claim_token
            .transfer(&caller.account(), &to, amount)
    }

    pub fn approve_claim_tokens(
        &mut self,
        caller: &Caller,
        pool_id: PoolId,
        spender: AccountId,
        amount: Amount,
    ) -> Result<(), BastionError> {
        self.authorize(caller)?;
        self.pool_mut(pool_id)?
            .claim_token
            .approve(&caller.account(), &spender, amount);
        Ok(())
    }

    /// Move `amount` of `from`'s claim tokens to `to`, spending the
    /// allowance `from` granted the caller.
    pub fn transfer_claim_tokens_from(
        &mut self,
        caller: &Caller,
        pool_id: PoolId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), BastionError> {
        self.authorize(caller)?;
        let token = &mut self.pool_mut(pool_id)?.claim_token;
        if token.balance_of(&from) < amount {
            return Err(BastionError::InsufficientBalance(format!(
                "{} holds {} claim tokens of {}, cannot transfer {}",
                from,
                token.balance_of(&from),
                pool_id,
                amount
            )));
        }
        token.spend_allowance(&from, &caller.account(), amount)?;
        token.transfer(&from, &to, amount)
    }
}
