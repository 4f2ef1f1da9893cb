// crates/bastion-ledger/src/withdrawal.rs
//
// Withdrawal queue. Queueing burns claim tokens and reserves the asset
// amount they are worth; completing after the withdrawal delay pays that
// amount out, reduced by every loss the pool absorbed in between.
//
// Each request remembers how many entries the pool's dilution accumulator
// had when it was queued. At completion the entries appended since then
// are compounded, in order, against the owed amount:
//
//   payout = owed * retained_k * retained_k+1 * ... * retained_n   (floor per step)
//
// The pool's reservation is diluted by the same fractions when each loss
// lands, so releasing `payout` keeps deposit >= pending.

use serde::{Deserialize, Serialize};

use bastion_core::math::Amount;
use bastion_core::{AccountId, BastionError, PoolId, RequestId};

use crate::engine::Engine;
use crate::lifecycle::ModuleState;
use crate::roles::Caller;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub pool_id: PoolId,
    pub claim_token_amount_burned: Amount,
    /// Assets owed at the exchange rate of the queue time, before dilution.
    pub asset_amount_owed: Amount,
    pub owner: AccountId,
    pub receiver: AccountId,
    pub queue_time: u64,
    pub delay_at_queue_time: u64,
    /// Accumulator length when queued; later entries dilute this request.
    pub dilution_len_at_queue_time: usize,
    /// Accumulator running value when queued (WAD-scaled).
    pub dilution_value_at_queue_time: u128,
}

impl WithdrawalRequest {
    pub fn completable_at(&self) -> u64 {
        self.queue_time.saturating_add(self.delay_at_queue_time)
    }
}

impl Engine {
    /// Burn `claim_amount` of `owner`'s claim tokens and queue a payout of
    /// the assets they are worth to `receiver`.
    ///
    /// A caller other than `owner` spends `owner`'s claim-token allowance.
    /// While Paused the payout is made immediately and no request is kept.
    /// Returns the request id and the amount owed at queue time.
    ///
    /// # Errors
    /// - `InvalidState` while a loss is owed, paused or not.
    /// - `AmountIsZero`, `RoundsToZero` when the burn is worth no assets.
    /// - `InsufficientBalance` for a short balance or allowance.
    pub fn queue_withdrawal(
        &mut self,
        caller: &Caller,
        pool_id: PoolId,
        claim_amount: Amount,
        receiver: AccountId,
        owner: AccountId,
        now: u64,
    ) -> Result<(RequestId, Amount), BastionError> {
        self.authorize(caller)?;
        self.require_no_owed_losses("queue a withdrawal")?;
        if claim_amount == 0 {
            return Err(BastionError::AmountIsZero);
        }

        let fee = self.fee_due(pool_id, now)?;
        let pool = self.pool(pool_id)?;
        let owed = pool.asset_amount_for(claim_amount, fee);
        if owed == 0 {
            return Err(BastionError::RoundsToZero(format!(
                "{} claim tokens of {} are worth no assets",
                claim_amount, pool_id
            )));
        }

        let balance = pool.claim_token.balance_of(&owner);
        if balance < claim_amount {
            return Err(BastionError::InsufficientBalance(format!(
                "{} holds {} claim tokens of {}, cannot withdraw {}",
                owner, balance, pool_id, claim_amount
            )));
        }
        let spender = caller.account();
        if spender != owner {
            let allowance = pool.claim_token.allowance(&owner, &spender);
            if allowance < claim_amount {
                return Err(BastionError::InsufficientBalance(format!(
                    "{} allowed {} to withdraw {} claim tokens of {}, needs {}",
                    owner, spender, allowance, pool_id, claim_amount
                )));
            }
        }

        let paused = self.inner.state == ModuleState::Paused;
        let asset = pool.asset;
        if paused {
            let module_account = self.module_account();
            self.assets
                .transfer(&asset, &module_account, &receiver, owed)?;
        }

        self.settle_pool_fee(pool_id, fee, now)?;
        let request_id = self.next_request_id();
        let withdrawal_delay = self.inner.delays.withdrawal_delay;
        let pool = self.pool_mut(pool_id)?;
        if spender != owner {
            pool.claim_token
                .spend_allowance(&owner, &spender, claim_amount)?;
        }
        pool.claim_token.burn(&owner, claim_amount)?;

        if paused {
            pool.deposit_amount -= owed;
            tracing::info!(
                "Module {}: paused withdrawal {} paid {} from {} to {}",
                self.inner.module_id,
                request_id,
                owed,
                pool_id,
                receiver
            );
            self.debug_check_invariants();
            return Ok((request_id, owed));
        }

        pool.pending_withdrawal_amount += owed;
        pool.pending_request_count += 1;
        let request = WithdrawalRequest {
            pool_id,
            claim_token_amount_burned: claim_amount,
            asset_amount_owed: owed,
            owner,
            receiver,
            queue_time: now,
            delay_at_queue_time: withdrawal_delay,
            dilution_len_at_queue_time: pool.dilution.len(),
            dilution_value_at_queue_time: pool.dilution.latest_value(),
        };
        self.inner.requests.insert(request_id, request);
        self.debug_check_invariants();

        tracing::info!(
            "Module {}: queued withdrawal {} of {} from {} (completable at {})",
            self.inner.module_id,
            request_id,
            owed,
            pool_id,
            now.saturating_add(withdrawal_delay)
        );
        Ok((request_id, owed))
    }

    /// Pay out a queued withdrawal once its delay has elapsed. Anyone may call.
    /// Returns the amount paid.
    ///
    /// # Errors
    /// - `InvalidState` while a loss is owed, paused or not.
    /// - `NotFound` for an unknown or already completed request.
    /// - `DelayNotElapsed` before `queue_time + delay_at_queue_time`.
    pub fn complete_withdrawal(
        &mut self,
        request_id: RequestId,
        now: u64,
    ) -> Result<Amount, BastionError> {
        self.require_no_owed_losses("complete a withdrawal")?;
        let request = self.request(request_id)?.clone();
        if now < request.completable_at() {
            return Err(BastionError::DelayNotElapsed(format!(
                "withdrawal {} completable at {}, now {}",
                request_id,
                request.completable_at(),
                now
            )));
        }

        let payout = self.preview_withdrawal(request_id)?;
        let asset = self.pool(request.pool_id)?.asset;
        if payout > 0 {
            let module_account = self.module_account();
            self.assets
                .transfer(&asset, &module_account, &request.receiver, payout)?;
        }

        self.pool_mut(request.pool_id)?.release_withdrawal(payout);
        self.inner.requests.remove(&request_id);
        self.debug_check_invariants();

        tracing::info!(
            "Module {}: completed withdrawal {} paying {} of {} owed to {}",
            self.inner.module_id,
            request_id,
            payout,
            request.asset_amount_owed,
            request.receiver
        );
        Ok(payout)
    }

    /// Amount a queued request would pay now, after dilution.
    pub fn preview_withdrawal(&self, request_id: RequestId) -> Result<Amount, BastionError> {
        let request = self.request(request_id)?;
        let pool = self.pool(request.pool_id)?;
        Ok(pool
            .dilution
            .dilute(request.dilution_len_at_queue_time, request.asset_amount_owed))
    }

    /// Withdrawals wait while any loss is owed, including one fired or
    /// carried into a pause, so no holder exits ahead of the loss.
    fn require_no_owed_losses(&self, action: &str) -> Result<(), BastionError> {
        if self.inner.pending_loss_count > 0 {
            return Err(BastionError::InvalidState(format!(
                "cannot {} while module {} ({}) owes {} losses",
                action, self.inner.module_id, self.inner.state, self.inner.pending_loss_count
            )));
        }
        Ok(())
    }

    fn request(&self, request_id: RequestId) -> Result<&WithdrawalRequest, BastionError> {
        self.inner
            .requests
            .get(&request_id)
            .ok_or_else(|| BastionError::NotFound(format!("Withdrawal request {}", request_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LossSpec;
    use crate::testutil::*;
    use bastion_core::{AssetBank, DetectorState};

    fn queue(engine: &mut Engine, who: AccountId, claim: Amount, now: u64) -> RequestId {
        engine
            .queue_withdrawal(&engine.caller(who), PoolId(0), claim, who, who, now)
            .unwrap()
            .0
    }

    fn lose(f: &Fixture, engine: &mut Engine, amount: Amount, now: u64) {
        engine
            .apply_loss(
                &engine.caller(f.payout),
                &[LossSpec { pool_id: PoolId(0), amount }],
                f.payout,
                now,
            )
            .unwrap();
    }

    #[test]
    fn test_queue_reserves_and_burns() {
        let f = Fixture::new();
        let mut engine = f.engine();
        f.deposit(&mut engine, f.alice, 1_000, 0);

        let (id, owed) = engine
            .queue_withdrawal(&engine.caller(f.alice), PoolId(0), 100, f.alice, f.alice, 1)
            .unwrap();

        assert_eq!(owed, 100);
        let pool = &engine.pools()[0];
        assert_eq!(pool.pending_withdrawal_amount, 100);
        assert_eq!(pool.pending_request_count, 1);
        assert_eq!(pool.claim_token.total_supply(), 900);
        let request = engine.withdrawal_request(id).unwrap();
        assert_eq!(request.completable_at(), 1 + WITHDRAWAL_DELAY);
        assert_eq!(request.dilution_len_at_queue_time, 0);
        assert_eq!(request.dilution_value_at_queue_time, bastion_core::WAD);
    }

    #[test]
    fn test_complete_before_delay_fails() {
        let f = Fixture::new();
        let mut engine = f.engine();
        f.deposit(&mut engine, f.alice, 1_000, 0);
        let id = queue(&mut engine, f.alice, 100, 0);
        let err = engine
            .complete_withdrawal(id, WITHDRAWAL_DELAY - 1)
            .unwrap_err();
        assert!(matches!(err, BastionError::DelayNotElapsed(_)));
    }

    #[test]
    fn test_complete_pays_receiver() {
        let f = Fixture::new();
        let mut engine = f.engine();
        f.deposit(&mut engine, f.alice, 1_000, 0);
        let before = f.bank.balance_of(&f.asset, &f.alice).unwrap();
        let id = queue(&mut engine, f.alice, 100, 0);

        assert_eq!(engine.complete_withdrawal(id, WITHDRAWAL_DELAY).unwrap(), 100);
        assert_eq!(f.bank.balance_of(&f.asset, &f.alice).unwrap(), before + 100);
        assert_eq!(engine.pools()[0].deposit_amount, 900);
        assert_eq!(engine.pools()[0].pending_withdrawal_amount, 0);
        assert!(engine.withdrawal_request(id).is_none());
        assert!(matches!(
            engine.complete_withdrawal(id, WITHDRAWAL_DELAY),
            Err(BastionError::NotFound(_))
        ));
    }

    #[test]
    fn test_loss_after_queue_dilutes_payout() {
        let f = Fixture::new();
        let mut engine = f.engine();
        f.deposit(&mut engine, f.alice, 1_000, 0);
        let id = queue(&mut engine, f.alice, 100, 0);

        f.detector.set_state(DetectorState::Triggered);
        engine.fire(&f.detector, 1).unwrap();
        assert!(matches!(
            engine.complete_withdrawal(id, WITHDRAWAL_DELAY),
            Err(BastionError::InvalidState(_))
        ));
        lose(&f, &mut engine, 200, 2);

        assert_eq!(engine.preview_withdrawal(id).unwrap(), 80);
        assert_eq!(engine.complete_withdrawal(id, WITHDRAWAL_DELAY).unwrap(), 80);
        assert_eq!(engine.pools()[0].deposit_amount, 720);
        assert_eq!(engine.pools()[0].pending_withdrawal_amount, 0);
    }

    #[test]
    fn test_queue_rejected_while_triggered() {
        let f = Fixture::new();
        let mut engine = f.engine();
        f.deposit(&mut engine, f.alice, 1_000, 0);
        f.detector.set_state(DetectorState::Triggered);
        engine.fire(&f.detector, 1).unwrap();
        let err = engine
            .queue_withdrawal(&engine.caller(f.alice), PoolId(0), 10, f.alice, f.alice, 2)
            .unwrap_err();
        assert!(matches!(err, BastionError::InvalidState(_)));
    }

    #[test]
    fn test_paused_withdrawal_pays_immediately() {
        let f = Fixture::new();
        let mut engine = f.engine();
        f.deposit(&mut engine, f.alice, 1_000, 0);
        engine.pause(&engine.caller(f.guardian), 1).unwrap();
        let before = f.bank.balance_of(&f.asset, &f.alice).unwrap();

        let (id, owed) = engine
            .queue_withdrawal(&engine.caller(f.alice), PoolId(0), 250, f.alice, f.alice, 2)
            .unwrap();

        assert_eq!(owed, 250);
        assert!(engine.withdrawal_request(id).is_none());
        assert_eq!(f.bank.balance_of(&f.asset, &f.alice).unwrap(), before + 250);
        assert_eq!(engine.pools()[0].deposit_amount, 750);
        assert_eq!(engine.pools()[0].pending_withdrawal_amount, 0);
    }

    #[test]
    fn test_paused_with_owed_loss_blocks_withdrawals() {
        let f = Fixture::new();
        let mut engine = f.engine();
        f.deposit(&mut engine, f.alice, 1_000, 0);
        let id = queue(&mut engine, f.alice, 100, 0);
        f.detector.set_state(DetectorState::Triggered);
        engine.fire(&f.detector, 1).unwrap();
        engine.pause(&engine.caller(f.guardian), 2).unwrap();

        let err = engine
            .queue_withdrawal(&engine.caller(f.alice), PoolId(0), 900, f.alice, f.alice, 3)
            .unwrap_err();
        assert!(matches!(err, BastionError::InvalidState(_)));
        assert!(matches!(
            engine.complete_withdrawal(id, WITHDRAWAL_DELAY),
            Err(BastionError::InvalidState(_))
        ));
        assert_eq!(engine.pools()[0].deposit_amount, 1_000);
        assert_eq!(engine.pools()[0].claim_token.balance_of(&f.alice), 900);

        engine.unpause(&engine.caller(f.guardian), 4).unwrap();
        lose(&f, &mut engine, 200, 5);
        assert_eq!(engine.complete_withdrawal(id, WITHDRAWAL_DELAY).unwrap(), 80);
    }

    #[test]
    fn test_fire_while_paused_blocks_withdrawals() {
        let f = Fixture::new();
        let mut engine = f.engine();
        f.deposit(&mut engine, f.alice, 1_000, 0);
        engine.pause(&engine.caller(f.guardian), 1).unwrap();
        f.detector.set_state(DetectorState::Triggered);
        engine.fire(&f.detector, 2).unwrap();
        assert_eq!(engine.state(), ModuleState::Paused);

        let err = engine
            .queue_withdrawal(&engine.caller(f.alice), PoolId(0), 1_000, f.alice, f.alice, 3)
            .unwrap_err();
        assert!(matches!(err, BastionError::InvalidState(_)));
        assert_eq!(engine.pools()[0].deposit_amount, 1_000);
    }

    #[test]
    fn test_third_party_withdrawal_needs_allowance() {
        let f = Fixture::new();
        let mut engine = f.engine();
        f.deposit(&mut engine, f.alice, 1_000, 0);

        let err = engine
            .queue_withdrawal(&engine.caller(f.bob), PoolId(0), 10, f.bob, f.alice, 1)
            .unwrap_err();
        assert!(matches!(err, BastionError::InsufficientBalance(_)));

        engine
            .approve_claim_tokens(&engine.caller(f.alice), PoolId(0), f.bob, 10)
            .unwrap();
        let (id, _) = engine
            .queue_withdrawal(&engine.caller(f.bob), PoolId(0), 10, f.bob, f.alice, 1)
            .unwrap();
        assert_eq!(engine.withdrawal_request(id).unwrap().receiver, f.bob);
        assert_eq!(engine.claim_token(PoolId(0)).unwrap().allowance(&f.alice, &f.bob), 0);
    }

    #[test]
    fn test_withdraw_more_than_held_rejected() {
        let f = Fixture::new();
        let mut engine = f.engine();
        f.deposit(&mut engine, f.alice, 100, 0);
        let err = engine
            .queue_withdrawal(&engine.caller(f.alice), PoolId(0), 101, f.alice, f.alice, 1)
            .unwrap_err();
        assert!(matches!(err, BastionError::InsufficientBalance(_)));
        assert_eq!(engine.pools()[0].pending_withdrawal_amount, 0);
    }
}
