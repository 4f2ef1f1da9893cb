// crates/bastion-ledger/src/pool.rs
//
// Reserve pool bookkeeping and the per-pool dilution accumulator.
//
// A pool's deposits back its claim tokens. Part of the deposits may be
// reserved for queued withdrawals (`pending_withdrawal_amount`); the rest
// is "available" and defines the claim-token exchange rate:
//
//   claim_amount = asset_amount * claim_supply / (deposit - pending)
//   asset_amount = claim_amount * (deposit - pending) / claim_supply
//
// Invariant: deposit_amount >= pending_withdrawal_amount.

use serde::{Deserialize, Serialize};

use bastion_core::math::{mul_div_down, mul_wad_down, Amount, WAD};
use bastion_core::{AssetId, ClaimToken};

/// One loss event recorded against a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DilutionEntry {
    /// WAD-scaled fraction of the deposits that survived the loss.
    pub retained: u128,
    /// Product of every `retained` up to and including this entry.
    pub cumulative: u128,
}

/// Append-only record of the losses a pool has absorbed.
///
/// A withdrawal request snapshots `len()` when queued; at completion every
/// entry appended after that index is compounded, in order, against the
/// amount the request is owed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DilutionAccumulator {
    entries: Vec<DilutionEntry>,
}

impl DilutionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DilutionEntry] {
        &self.entries
    }

    /// Running product after the latest loss, or one WAD if none occurred.
    pub fn latest_value(&self) -> u128 {
        self.entries.last().map_or(WAD, |e| e.cumulative)
    }

    /// Record a loss that kept `retained` (WAD-scaled) of the deposits.
    pub fn push(&mut self, retained: u128) {
        let retained = retained.min(WAD);
        let cumulative = mul_wad_down(self.latest_value(), retained);
        self.entries.push(DilutionEntry {
            retained,
            cumulative,
        });
    }

    /// Compound every entry from `since` onward against `amount`.
    ///
    /// An empty range (`since >= len()`) leaves the amount untouched.
    pub fn dilute(&self, since: usize, amount: Amount) -> Amount {
        self.entries
            .iter()
            .skip(since)
            .fold(amount, |acc, e| mul_wad_down(acc, e.retained))
    }
}

/// Bookkeeping for a single segregated pool of one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservePool {
    /// The asset held by this pool. Fixed once the pool exists.
    pub asset: AssetId,
    /// Total deposits, including the amount reserved for pending withdrawals.
    pub deposit_amount: Amount,
    /// Portion of `deposit_amount` reserved for queued withdrawal requests.
    pub pending_withdrawal_amount: Amount,
    /// Fees dripped out of deposits and not yet claimed.
    pub fee_amount: Amount,
    /// Largest fraction (ZOC-scaled) of deposits a single loss call may take.
    pub max_loss_fraction: u16,
    /// Last time fees were dripped from this pool.
    pub last_fee_drip_time: u64,
    /// Number of withdrawal requests still holding a reservation.
    pub pending_request_count: u64,
    /// Proportional-ownership token for this pool's depositors.
    pub claim_token: ClaimToken,
    /// Losses absorbed by this pool, in order.
    pub dilution: DilutionAccumulator,
}

impl ReservePool {
    /// Create an empty pool.
    pub fn new(asset: AssetId, max_loss_fraction: u16, claim_token: ClaimToken, now: u64) -> Self {
        Self {
            asset,
            deposit_amount: 0,
            pending_withdrawal_amount: 0,
            fee_amount: 0,
            max_loss_fraction,
            last_fee_drip_time: now,
            pending_request_count: 0,
            claim_token,
            dilution: DilutionAccumulator::new(),
        }
    }

    /// Deposits not reserved for pending withdrawals.
    pub fn available_amount(&self) -> Amount {
        self.deposit_amount - self.pending_withdrawal_amount
    }

    /// Claim tokens `asset_amount` is worth when `fee_due` is still to be
    /// dripped. The first deposit mints 1:1.
    pub fn claim_amount_for(&self, asset_amount: Amount, fee_due: Amount) -> Amount {
        let supply = self.claim_token.total_supply();
        if supply == 0 {
            return asset_amount;
        }
        let available = self.available_amount().saturating_sub(fee_due).max(1);
        mul_div_down(asset_amount, supply, available).unwrap_or(Amount::MAX)
    }

    /// Assets `claim_amount` is worth when `fee_due` is still to be dripped.
    pub fn asset_amount_for(&self, claim_amount: Amount, fee_due: Amount) -> Amount {
        let supply = self.claim_token.total_supply();
        if supply == 0 {
            return 0;
        }
        let available = self.available_amount().saturating_sub(fee_due);
        mul_div_down(claim_amount, available, supply).unwrap_or(0)
    }

    /// Move a computed drip out of deposits into the fee bucket.
    pub(crate) fn apply_drip(&mut self, fee: Amount, now: u64) {
        self.deposit_amount -= fee;
        self.fee_amount += fee;
        self.last_fee_drip_time = self.last_fee_drip_time.max(now);
    }

    /// Remove `amount` from deposits as a loss, diluting the pending
    /// reservation by the same retained fraction and recording the loss.
    pub(crate) fn apply_loss(&mut self, amount: Amount) {
        if amount == 0 || self.deposit_amount == 0 {
            return;
        }
        let remaining = self.deposit_amount - amount;
        let retained = mul_div_down(remaining, WAD, self.deposit_amount).unwrap_or(0);
        self.deposit_amount = remaining;
        self.pending_withdrawal_amount = mul_wad_down(self.pending_withdrawal_amount, retained);
        self.dilution.push(retained);
    }

    /// Release the reservation of a completed request that paid `payout`.
    pub(crate) fn release_withdrawal(&mut self, payout: Amount) {
        self.deposit_amount -= payout;
        self.pending_withdrawal_amount = self.pending_withdrawal_amount.saturating_sub(payout);
        self.pending_request_count = self.pending_request_count.saturating_sub(1);
        if self.pending_request_count == 0 {
            // Rounding dust from diluted reservations goes back to depositors.
            self.pending_withdrawal_amount = 0;
        }
    }

    pub(crate) fn holds_invariant(&self) -> bool {
        self.pending_withdrawal_amount <= self.deposit_amount
    }
}
