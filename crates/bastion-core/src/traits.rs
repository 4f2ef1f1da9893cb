// crates/bastion-core/src/traits.rs

use serde::{Deserialize, Serialize};

use crate::error::BastionError;
use crate::identity::{AccountId, AssetId, DetectorId};
use crate::math::Amount;

/// Trait for the transferable-asset boundary.
///
/// Implementations may fail or run hooks on any call; the engine checks
/// every result and never assumes a transfer succeeded.
/// Implemented by `InMemoryAssetBank` for the daemon and tests.
pub trait AssetBank: Send + Sync {
    /// Balance of `account` in `asset`.
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> Result<Amount, BastionError>;

    /// Move `amount` of `asset` from `from` (the acting account) to `to`.
    fn transfer(
        &self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), BastionError>;

    /// Move `amount` of `asset` from `from` to `to` on behalf of `spender`,
    /// consuming `spender`'s allowance.
    fn transfer_from(
        &self,
        asset: &AssetId,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), BastionError>;

    /// Number of decimals of the smallest unit of `asset`.
    fn decimals(&self, asset: &AssetId) -> Result<u8, BastionError>;
}

/// State reported by an external loss-detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorState {
    /// No loss detected.
    Active,
    /// A loss event has been detected and may be fired against bound modules.
    Triggered,
    /// The detector is frozen pending resolution; it cannot be fired.
    Frozen,
}

/// Trait for the loss-detector boundary.
///
/// The engine reads the state only when `fire` is invoked for the detector.
pub trait LossDetector: Send + Sync {
    fn id(&self) -> DetectorId;

    fn state(&self) -> DetectorState;
}

/// Trait for the fee drip model.
///
/// Returns a WAD-scaled fraction of the drippable deposits to move into
/// the fee bucket. Values above one WAD are rejected by the engine.
pub trait DripModel: Send + Sync + std::fmt::Debug {
    fn drip_factor(&self, last_drip_time: u64, elapsed: u64, deposit_amount: Amount) -> u128;
}
