// crates/bastion-core/src/asset.rs
//
// In-memory implementations of the external boundaries: an asset bank
// holding balances and allowances for any number of assets, and a
// settable loss-detector.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::BastionError;
use crate::identity::{AccountId, AssetId, DetectorId};
use crate::math::Amount;
use crate::traits::{AssetBank, DetectorState, LossDetector};

#[derive(Default)]
struct BankState {
    decimals: HashMap<AssetId, u8>,
    balances: HashMap<(AssetId, AccountId), Amount>,
    allowances: HashMap<(AssetId, AccountId, AccountId), Amount>,
}

impl BankState {
    fn ensure_asset(&self, asset: &AssetId) -> Result<(), BastionError> {
        if self.decimals.contains_key(asset) {
            Ok(())
        } else {
            Err(BastionError::Asset(format!("Unknown asset {}", asset)))
        }
    }

    fn move_balance(
        &mut self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), BastionError> {
        let from_balance = self.balances.get(&(*asset, *from)).copied().unwrap_or(0);
        if from_balance < amount {
            return Err(BastionError::Asset(format!(
                "Insufficient {} balance for {}: has {}, needs {}",
                asset, from, from_balance, amount
            )));
        }
        self.balances.insert((*asset, *from), from_balance - amount);
        let to_balance = self.balances.entry((*asset, *to)).or_insert(0);
        *to_balance = to_balance.saturating_add(amount);
        Ok(())
    }
}

/// Thread-safe in-memory asset bank, shared between modules via `Arc`.
#[derive(Default)]
pub struct InMemoryAssetBank {
    state: Mutex<BankState>,
}

/// Serializable contents of an [`InMemoryAssetBank`], sorted so the same
/// bank always produces the same snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBankState {
    pub assets: Vec<(AssetId, u8)>,
    pub balances: Vec<(AssetId, AccountId, Amount)>,
    pub allowances: Vec<(AssetId, AccountId, AccountId, Amount)>,
}

impl InMemoryAssetBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset so it can be held and transferred.
    pub fn register_asset(&self, asset: AssetId, decimals: u8) {
        self.state.lock().decimals.insert(asset, decimals);
    }

    /// Credit `amount` of `asset` to `to` out of thin air (faucet for
    /// fixtures and local deployments).
    pub fn mint(&self, asset: &AssetId, to: &AccountId, amount: Amount) -> Result<(), BastionError> {
        let mut state = self.state.lock();
        state.ensure_asset(asset)?;
        let balance = state.balances.entry((*asset, *to)).or_insert(0);
        *balance = balance.saturating_add(amount);
        Ok(())
    }

    /// Set the allowance `owner` grants `spender` for `asset`.
    pub fn approve(&self, asset: &AssetId, owner: &AccountId, spender: &AccountId, amount: Amount) {
        self.state
            .lock()
            .allowances
            .insert((*asset, *owner, *spender), amount);
    }

    pub fn allowance(&self, asset: &AssetId, owner: &AccountId, spender: &AccountId) -> Amount {
        self.state
            .lock()
            .allowances
            .get(&(*asset, *owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    /// Rebuild a bank from [`InMemoryAssetBank::snapshot`] output.
    pub fn from_state(snapshot: AssetBankState) -> Self {
        let state = BankState {
            decimals: snapshot.assets.into_iter().collect(),
            balances: snapshot
                .balances
                .into_iter()
                .map(|(asset, account, amount)| ((asset, account), amount))
                .collect(),
            allowances: snapshot
                .allowances
                .into_iter()
                .map(|(asset, owner, spender, amount)| ((asset, owner, spender), amount))
                .collect(),
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Copy of every registered asset, non-zero balance and allowance.
    pub fn snapshot(&self) -> AssetBankState {
        let state = self.state.lock();
        let mut assets: Vec<(AssetId, u8)> =
            state.decimals.iter().map(|(a, d)| (*a, *d)).collect();
        let mut balances: Vec<(AssetId, AccountId, Amount)> = state
            .balances
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|((asset, account), amount)| (*asset, *account, *amount))
            .collect();
        let mut allowances: Vec<(AssetId, AccountId, AccountId, Amount)> = state
            .allowances
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|((asset, owner, spender), amount)| (*asset, *owner, *spender, *amount))
            .collect();
        assets.sort();
        balances.sort();
        allowances.sort();
        AssetBankState {
            assets,
            balances,
            allowances,
        }
    }
}

impl AssetBank for InMemoryAssetBank {
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> Result<Amount, BastionError> {
        let state = self.state.lock();
        state.ensure_asset(asset)?;
        Ok(state.balances.get(&(*asset, *account)).copied().unwrap_or(0))
    }

    fn transfer(
        &self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), BastionError> {
        let mut state = self.state.lock();
        state.ensure_asset(asset)?;
        state.move_balance(asset, from, to, amount)
    }

    fn transfer_from(
        &self,
        asset: &AssetId,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), BastionError> {
        let mut state = self.state.lock();
        state.ensure_asset(asset)?;
        let allowance = state
            .allowances
            .get(&(*asset, *from, *spender))
            .copied()
            .unwrap_or(0);
        if allowance < amount {
            return Err(BastionError::Asset(format!(
                "Insufficient {} allowance from {} to {}: {} < {}",
                asset, from, spender, allowance, amount
            )));
        }
        state.move_balance(asset, from, to, amount)?;
        state
            .allowances
            .insert((*asset, *from, *spender), allowance - amount);
        Ok(())
    }

    fn decimals(&self, asset: &AssetId) -> Result<u8, BastionError> {
        self.state
            .lock()
            .decimals
            .get(asset)
            .copied()
            .ok_or_else(|| BastionError::Asset(format!("Unknown asset {}", asset)))
    }
}

/// A loss-detector whose state is set by hand.
#[derive(Debug)]
pub struct StaticDetector {
    id: DetectorId,
    state: Mutex<DetectorState>,
}

impl StaticDetector {
    pub fn new(id: DetectorId) -> Self {
        Self {
            id,
            state: Mutex::new(DetectorState::Active),
        }
    }

    pub fn set_state(&self, state: DetectorState) {
        *self.state.lock() = state;
    }
}

impl LossDetector for StaticDetector {
    fn id(&self) -> DetectorId {
        self.id
    }

    fn state(&self) -> DetectorState {
        *self.state.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc() -> AssetId {
        AssetId::repeat(0xa1)
    }

    #[test]
    fn test_mint_and_transfer() {
        let bank = InMemoryAssetBank::new();
        bank.register_asset(usdc(), 6);
        let alice = AccountId::repeat(1);
        let bob = AccountId::repeat(2);

        bank.mint(&usdc(), &alice, 100).unwrap();
        bank.transfer(&usdc(), &alice, &bob, 40).unwrap();

        assert_eq!(bank.balance_of(&usdc(), &alice).unwrap(), 60);
        assert_eq!(bank.balance_of(&usdc(), &bob).unwrap(), 40);
        assert_eq!(bank.decimals(&usdc()).unwrap(), 6);
    }

    #[test]
    fn test_transfer_insufficient_balance_leaves_state() {
        let bank = InMemoryAssetBank::new();
        bank.register_asset(usdc(), 6);
        let alice = AccountId::repeat(1);
        bank.mint(&usdc(), &alice, 10).unwrap();

        assert!(bank.transfer(&usdc(), &alice, &AccountId::repeat(2), 11).is_err());
        assert_eq!(bank.balance_of(&usdc(), &alice).unwrap(), 10);
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let bank = InMemoryAssetBank::new();
        bank.register_asset(usdc(), 6);
        let alice = AccountId::repeat(1);
        let module = AccountId::repeat(9);
        bank.mint(&usdc(), &alice, 100).unwrap();

        assert!(bank.transfer_from(&usdc(), &module, &alice, &module, 50).is_err());

        bank.approve(&usdc(), &alice, &module, 70);
        bank.transfer_from(&usdc(), &module, &alice, &module, 50).unwrap();
        assert_eq!(bank.allowance(&usdc(), &alice, &module), 20);
        assert_eq!(bank.balance_of(&usdc(), &module).unwrap(), 50);
    }

    #[test]
    fn test_snapshot_rebuilds_balances_and_allowances() {
        let bank = InMemoryAssetBank::new();
        bank.register_asset(usdc(), 6);
        let alice = AccountId::repeat(1);
        let module = AccountId::repeat(9);
        bank.mint(&usdc(), &alice, 100).unwrap();
        bank.approve(&usdc(), &alice, &module, 30);
        bank.transfer(&usdc(), &alice, &module, 100).unwrap();

        let json = serde_json::to_string(&bank.snapshot()).unwrap();
        let state: AssetBankState = serde_json::from_str(&json).unwrap();
        let rebuilt = InMemoryAssetBank::from_state(state);

        assert_eq!(rebuilt.balance_of(&usdc(), &module).unwrap(), 100);
        assert_eq!(rebuilt.balance_of(&usdc(), &alice).unwrap(), 0);
        assert_eq!(rebuilt.allowance(&usdc(), &alice, &module), 30);
        assert_eq!(rebuilt.decimals(&usdc()).unwrap(), 6);
        assert_eq!(rebuilt.snapshot(), bank.snapshot());
    }

    #[test]
    fn test_unknown_asset_rejected() {
        let bank = InMemoryAssetBank::new();
        assert!(bank.mint(&usdc(), &AccountId::repeat(1), 1).is_err());
        assert!(bank.decimals(&usdc()).is_err());
    }

    #[test]
    fn test_static_detector_state() {
        let detector = StaticDetector::new(DetectorId::repeat(3));
        assert_eq!(detector.state(), DetectorState::Active);
        detector.set_state(DetectorState::Triggered);
        assert_eq!(detector.state(), DetectorState::Triggered);
        assert_eq!(detector.id(), DetectorId::repeat(3));
    }
}
