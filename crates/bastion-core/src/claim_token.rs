// crates/bastion-core/src/claim_token.rs
//
// Claim token: a fungible, proportional-ownership token for one reserve
// pool, keyed by (module, pool). The owning engine is its only minter and
// burner; holders may transfer and approve like any fungible token.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BastionError;
use crate::identity::{AccountId, ModuleId, PoolId};
use crate::math::Amount;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimToken {
    module: ModuleId,
    pool: PoolId,
    total_supply: Amount,
    balances: BTreeMap<AccountId, Amount>,
    /// owner -> spender -> remaining allowance
    allowances: BTreeMap<AccountId, BTreeMap<AccountId, Amount>>,
}

impl ClaimToken {
    pub fn new(module: ModuleId, pool: PoolId) -> Self {
        Self {
            module,
            pool,
            total_supply: 0,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Mint new claim tokens. Only the owning engine calls this.
    pub fn mint(&mut self, to: &AccountId, amount: Amount) -> Result<(), BastionError> {
        let supply = self.total_supply.checked_add(amount).ok_or_else(|| {
            BastionError::InvalidState(format!("Claim token supply overflow on {}", self.pool))
        })?;
        self.total_supply = supply;
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }

    /// Burn claim tokens held by `from`. Only the owning engine calls this.
    pub fn burn(&mut self, from: &AccountId, amount: Amount) -> Result<(), BastionError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(BastionError::InsufficientBalance(format!(
                "{} holds {} claim tokens of {}, cannot burn {}",
                from, balance, self.pool, amount
            )));
        }
        self.set_balance(from, balance - amount);
        self.total_supply -= amount;
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), BastionError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(BastionError::InsufficientBalance(format!(
                "{} holds {} claim tokens of {}, cannot transfer {}",
                from, balance, self.pool, amount
            )));
        }
        self.set_balance(from, balance - amount);
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }

    pub fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: Amount) {
        self.allowances
            .entry(*owner)
            .or_default()
            .insert(*spender, amount);
    }

    /// Consume `amount` of the allowance `owner` granted `spender`.
    /// An allowance of `Amount::MAX` is treated as unlimited.
    pub fn spend_allowance(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), BastionError> {
        let allowance = self.allowance(owner, spender);
        if allowance == Amount::MAX {
            return Ok(());
        }
        if allowance < amount {
            return Err(BastionError::InsufficientBalance(format!(
                "{} allowed {} to spend {} claim tokens of {}, needs {}",
                owner, spender, allowance, self.pool, amount
            )));
        }
        self.approve(owner, spender, allowance - amount);
        Ok(())
    }

    fn set_balance(&mut self, account: &AccountId, amount: Amount) {
        if amount == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(*account, amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> ClaimToken {
        ClaimToken::new(ModuleId::repeat(1), PoolId(0))
    }

    #[test]
    fn test_mint_and_burn_track_supply() {
        let mut t = token();
        let alice = AccountId::repeat(1);
        t.mint(&alice, 100).unwrap();
        assert_eq!(t.total_supply(), 100);
        t.burn(&alice, 30).unwrap();
        assert_eq!(t.total_supply(), 70);
        assert_eq!(t.balance_of(&alice), 70);
    }

    #[test]
    fn test_burn_more_than_balance_fails() {
        let mut t = token();
        let alice = AccountId::repeat(1);
        t.mint(&alice, 10).unwrap();
        assert!(t.burn(&alice, 11).is_err());
        assert_eq!(t.total_supply(), 10);
    }

    #[test]
    fn test_transfer() {
        let mut t = token();
        let alice = AccountId::repeat(1);
        let bob = AccountId::repeat(2);
        t.mint(&alice, 10).unwrap();
        t.transfer(&alice, &bob, 10).unwrap();
        assert_eq!(t.balance_of(&alice), 0);
        assert_eq!(t.balance_of(&bob), 10);
        assert_eq!(t.total_supply(), 10);
    }

    #[test]
    fn test_spend_allowance() {
        let mut t = token();
        let alice = AccountId::repeat(1);
        let bob = AccountId::repeat(2);
        assert!(t.spend_allowance(&alice, &bob, 1).is_err());

        t.approve(&alice, &bob, 5);
        t.spend_allowance(&alice, &bob, 3).unwrap();
        assert_eq!(t.allowance(&alice, &bob), 2);

        t.approve(&alice, &bob, Amount::MAX);
        t.spend_allowance(&alice, &bob, 1_000).unwrap();
        assert_eq!(t.allowance(&alice, &bob), Amount::MAX);
    }
}
