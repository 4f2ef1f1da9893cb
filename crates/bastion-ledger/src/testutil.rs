// crates/bastion-ledger/src/testutil.rs
//
// Shared fixture for the engine's unit tests: one module with a single
// pool, a bound detector and funded depositors.

use std::sync::Arc;

use bastion_core::math::Amount;
use bastion_core::{
    AccountId, AssetId, DetectorId, DripModel, InMemoryAssetBank, ModuleId, PoolId,
    StaticDetector,
};

use crate::config::{BindingUpdate, ConfigUpdate, PoolConfig};
use crate::delays::Delays;
use crate::drip::NoDrip;
use crate::engine::Engine;
use crate::roles::Roles;

pub const CONFIG_DELAY: u64 = 1_000;
pub const GRACE: u64 = 500;
pub const WITHDRAWAL_DELAY: u64 = 100;

pub struct Fixture {
    pub bank: Arc<InMemoryAssetBank>,
    pub asset: AssetId,
    pub module_id: ModuleId,
    pub owner: AccountId,
    pub guardian: AccountId,
    pub manager: AccountId,
    pub payout: AccountId,
    pub alice: AccountId,
    pub bob: AccountId,
    pub detector_id: DetectorId,
    pub detector: StaticDetector,
}

impl Fixture {
    pub fn new() -> Self {
        let bank = Arc::new(InMemoryAssetBank::new());
        let asset = AssetId::repeat(0xa1);
        bank.register_asset(asset, 6);
        let detector_id = DetectorId::repeat(0xd1);
        Self {
            bank,
            asset,
            module_id: ModuleId::repeat(0x10),
            owner: AccountId::repeat(0x01),
            guardian: AccountId::repeat(0x02),
            manager: AccountId::repeat(0x03),
            payout: AccountId::repeat(0x04),
            alice: AccountId::repeat(0x0a),
            bob: AccountId::repeat(0x0b),
            detector_id,
            detector: StaticDetector::new(detector_id),
        }
    }

    pub fn config(&self) -> ConfigUpdate {
        ConfigUpdate {
            pools: vec![PoolConfig {
                max_loss_fraction: 5_000,
                asset: self.asset,
            }],
            bindings: vec![BindingUpdate {
                detector: self.detector_id,
                payout_authority: self.payout,
                exists: true,
            }],
            delays: Delays {
                config_update_delay: CONFIG_DELAY,
                config_update_grace_period: GRACE,
                withdrawal_delay: WITHDRAWAL_DELAY,
            },
        }
    }

    pub fn roles(&self) -> Roles {
        Roles {
            owner: self.owner,
            guardian: self.guardian,
            manager: self.manager,
        }
    }

    pub fn engine(&self) -> Engine {
        self.engine_with_drip(Arc::new(NoDrip))
    }

    pub fn engine_with_drip(&self, model: Arc<dyn DripModel>) -> Engine {
        Engine::new(
            self.module_id,
            self.roles(),
            self.config(),
            self.bank.clone(),
            model,
            0,
        )
        .unwrap()
    }

    /// Mint `amount` to `who` and approve the module account to pull it.
    pub fn fund(&self, who: AccountId, amount: Amount) {
        let module_account = AccountId(self.module_id.0);
        self.bank.mint(&self.asset, &who, amount).unwrap();
        let allowance = self.bank.allowance(&self.asset, &who, &module_account);
        self.bank
            .approve(&self.asset, &who, &module_account, allowance + amount);
    }

    /// Fund `who` and deposit into pool 0, minting to `who`.
    pub fn deposit(&self, engine: &mut Engine, who: AccountId, amount: Amount, now: u64) -> Amount {
        self.fund(who, amount);
        engine
            .deposit(&engine.caller(who), PoolId(0), amount, who, now)
            .unwrap()
    }
}
