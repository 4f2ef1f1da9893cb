// crates/bastion-manager/tests/manager_integration.rs
//
// End-to-end tests driving modules through the manager and their mailboxes.

use std::sync::Arc;

use bastion_core::{
    AccountId, AssetBank, AssetId, BastionError, DetectorId, DetectorState, InMemoryAssetBank,
    ModuleId, PoolId, StaticDetector, WAD,
};
use bastion_ledger::{
    BindingUpdate, ConfigUpdate, Delays, DripModelConstantFactor, LossSpec, ModuleState, NoDrip,
    PoolConfig,
};
use bastion_manager::{ManualClock, Manager, ManagerRoles, ModuleHandle};

const MANAGER: AccountId = AccountId([0x4d; 32]);
const MANAGER_OWNER: AccountId = AccountId([0x01; 32]);
const PAUSER: AccountId = AccountId([0x02; 32]);
const DEPLOYER: AccountId = AccountId([0x03; 32]);
const OWNER: AccountId = AccountId([0x11; 32]);
const GUARDIAN: AccountId = AccountId([0x12; 32]);
const PAYOUT: AccountId = AccountId([0x13; 32]);
const ALICE: AccountId = AccountId([0x0a; 32]);
const ASSET: AssetId = AssetId([0xa1; 32]);
const DETECTOR: DetectorId = DetectorId([0xd1; 32]);

struct Setup {
    bank: Arc<InMemoryAssetBank>,
    clock: Arc<ManualClock>,
    manager: Manager,
}

fn setup() -> Setup {
    let bank = Arc::new(InMemoryAssetBank::new());
    bank.register_asset(ASSET, 6);
    let clock = Arc::new(ManualClock::new(1_000));
    let manager = Manager::new(
        ManagerRoles {
            manager: MANAGER,
            owner: MANAGER_OWNER,
            pauser: PAUSER,
        },
        bank.clone(),
        Arc::new(NoDrip),
        clock.clone(),
    );
    Setup {
        bank,
        clock,
        manager,
    }
}

fn config() -> ConfigUpdate {
    ConfigUpdate {
        pools: vec![PoolConfig {
            max_loss_fraction: 5_000,
            asset: ASSET,
        }],
        bindings: vec![BindingUpdate {
            detector: DETECTOR,
            payout_authority: PAYOUT,
            exists: true,
        }],
        delays: Delays {
            config_update_delay: 3_600,
            config_update_grace_period: 600,
            withdrawal_delay: 60,
        },
    }
}

async fn deploy(s: &Setup, salt: u8) -> ModuleHandle {
    s.manager
        .deploy(DEPLOYER, OWNER, GUARDIAN, config(), [salt; 32])
        .await
        .unwrap()
}

async fn fund_and_deposit(s: &Setup, module: &ModuleHandle, amount: u128) {
    let module_account = AccountId(module.module_id().0);
    s.bank.mint(&ASSET, &ALICE, amount).unwrap();
    s.bank.approve(&ASSET, &ALICE, &module_account, amount);
    module.deposit(ALICE, PoolId(0), amount, ALICE).await.unwrap();
}

#[tokio::test]
async fn test_deploy_at_computed_id() {
    let s = setup();
    let module = deploy(&s, 1).await;
    assert_eq!(
        module.module_id(),
        s.manager.compute_module_id(&DEPLOYER, &[1; 32])
    );
    assert_eq!(s.manager.module_ids().await, vec![module.module_id()]);

    let err = s
        .manager
        .deploy(DEPLOYER, OWNER, GUARDIAN, config(), [1; 32])
        .await
        .unwrap_err();
    assert!(matches!(err, BastionError::InvalidConfiguration(_)));
}

#[tokio::test]
async fn test_deploy_rejects_invalid_config() {
    let s = setup();
    let mut bad = config();
    bad.delays.withdrawal_delay = bad.delays.config_update_delay;
    assert!(s
        .manager
        .deploy(DEPLOYER, OWNER, GUARDIAN, bad, [9; 32])
        .await
        .is_err());
    assert!(s.manager.module_ids().await.is_empty());
}

#[tokio::test]
async fn test_unknown_module_not_found() {
    let s = setup();
    let err = s.manager.module(&ModuleId::repeat(0xff)).await.unwrap_err();
    assert!(matches!(err, BastionError::NotFound(_)));
}

#[tokio::test]
async fn test_withdrawal_through_mailbox_respects_clock() {
    let s = setup();
    let module = deploy(&s, 1).await;
    fund_and_deposit(&s, &module, 1_000).await;

    let (id, owed) = module
        .queue_withdrawal(ALICE, PoolId(0), 400, ALICE, ALICE)
        .await
        .unwrap();
    assert_eq!(owed, 400);

    let err = module.complete_withdrawal(id).await.unwrap_err();
    assert!(matches!(err, BastionError::DelayNotElapsed(_)));

    s.clock.advance(60);
    assert_eq!(module.complete_withdrawal(id).await.unwrap(), 400);
    assert_eq!(s.bank.balance_of(&ASSET, &ALICE).unwrap(), 400);
    assert_eq!(module.claim_balance(PoolId(0), ALICE).await.unwrap(), 600);
}

#[tokio::test]
async fn test_loss_flow_through_mailbox() {
    let s = setup();
    let module = deploy(&s, 1).await;
    fund_and_deposit(&s, &module, 1_000).await;
    let (id, _) = module
        .queue_withdrawal(ALICE, PoolId(0), 100, ALICE, ALICE)
        .await
        .unwrap();

    let detector = Arc::new(StaticDetector::new(DETECTOR));
    detector.set_state(DetectorState::Triggered);
    module.fire(detector.clone()).await.unwrap();
    assert_eq!(module.status().await.unwrap(), (ModuleState::Triggered, 1));
    assert_eq!(module.entitlement(PAYOUT).await.unwrap(), 1);

    module
        .apply_loss(
            PAYOUT,
            vec![LossSpec {
                pool_id: PoolId(0),
                amount: 200,
            }],
            PAYOUT,
        )
        .await
        .unwrap();
    assert_eq!(module.status().await.unwrap(), (ModuleState::Active, 0));
    assert_eq!(s.bank.balance_of(&ASSET, &PAYOUT).unwrap(), 200);

    s.clock.advance(60);
    assert_eq!(module.preview_withdrawal(id).await.unwrap(), 80);
    assert_eq!(module.complete_withdrawal(id).await.unwrap(), 80);
}

#[tokio::test]
async fn test_config_update_through_mailbox() {
    let s = setup();
    let module = deploy(&s, 1).await;
    let mut update = config();
    update.pools[0].max_loss_fraction = 2_500;

    let meta = module.queue_config_update(OWNER, update.clone()).await.unwrap();
    assert_eq!(meta.update_earliest_time, 1_000 + 3_600);

    let err = module.finalize_config_update(update.clone()).await.unwrap_err();
    assert!(matches!(err, BastionError::InvalidTimestamp(_)));

    s.clock.set(meta.update_earliest_time);
    module.finalize_config_update(update).await.unwrap();
    assert_eq!(module.pool(PoolId(0)).await.unwrap().max_loss_fraction, 2_500);
}

#[tokio::test]
async fn test_batch_pause_and_unpause() {
    let s = setup();
    let a = deploy(&s, 1).await;
    let b = deploy(&s, 2).await;
    let ids = [a.module_id(), b.module_id()];

    let err = s.manager.pause_modules(ALICE, &ids).await.unwrap_err();
    assert!(matches!(err, BastionError::Unauthorized(_)));

    s.manager.pause_modules(PAUSER, &ids).await.unwrap();
    assert_eq!(a.status().await.unwrap().0, ModuleState::Paused);
    assert_eq!(b.status().await.unwrap().0, ModuleState::Paused);

    // Only the owner may unpause in batch.
    let err = s.manager.unpause_modules(PAUSER, &ids).await.unwrap_err();
    assert!(matches!(err, BastionError::Unauthorized(_)));
    s.manager.unpause_modules(MANAGER_OWNER, &ids).await.unwrap();
    assert_eq!(a.status().await.unwrap().0, ModuleState::Active);
    assert_eq!(b.status().await.unwrap().0, ModuleState::Active);
}

#[tokio::test]
async fn test_drip_override_and_claim_fees() {
    let s = setup();
    let module = deploy(&s, 1).await;
    fund_and_deposit(&s, &module, 1_000).await;
    let id = module.module_id();

    let err = s
        .manager
        .set_drip_model_override(PAUSER, id, Some(Arc::new(DripModelConstantFactor(WAD / 10))))
        .await
        .unwrap_err();
    assert!(matches!(err, BastionError::Unauthorized(_)));

    s.manager
        .set_drip_model_override(
            MANAGER_OWNER,
            id,
            Some(Arc::new(DripModelConstantFactor(WAD / 10))),
        )
        .await
        .unwrap();

    s.clock.advance(10);
    let receiver = AccountId::repeat(0x77);
    let claimed = s
        .manager
        .claim_fees(MANAGER_OWNER, &[id], receiver)
        .await
        .unwrap();
    assert_eq!(claimed, vec![(id, vec![(PoolId(0), 100)])]);
    assert_eq!(s.bank.balance_of(&ASSET, &receiver).unwrap(), 100);

    // Clearing the override falls back to the default (no drip).
    s.manager
        .set_drip_model_override(MANAGER_OWNER, id, None)
        .await
        .unwrap();
    s.clock.advance(10);
    module.drip_fees().await.unwrap();
    assert_eq!(module.pool(PoolId(0)).await.unwrap().fee_amount, 0);
}

#[tokio::test]
async fn test_snapshot_restore_keeps_state() {
    let s = setup();
    let module = deploy(&s, 1).await;
    fund_and_deposit(&s, &module, 500).await;

    let snapshot = module.snapshot().await.unwrap();
    let restored = s.manager.restore(snapshot).await.unwrap();
    assert_eq!(restored.module_id(), module.module_id());
    assert_eq!(restored.pool(PoolId(0)).await.unwrap().deposit_amount, 500);
    assert_eq!(s.manager.module_ids().await.len(), 1);
    assert_eq!(s.manager.snapshot_all().await.unwrap().len(), 1);
}
