// crates/bastion-ledger/src/engine.rs
//
// The safety module engine: one instance owns the pools, bindings,
// withdrawal requests and pending config update of a single module.
//
// Operations are split by concern across `configurator`, `lifecycle`,
// `ledger`, `withdrawal` and `drip`. Every operation validates and performs
// its external transfers before it mutates, so a failed call leaves the
// engine untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use bastion_core::math::Amount;
use bastion_core::{
    AccountId, AssetBank, AssetId, BastionError, ClaimToken, DetectorId, DripModel, ModuleId,
    PoolId, RequestId,
};

use crate::config::{ConfigUpdate, ConfigUpdateMetadata};
use crate::delays::Delays;
use crate::lifecycle::{LossBinding, ModuleState};
use crate::pool::ReservePool;
use crate::roles::{Caller, Roles};
use crate::withdrawal::WithdrawalRequest;

/// Serializable state of one module instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub(crate) module_id: ModuleId,
    pub(crate) roles: Roles,
    pub(crate) state: ModuleState,
    pub(crate) pending_loss_count: u64,
    pub(crate) delays: Delays,
    pub(crate) config_update: ConfigUpdateMetadata,
    pub(crate) pools: Vec<ReservePool>,
    pub(crate) bindings: BTreeMap<DetectorId, LossBinding>,
    /// Loss events each payout authority may still apply.
    pub(crate) entitlements: BTreeMap<AccountId, u64>,
    pub(crate) requests: BTreeMap<RequestId, WithdrawalRequest>,
    pub(crate) next_request_id: u64,
}

impl EngineState {
    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }
}

/// A running module instance bound to its external collaborators.
pub struct Engine {
    pub(crate) inner: EngineState,
    pub(crate) assets: Arc<dyn AssetBank>,
    pub(crate) drip_model: Arc<dyn DripModel>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("module_id", &self.inner.module_id)
            .field("state", &self.inner.state)
            .field("pools", &self.inner.pools.len())
            .field("drip_model", &self.drip_model)
            .finish()
    }
}

impl Engine {
    /// Create a module from its initial configuration. The configuration is
    /// applied immediately; later changes go through the configurator.
    pub fn new(
        module_id: ModuleId,
        roles: Roles,
        initial: ConfigUpdate,
        assets: Arc<dyn AssetBank>,
        drip_model: Arc<dyn DripModel>,
        now: u64,
    ) -> Result<Self, BastionError> {
        initial.validate_generic()?;

        let mut engine = Self {
            inner: EngineState {
                module_id,
                roles,
                state: ModuleState::Active,
                pending_loss_count: 0,
                delays: initial.delays,
                config_update: ConfigUpdateMetadata::default(),
                pools: Vec::new(),
                bindings: BTreeMap::new(),
                entitlements: BTreeMap::new(),
                requests: BTreeMap::new(),
                next_request_id: 0,
            },
            assets,
            drip_model,
        };
        engine.apply_config(&initial, now);

        tracing::info!(
            "Module {} created with {} pools and {} bindings",
            module_id,
            engine.inner.pools.len(),
            engine.inner.bindings.len()
        );
        Ok(engine)
    }

    /// Rebuild a module from a snapshot taken with [`Engine::snapshot`].
    pub fn restore(
        snapshot: EngineState,
        assets: Arc<dyn AssetBank>,
        drip_model: Arc<dyn DripModel>,
    ) -> Result<Self, BastionError> {
        if let Some(i) = snapshot.pools.iter().position(|p| !p.holds_invariant()) {
            return Err(BastionError::InvalidState(format!(
                "Snapshot pool {} has pending withdrawals above deposits",
                i
            )));
        }
        let triggered = snapshot.state == ModuleState::Triggered;
        if snapshot.state != ModuleState::Paused && triggered != (snapshot.pending_loss_count > 0) {
            return Err(BastionError::InvalidState(format!(
                "Snapshot state {} disagrees with {} pending losses",
                snapshot.state, snapshot.pending_loss_count
            )));
        }
        let engine = Self {
            inner: snapshot,
            assets,
            drip_model,
        };

        // Every pool's deposits and fees must still be held by the module.
        let mut backing: HashMap<AssetId, Amount> = HashMap::new();
        for pool in &engine.inner.pools {
            let total = backing.entry(pool.asset).or_insert(0);
            *total = total
                .saturating_add(pool.deposit_amount)
                .saturating_add(pool.fee_amount);
        }
        engine.require_module_holds(&backing, "restore")?;
        Ok(engine)
    }

    /// Copy of the full module state, suitable for persistence.
    pub fn snapshot(&self) -> EngineState {
        self.inner.clone()
    }

    // ---------------------------------------------------------------
    // Views
    // ---------------------------------------------------------------

    pub fn module_id(&self) -> ModuleId {
        self.inner.module_id
    }

    /// The account holding this module's assets at the asset boundary.
    pub fn module_account(&self) -> AccountId {
        AccountId(self.inner.module_id.0)
    }

    pub fn roles(&self) -> &Roles {
        &self.inner.roles
    }

    /// Build the capability context for `account` against this module's roles.
    pub fn caller(&self, account: AccountId) -> Caller {
        self.inner.roles.caller(self.inner.module_id, account)
    }

    pub fn state(&self) -> ModuleState {
        self.inner.state
    }

    pub fn pending_loss_count(&self) -> u64 {
        self.inner.pending_loss_count
    }

    pub fn delays(&self) -> Delays {
        self.inner.delays
    }

    pub fn config_update_metadata(&self) -> ConfigUpdateMetadata {
        self.inner.config_update
    }

    pub fn pools(&self) -> &[ReservePool] {
        &self.inner.pools
    }

    pub fn pool(&self, pool_id: PoolId) -> Result<&ReservePool, BastionError> {
        self.inner
            .pools
            .get(pool_id.index())
            .ok_or_else(|| BastionError::NotFound(format!("Reserve pool {}", pool_id)))
    }

    pub fn claim_token(&self, pool_id: PoolId) -> Result<&ClaimToken, BastionError> {
        Ok(&self.pool(pool_id)?.claim_token)
    }

    pub fn binding(&self, detector: &DetectorId) -> Option<&LossBinding> {
        self.inner.bindings.get(detector)
    }

    /// Loss events `account` may still apply.
    pub fn entitlement(&self, account: &AccountId) -> u64 {
        self.inner.entitlements.get(account).copied().unwrap_or(0)
    }

    pub fn withdrawal_request(&self, request_id: RequestId) -> Option<&WithdrawalRequest> {
        self.inner.requests.get(&request_id)
    }

    pub fn drip_model(&self) -> Arc<dyn DripModel> {
        self.drip_model.clone()
    }

    /// Replace the drip model used for ordinary drips. Manager only.
    pub fn set_drip_model(
        &mut self,
        caller: &Caller,
        model: Arc<dyn DripModel>,
    ) -> Result<(), BastionError> {
        self.authorize(caller)?;
        caller.require_manager()?;
        tracing::info!("Module {} drip model set to {:?}", self.inner.module_id, model);
        self.drip_model = model;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Internal helpers
    // ---------------------------------------------------------------

    /// Reject a capability built against another module's roles.
    pub(crate) fn authorize(&self, caller: &Caller) -> Result<(), BastionError> {
        if caller.module() != self.inner.module_id {
            return Err(BastionError::Unauthorized(format!(
                "Caller context belongs to module {}, not {}",
                caller.module(),
                self.inner.module_id
            )));
        }
        Ok(())
    }

    pub(crate) fn pool_mut(&mut self, pool_id: PoolId) -> Result<&mut ReservePool, BastionError> {
        self.inner
            .pools
            .get_mut(pool_id.index())
            .ok_or_else(|| BastionError::NotFound(format!("Reserve pool {}", pool_id)))
    }

    /// Check the module account covers every outgoing total before the
    /// first transfer of a multi-pool payout.
    pub(crate) fn require_module_holds(
        &self,
        totals: &HashMap<AssetId, Amount>,
        action: &str,
    ) -> Result<(), BastionError> {
        let module_account = self.module_account();
        for (asset, total) in totals.iter().filter(|(_, t)| **t > 0) {
            let held = self.assets.balance_of(asset, &module_account)?;
            if held < *total {
                return Err(BastionError::Asset(format!(
                    "module {} holds {} of {}, {} needs {}",
                    self.inner.module_id, held, asset, action, total
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn next_request_id(&mut self) -> RequestId {
        let id = RequestId(self.inner.next_request_id);
        self.inner.next_request_id += 1;
        id
    }

    pub(crate) fn debug_check_invariants(&self) {
        debug_assert!(self.inner.pools.iter().all(ReservePool::holds_invariant));
        debug_assert!(
            self.inner.state == ModuleState::Paused
                || (self.inner.state == ModuleState::Triggered)
                    == (self.inner.pending_loss_count > 0)
        );
    }
}
