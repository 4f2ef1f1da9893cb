// crates/bastion-manager/src/manager.rs
//
// Registry of deployed modules.
//
// The manager deploys modules at deterministic ids, holds the manager role
// on every module it deploys, supplies each one's drip model (a default
// with per-module overrides), and batches pause, unpause and fee claims.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use bastion_core::math::Amount;
use bastion_core::{
    AccountId, AssetBank, BastionError, CommitEncoder, DripModel, ModuleId, PoolId,
};
use bastion_ledger::{ConfigUpdate, Engine, EngineState, Roles};

use crate::actor::{self, ModuleHandle};
use crate::clock::Clock;

/// Domain tag for deterministic module ids.
const MODULE_ID_DOMAIN: &[u8] = b"bastion/module-id/v1";

/// Accounts with authority over the manager itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerRoles {
    /// Account the manager acts as on its modules (their `manager` role).
    pub manager: AccountId,
    /// May override drip models, unpause modules and claim fees.
    pub owner: AccountId,
    /// May batch-pause modules.
    pub pauser: AccountId,
}

pub struct Manager {
    roles: ManagerRoles,
    assets: Arc<dyn AssetBank>,
    default_drip_model: Arc<dyn DripModel>,
    overrides: RwLock<HashMap<ModuleId, Arc<dyn DripModel>>>,
    modules: RwLock<HashMap<ModuleId, ModuleHandle>>,
    clock: Arc<dyn Clock>,
}

impl Manager {
    pub fn new(
        roles: ManagerRoles,
        assets: Arc<dyn AssetBank>,
        default_drip_model: Arc<dyn DripModel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            roles,
            assets,
            default_drip_model,
            overrides: RwLock::new(HashMap::new()),
            modules: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn roles(&self) -> ManagerRoles {
        self.roles
    }

    /// Id a module deployed by `deployer` with `salt` will receive.
    pub fn compute_module_id(&self, deployer: &AccountId, salt: &[u8; 32]) -> ModuleId {
        let mut enc = CommitEncoder::new(MODULE_ID_DOMAIN);
        enc.put_id(self.roles.manager.as_bytes())
            .put_id(deployer.as_bytes())
            .put_id(salt);
        ModuleId(enc.finish().0)
    }

    /// Create a module from `config` and start its actor.
    ///
    /// # Errors
    /// `InvalidConfiguration` if the config is invalid or the id is taken.
    pub async fn deploy(
        &self,
        deployer: AccountId,
        owner: AccountId,
        guardian: AccountId,
        config: ConfigUpdate,
        salt: [u8; 32],
    ) -> Result<ModuleHandle, BastionError> {
        let module_id = self.compute_module_id(&deployer, &salt);
        let mut modules = self.modules.write().await;
        if modules.contains_key(&module_id) {
            return Err(BastionError::InvalidConfiguration(format!(
                "module {} already deployed",
                module_id
            )));
        }

        let roles = Roles {
            owner,
            guardian,
            manager: self.roles.manager,
        };
        let engine = Engine::new(
            module_id,
            roles,
            config,
            self.assets.clone(),
            self.drip_model_for(&module_id).await,
            self.clock.now(),
        )?;
        let handle = actor::spawn(engine, self.clock.clone());
        modules.insert(module_id, handle.clone());

        tracing::info!("Deployed module {} for {} (owner {})", module_id, deployer, owner);
        Ok(handle)
    }

    /// Resume a module from a persisted snapshot.
    pub async fn restore(&self, snapshot: EngineState) -> Result<ModuleHandle, BastionError> {
        let module_id = snapshot.module_id();
        let engine = Engine::restore(
            snapshot,
            self.assets.clone(),
            self.drip_model_for(&module_id).await,
        )?;
        let handle = actor::spawn(engine, self.clock.clone());
        let previous = self.modules.write().await.insert(module_id, handle.clone());
        if previous.is_some() {
            tracing::info!("Module {} replaced by its snapshot", module_id);
        } else {
            tracing::info!("Module {} restored from snapshot", module_id);
        }
        Ok(handle)
    }

    pub async fn module(&self, module_id: &ModuleId) -> Result<ModuleHandle, BastionError> {
        self.modules
            .read()
            .await
            .get(module_id)
            .cloned()
            .ok_or_else(|| BastionError::NotFound(format!("Module {}", module_id)))
    }

    pub async fn module_ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.modules.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Set (`Some`) or clear (`None`) the drip model override for a module.
    /// Owner only. Takes effect on the running module immediately.
    pub async fn set_drip_model_override(
        &self,
        caller: AccountId,
        module_id: ModuleId,
        model: Option<Arc<dyn DripModel>>,
    ) -> Result<(), BastionError> {
        self.require_owner(&caller)?;
        let handle = self.module(&module_id).await?;

        {
            let mut overrides = self.overrides.write().await;
            match &model {
                Some(m) => {
                    overrides.insert(module_id, m.clone());
                }
                None => {
                    overrides.remove(&module_id);
                }
            }
        }

        let effective = self.drip_model_for(&module_id).await;
        tracing::info!("Module {} drip model now {:?}", module_id, effective);
        handle.set_drip_model(self.roles.manager, effective).await
    }

    /// The override for `module_id`, or the default model.
    pub async fn drip_model_for(&self, module_id: &ModuleId) -> Arc<dyn DripModel> {
        self.overrides
            .read()
            .await
            .get(module_id)
            .cloned()
            .unwrap_or_else(|| self.default_drip_model.clone())
    }

    /// Pause each listed module. Owner or pauser. Stops at the first failure.
    pub async fn pause_modules(
        &self,
        caller: AccountId,
        module_ids: &[ModuleId],
    ) -> Result<(), BastionError> {
        if caller != self.roles.owner && caller != self.roles.pauser {
            return Err(BastionError::Unauthorized(format!(
                "{} may not pause modules",
                caller
            )));
        }
        for id in module_ids {
            self.module(id).await?.pause(self.roles.manager).await?;
        }
        tracing::info!("Paused {} modules", module_ids.len());
        Ok(())
    }

    /// Unpause each listed module. Owner only. Stops at the first failure.
    pub async fn unpause_modules(
        &self,
        caller: AccountId,
        module_ids: &[ModuleId],
    ) -> Result<(), BastionError> {
        self.require_owner(&caller)?;
        for id in module_ids {
            self.module(id).await?.unpause(self.roles.manager).await?;
        }
        tracing::info!("Unpaused {} modules", module_ids.len());
        Ok(())
    }

    /// Claim accrued fees from each listed module to `receiver`. Owner only.
    pub async fn claim_fees(
        &self,
        caller: AccountId,
        module_ids: &[ModuleId],
        receiver: AccountId,
    ) -> Result<Vec<(ModuleId, Vec<(PoolId, Amount)>)>, BastionError> {
        self.require_owner(&caller)?;
        let mut claimed = Vec::with_capacity(module_ids.len());
        for id in module_ids {
            let model = self.drip_model_for(id).await;
            let paid = self
                .module(id)
                .await?
                .claim_fees(self.roles.manager, receiver, model)
                .await?;
            claimed.push((*id, paid));
        }
        Ok(claimed)
    }

    /// Drip fees on every module, logging failures instead of stopping.
    pub async fn drip_all(&self) -> usize {
        let handles: Vec<ModuleHandle> = self.modules.read().await.values().cloned().collect();
        let mut dripped = 0;
        for handle in handles {
            match handle.drip_fees().await {
                Ok(()) => dripped += 1,
                Err(e) => tracing::warn!("Drip failed for module {}: {}", handle.module_id(), e),
            }
        }
        dripped
    }

    /// Snapshot every module.
    pub async fn snapshot_all(&self) -> Result<Vec<EngineState>, BastionError> {
        let handles: Vec<ModuleHandle> = self.modules.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            snapshots.push(handle.snapshot().await?);
        }
        Ok(snapshots)
    }

    fn require_owner(&self, caller: &AccountId) -> Result<(), BastionError> {
        if *caller == self.roles.owner {
            Ok(())
        } else {
            Err(BastionError::Unauthorized(format!(
                "{} is not the manager owner",
                caller
            )))
        }
    }
}
