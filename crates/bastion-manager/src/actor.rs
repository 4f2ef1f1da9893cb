// crates/bastion-manager/src/actor.rs
//
// Per-module mailbox. Each deployed `Engine` is owned by one tokio task
// that applies `Command`s in arrival order and answers on a oneshot
// channel, so operations on a module never interleave.
//
// Callers identify themselves by account; the actor turns that into the
// module's own capability context with `Engine::caller` before dispatch.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use bastion_core::math::Amount;
use bastion_core::{
    AccountId, BastionError, DripModel, LossDetector, ModuleId, PoolId, RequestId,
};
use bastion_ledger::{
    ConfigUpdate, ConfigUpdateMetadata, Engine, EngineState, LossSpec, ModuleState, ReservePool,
    WithdrawalRequest,
};

use crate::clock::Clock;

/// Mailbox depth per module.
const MAILBOX_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, BastionError>>;

/// A request to a module actor.
pub enum Command {
    Deposit {
        account: AccountId,
        pool_id: PoolId,
        amount: Amount,
        receiver: AccountId,
        reply: Reply<Amount>,
    },
    QueueWithdrawal {
        account: AccountId,
        pool_id: PoolId,
        claim_amount: Amount,
        receiver: AccountId,
        owner: AccountId,
        reply: Reply<(RequestId, Amount)>,
    },
    CompleteWithdrawal {
        request_id: RequestId,
        reply: Reply<Amount>,
    },
    PreviewWithdrawal {
        request_id: RequestId,
        reply: Reply<Amount>,
    },
    WithdrawalRequest {
        request_id: RequestId,
        reply: Reply<Option<WithdrawalRequest>>,
    },
    Fire {
        detector: Arc<dyn LossDetector>,
        reply: Reply<()>,
    },
    ApplyLoss {
        account: AccountId,
        losses: Vec<LossSpec>,
        receiver: AccountId,
        reply: Reply<()>,
    },
    Pause {
        account: AccountId,
        reply: Reply<()>,
    },
    Unpause {
        account: AccountId,
        reply: Reply<()>,
    },
    QueueConfigUpdate {
        account: AccountId,
        update: ConfigUpdate,
        reply: Reply<ConfigUpdateMetadata>,
    },
    FinalizeConfigUpdate {
        update: ConfigUpdate,
        reply: Reply<()>,
    },
    DripFees {
        reply: Reply<()>,
    },
    ClaimFees {
        account: AccountId,
        receiver: AccountId,
        model: Arc<dyn DripModel>,
        reply: Reply<Vec<(PoolId, Amount)>>,
    },
    SetDripModel {
        account: AccountId,
        model: Arc<dyn DripModel>,
        reply: Reply<()>,
    },
    ConvertToClaimAmount {
        pool_id: PoolId,
        asset_amount: Amount,
        reply: Reply<Amount>,
    },
    ConvertToAssetAmount {
        pool_id: PoolId,
        claim_amount: Amount,
        reply: Reply<Amount>,
    },
    TransferClaimTokens {
        account: AccountId,
        pool_id: PoolId,
        to: AccountId,
        amount: Amount,
        reply: Reply<()>,
    },
    ApproveClaimTokens {
        account: AccountId,
        pool_id: PoolId,
        spender: AccountId,
        amount: Amount,
        reply: Reply<()>,
    },
    ClaimBalance {
        pool_id: PoolId,
        account: AccountId,
        reply: Reply<Amount>,
    },
    Pool {
        pool_id: PoolId,
        reply: Reply<ReservePool>,
    },
    Status {
        reply: Reply<(ModuleState, u64)>,
    },
    Entitlement {
        account: AccountId,
        reply: Reply<u64>,
    },
    Snapshot {
        reply: Reply<EngineState>,
    },
}

/// Cloneable handle to a running module actor.
#[derive(Clone)]
pub struct ModuleHandle {
    module_id: ModuleId,
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("module_id", &self.module_id)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Move `engine` onto its own task and return a handle to it.
pub fn spawn(engine: Engine, clock: Arc<dyn Clock>) -> ModuleHandle {
    let module_id = engine.module_id();
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    tokio::spawn(run(engine, clock, rx));
    ModuleHandle { module_id, tx }
}

async fn run(mut engine: Engine, clock: Arc<dyn Clock>, mut rx: mpsc::Receiver<Command>) {
    let module_id = engine.module_id();
    tracing::debug!("Module {} actor started", module_id);
    while let Some(command) = rx.recv().await {
        dispatch(&mut engine, clock.now(), command);
    }
    tracing::debug!("Module {} actor stopped", module_id);
}

fn dispatch(engine: &mut Engine, now: u64, command: Command) {
    // A dropped reply receiver means the caller gave up; nothing to do.
    match command {
        Command::Deposit {
            account,
            pool_id,
            amount,
            receiver,
            reply,
        } => {
            let caller = engine.caller(account);
            let _ = reply.send(engine.deposit(&caller, pool_id, amount, receiver, now));
        }
        Command::QueueWithdrawal {
            account,
            pool_id,
            claim_amount,
            receiver,
            owner,
            reply,
        } => {
            let caller = engine.caller(account);
            let _ = reply.send(engine.queue_withdrawal(
                &caller,
                pool_id,
                claim_amount,
                receiver,
                owner,
                now,
            ));
        }
        Command::CompleteWithdrawal { request_id, reply } => {
            let _ = reply.send(engine.complete_withdrawal(request_id, now));
        }
        Command::PreviewWithdrawal { request_id, reply } => {
            let _ = reply.send(engine.preview_withdrawal(request_id));
        }
        Command::WithdrawalRequest { request_id, reply } => {
            let _ = reply.send(Ok(engine.withdrawal_request(request_id).cloned()));
        }
        Command::Fire { detector, reply } => {
            let _ = reply.send(engine.fire(detector.as_ref(), now));
        }
        Command::ApplyLoss {
            account,
            losses,
            receiver,
            reply,
        } => {
            let caller = engine.caller(account);
            let _ = reply.send(engine.apply_loss(&caller, &losses, receiver, now));
        }
        Command::Pause { account, reply } => {
            let caller = engine.caller(account);
            let _ = reply.send(engine.pause(&caller, now));
        }
        Command::Unpause { account, reply } => {
            let caller = engine.caller(account);
            let _ = reply.send(engine.unpause(&caller, now));
        }
        Command::QueueConfigUpdate {
            account,
            update,
            reply,
        } => {
            let caller = engine.caller(account);
            let _ = reply.send(engine.queue_config_update(&caller, &update, now));
        }
        Command::FinalizeConfigUpdate { update, reply } => {
            let _ = reply.send(engine.finalize_config_update(&update, now));
        }
        Command::DripFees { reply } => {
            let _ = reply.send(engine.drip_fees(now));
        }
        Command::ClaimFees {
            account,
            receiver,
            model,
            reply,
        } => {
            let caller = engine.caller(account);
            let _ = reply.send(engine.claim_fees(&caller, receiver, model.as_ref(), now));
        }
        Command::SetDripModel {
            account,
            model,
            reply,
        } => {
            let caller = engine.caller(account);
            let _ = reply.send(engine.set_drip_model(&caller, model));
        }
        Command::ConvertToClaimAmount {
            pool_id,
            asset_amount,
            reply,
        } => {
            let _ = reply.send(engine.convert_to_claim_amount(pool_id, asset_amount, now));
        }
        Command::ConvertToAssetAmount {
            pool_id,
            claim_amount,
            reply,
        } => {
            let _ = reply.send(engine.convert_to_asset_amount(pool_id, claim_amount, now));
        }
        Command::TransferClaimTokens {
            account,
            pool_id,
            to,
            amount,
            reply,
        } => {
            let caller = engine.caller(account);
            let _ = reply.send(engine.transfer_claim_tokens(&caller, pool_id, to, amount));
        }
        Command::ApproveClaimTokens {
            account,
            pool_id,
            spender,
            amount,
            reply,
        } => {
            let caller = engine.caller(account);
            let _ = reply.send(engine.approve_claim_tokens(&caller, pool_id, spender, amount));
        }
        Command::ClaimBalance {
            pool_id,
            account,
            reply,
        } => {
            let _ = reply.send(
                engine
                    .claim_token(pool_id)
                    .map(|token| token.balance_of(&account)),
            );
        }
        Command::Pool { pool_id, reply } => {
            let _ = reply.send(engine.pool(pool_id).cloned());
        }
        Command::Status { reply } => {
            let _ = reply.send(Ok((engine.state(), engine.pending_loss_count())));
        }
        Command::Entitlement { account, reply } => {
            let _ = reply.send(Ok(engine.entitlement(&account)));
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(Ok(engine.snapshot()));
        }
    }
}

impl ModuleHandle {
    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    /// Send a command built around a fresh reply channel and wait for the answer.
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, BastionError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).await.map_err(|_| {
            BastionError::Mailbox(format!("module {} is not running", self.module_id))
        })?;
        rx.await.map_err(|_| {
            BastionError::Mailbox(format!("module {} dropped the reply", self.module_id))
        })?
    }

    pub async fn deposit(
        &self,
        account: AccountId,
        pool_id: PoolId,
        amount: Amount,
        receiver: AccountId,
    ) -> Result<Amount, BastionError> {
        self.request(|reply| Command::Deposit {
            account,
            pool_id,
            amount,
            receiver,
            reply,
        })
        .await
    }

    pub async fn queue_withdrawal(
        &self,
        account: AccountId,
        pool_id: PoolId,
        claim_amount: Amount,
        receiver: AccountId,
        owner: AccountId,
    ) -> Result<(RequestId, Amount), BastionError> {
        self.request(|reply| Command::QueueWithdrawal {
            account,
            pool_id,
            claim_amount,
            receiver,
            owner,
            reply,
        })
        .await
    }

    pub async fn complete_withdrawal(&self, request_id: RequestId) -> Result<Amount, BastionError> {
        self.request(|reply| Command::CompleteWithdrawal { request_id, reply })
            .await
    }

    pub async fn preview_withdrawal(&self, request_id: RequestId) -> Result<Amount, BastionError> {
        self.request(|reply| Command::PreviewWithdrawal { request_id, reply })
            .await
    }

    pub async fn withdrawal_request(
        &self,
        request_id: RequestId,
    ) -> Result<Option<WithdrawalRequest>, BastionError> {
        self.request(|reply| Command::WithdrawalRequest { request_id, reply })
            .await
    }

    pub async fn fire(&self, detector: Arc<dyn LossDetector>) -> Result<(), BastionError> {
        self.request(|reply| Command::Fire { detector, reply }).await
    }

    pub async fn apply_loss(
        &self,
        account: AccountId,
        losses: Vec<LossSpec>,
        receiver: AccountId,
    ) -> Result<(), BastionError> {
        self.request(|reply| Command::ApplyLoss {
            account,
            losses,
            receiver,
            reply,
        })
        .await
    }

    pub async fn pause(&self, account: AccountId) -> Result<(), BastionError> {
        self.request(|reply| Command::Pause { account, reply }).await
    }

    pub async fn unpause(&self, account: AccountId) -> Result<(), BastionError> {
        self.request(|reply| Command::Unpause { account, reply }).await
    }

    pub async fn queue_config_update(
        &self,
        account: AccountId,
        update: ConfigUpdate,
    ) -> Result<ConfigUpdateMetadata, BastionError> {
        self.request(|reply| Command::QueueConfigUpdate {
            account,
            update,
            reply,
        })
        .await
    }

    pub async fn finalize_config_update(&self, update: ConfigUpdate) -> Result<(), BastionError> {
        self.request(|reply| Command::FinalizeConfigUpdate { update, reply })
            .await
    }

    pub async fn drip_fees(&self) -> Result<(), BastionError> {
        self.request(|reply| Command::DripFees { reply }).await
    }

    pub async fn claim_fees(
        &self,
        account: AccountId,
        receiver: AccountId,
        model: Arc<dyn DripModel>,
    ) -> Result<Vec<(PoolId, Amount)>, BastionError> {
        self.request(|reply| Command::ClaimFees {
            account,
            receiver,
            model,
            reply,
        })
        .await
    }

    pub async fn set_drip_model(
        &self,
        account: AccountId,
        model: Arc<dyn DripModel>,
    ) -> Result<(), BastionError> {
        self.request(|reply| Command::SetDripModel {
            account,
            model,
            reply,
        })
        .await
    }

    pub async fn convert_to_claim_amount(
        &self,
        pool_id: PoolId,
        asset_amount: Amount,
    ) -> Result<Amount, BastionError> {
        self.request(|reply| Command::ConvertToClaimAmount {
            pool_id,
            asset_amount,
            reply,
        })
        .await
    }

    pub async fn convert_to_asset_amount(
        &self,
        pool_id: PoolId,
        claim_amount: Amount,
    ) -> Result<Amount, BastionError> {
        self.request(|reply| Command::ConvertToAssetAmount {
            pool_id,
            claim_amount,
            reply,
        })
        .await
    }

    pub async fn transfer_claim_tokens(
        &self,
        account: AccountId,
        pool_id: PoolId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), BastionError> {
        self.request(|reply| Command::TransferClaimTokens {
            account,
            pool_id,
            to,
            amount,
            reply,
        })
        .await
    }

    pub async fn approve_claim_tokens(
        &self,
        account: AccountId,
        pool_id: PoolId,
        spender: AccountId,
        amount: Amount,
    ) -> Result<(), BastionError> {
        self.request(|reply| Command::ApproveClaimTokens {
            account,
            pool_id,
            spender,
            amount,
            reply,
        })
        .await
    }

    pub async fn claim_balance(
        &self,
        pool_id: PoolId,
        account: AccountId,
    ) -> Result<Amount, BastionError> {
        self.request(|reply| Command::ClaimBalance {
            pool_id,
            account,
            reply,
        })
        .await
    }

    pub async fn pool(&self, pool_id: PoolId) -> Result<ReservePool, BastionError> {
        self.request(|reply| Command::Pool { pool_id, reply }).await
    }

    /// Lifecycle state and number of loss events still owed.
    pub async fn status(&self) -> Result<(ModuleState, u64), BastionError> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn entitlement(&self, account: AccountId) -> Result<u64, BastionError> {
        self.request(|reply| Command::Entitlement { account, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<EngineState, BastionError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }
}
