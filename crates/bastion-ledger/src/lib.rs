// crates/bastion-ledger/src/lib.rs
//
// bastion-ledger: the per-module engine of the Bastion safety module.
//
// One `Engine` owns the reserve pools of a single module and implements
// the two-phase configurator, the trigger/loss lifecycle, deposits, the
// diluting withdrawal queue and fee drip on top of them.

pub mod config;
pub mod configurator;
pub mod delays;
pub mod drip;
pub mod engine;
pub mod ledger;
pub mod lifecycle;
pub mod pool;
pub mod roles;
pub mod withdrawal;

#[cfg(test)]
mod testutil;

// Re-export key types for ergonomic access from downstream crates.
pub use config::{BindingUpdate, ConfigUpdate, ConfigUpdateMetadata, PoolConfig, MAX_RESERVE_POOLS};
pub use delays::Delays;
pub use drip::{fee_due, DripModelConstantFactor, DripModelExponential, NoDrip};
pub use engine::{Engine, EngineState};
pub use lifecycle::{LossBinding, LossSpec, ModuleState};
pub use pool::{DilutionAccumulator, DilutionEntry, ReservePool};
pub use roles::{Caller, Roles};
pub use withdrawal::WithdrawalRequest;
