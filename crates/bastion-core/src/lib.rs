// crates/bastion-core/src/lib.rs
//
// bastion-core: identifiers, fixed-point math, errors, commitment hashing,
// and the external boundaries (assets, loss-detectors, drip models) of the
// Bastion safety module.
//
// This is the leaf crate that all other crates in the workspace depend on.

pub mod asset;
pub mod claim_token;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod math;
pub mod traits;

// Re-export key types for ergonomic access from downstream crates.
pub use asset::{AssetBankState, InMemoryAssetBank, StaticDetector};
pub use claim_token::ClaimToken;
pub use crypto::{hash_bytes, CommitEncoder, Digest32};
pub use error::BastionError;
pub use identity::{AccountId, AssetId, DetectorId, ModuleId, PoolId, RequestId};
pub use math::{Amount, WAD, ZOC};
pub use traits::{AssetBank, DetectorState, DripModel, LossDetector};
