// crates/bastion-core/src/identity.rs
//
// Identifiers used across the engine.
//
// 32-byte identities (accounts, assets, loss-detectors, module instances)
// serialize as lowercase hex strings so they can key JSON maps in module
// snapshots. Pools and withdrawal requests use small integer ids.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BastionError;

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Build an id whose every byte is `b`. Handy for fixtures.
            pub const fn repeat(b: u8) -> Self {
                Self([b; 32])
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // First 4 bytes are enough to tell fixtures apart in logs.
                write!(f, "{}({}..)", stringify!($name), hex::encode(&self.0[..4]))
            }
        }

        impl FromStr for $name {
            type Err = BastionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim().trim_start_matches("0x");
                let bytes = hex::decode(trimmed).map_err(|e| {
                    BastionError::Serialization(format!(
                        "Invalid hex for {}: {}",
                        stringify!($name),
                        e
                    ))
                })?;
                let arr: [u8; 32] = bytes.try_into().map_err(|_| {
                    BastionError::Serialization(format!(
                        "{} must be exactly 32 bytes",
                        stringify!($name)
                    ))
                })?;
                Ok(Self(arr))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_id!(
    /// An account able to hold assets and claim tokens (holder, payout receiver, role holder).
    AccountId
);

hex_id!(
    /// Identity of a transferable asset held in a reserve pool.
    AssetId
);

hex_id!(
    /// Identity of an external loss-detector.
    DetectorId
);

hex_id!(
    /// Deterministic identity of a deployed module instance.
    ModuleId
);

/// Position of a reserve pool inside its module. Pools are append-only,
/// so an id stays valid for the lifetime of the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolId(pub u16);

impl PoolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

/// Opaque handle to a queued withdrawal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request#{}", self.0)
    }
}
