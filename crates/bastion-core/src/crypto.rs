// crates/bastion-core/src/crypto.rs
//
// SHA-256 commitments over a canonical, order-preserving byte encoding.
//
// The encoding is big-endian and length-prefixed, so reordering elements,
// moving a value between fields, or changing any single value produces a
// different digest.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 digest. The all-zero digest means "nothing committed".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Digest32(pub [u8; 32]);

impl Digest32 {
    pub const ZERO: Digest32 = Digest32([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest32({})", hex::encode(&self.0[..8]))
    }
}

impl Serialize for Digest32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Digest32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("digest must be exactly 32 bytes"))?;
        Ok(Digest32(arr))
    }
}

/// Compute SHA-256 hash of the given bytes.
pub fn hash_bytes(data: &[u8]) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    Digest32(output)
}

/// Streaming writer for the canonical commitment encoding.
pub struct CommitEncoder {
    hasher: Sha256,
}

impl CommitEncoder {
    /// Start an encoding under a domain tag, so digests for different
    /// purposes can never collide.
    pub fn new(domain: &[u8]) -> Self {
        let mut enc = Self {
            hasher: Sha256::new(),
        };
        enc.put_bytes(domain);
        enc
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.hasher.update([v]);
        self
    }

    pub fn put_bool(&mut self, v: bool) -> &mut Self {
        self.put_u8(v as u8)
    }

    pub fn put_u16(&mut self, v: u16) -> &mut Self {
        self.hasher.update(v.to_be_bytes());
        self
    }

    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        self.hasher.update(v.to_be_bytes());
        self
    }

    pub fn put_u128(&mut self, v: u128) -> &mut Self {
        self.hasher.update(v.to_be_bytes());
        self
    }

    pub fn put_id(&mut self, id: &[u8; 32]) -> &mut Self {
        self.hasher.update(id);
        self
    }

    /// Length-prefixed byte string.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.put_len(bytes.len());
        self.hasher.update(bytes);
        self
    }

    /// Element count of a following sequence.
    pub fn put_len(&mut self, len: usize) -> &mut Self {
        self.put_u64(len as u64)
    }

    pub fn finish(self) -> Digest32 {
        let result = self.hasher.finalize();
        let mut output = [0u8; 32];
        output.copy_from_slice(&result);
        Digest32(output)
    }
}
