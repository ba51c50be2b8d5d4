//! Content hashes identifying transactions in the Tangle.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TangleError;

/// Width of every hash in bytes.
pub const HASH_SIZE: usize = 32;

/// A 32-byte transaction hash.
///
/// The all-zero hash is reserved for the genesis / initial snapshot anchor.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxHash([u8; HASH_SIZE]);

impl TxHash {
    pub const ZERO: Self = Self([0u8; HASH_SIZE]);

    pub fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Blake2b-256 digest of arbitrary bytes.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(data);
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    /// Read a hash from the start of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TangleError> {
        let arr: [u8; HASH_SIZE] = bytes
            .get(..HASH_SIZE)
            .and_then(|s| s.try_into().ok())
            .ok_or(TangleError::InvalidLength {
                expected: HASH_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl FromStr for TxHash {
    type Err = TangleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| TangleError::InvalidHash(s.to_string()))?;
        Self::from_slice(&bytes).and_then(|h| {
            if bytes.len() == HASH_SIZE {
                Ok(h)
            } else {
                Err(TangleError::InvalidHash(s.to_string()))
            }
        })
    }
}
