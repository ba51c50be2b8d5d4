//! Ledger address type.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::HASH_SIZE;
use crate::TangleError;

/// A 32-byte ledger address holding a balance in the snapshot state.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; HASH_SIZE]);

impl Address {
    pub fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Read an address from the start of `bytes`.
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
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}
