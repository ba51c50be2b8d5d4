//! Milestone record storage trait.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use tangle_types::{MilestoneIndex, TxHash};

/// Record length: 4-byte big-endian index followed by the 32-byte hash.
pub const MILESTONE_RECORD_LEN: usize = 4 + 32;

/// A coordinator milestone: index plus the hash of the milestone transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Milestone {
    pub index: MilestoneIndex,
    pub hash: TxHash,
}

impl Milestone {
    pub fn new(index: MilestoneIndex, hash: TxHash) -> Self {
        Self { index, hash }
    }

    pub fn to_bytes(&self) -> [u8; MILESTONE_RECORD_LEN] {
        let mut out = [0u8; MILESTONE_RECORD_LEN];
        out[..4].copy_from_slice(&self.index.to_be_bytes());
        out[4..].copy_from_slice(self.hash.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() != MILESTONE_RECORD_LEN {
            return Err(StoreError::Serialization(format!(
                "milestone record must be {MILESTONE_RECORD_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut index = [0u8; 4];
        index.copy_from_slice(&bytes[..4]);
        let hash =
            TxHash::from_slice(&bytes[4..]).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self {
            index: MilestoneIndex::from_be_bytes(index),
            hash,
        })
    }
}

/// Trait for milestone records keyed by index.
pub trait MilestoneStore: Send + Sync {
    fn put_milestone(&self, milestone: &Milestone) -> Result<(), StoreError>;

    fn get_milestone(&self, index: MilestoneIndex) -> Result<Option<Milestone>, StoreError>;

    /// Lowest stored milestone with `from <= index <= to`.
    fn closest_next_milestone(
        &self,
        from: MilestoneIndex,
        to: MilestoneIndex,
    ) -> Result<Option<Milestone>, StoreError>;

    /// Lowest stored milestone.
    fn first_milestone(&self) -> Result<Option<Milestone>, StoreError>;

    /// Highest stored milestone.
    fn latest_milestone(&self) -> Result<Option<Milestone>, StoreError>;

    fn delete_milestone(&self, index: MilestoneIndex) -> Result<(), StoreError>;
}
