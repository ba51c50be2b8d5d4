//! Snapshots: balance state pinned to a milestone.
//!
//! A snapshot is what the node boots from and what local snapshots produce.
//! Besides balances it carries the solid entry points: hashes at or below the
//! snapshot boundary that retained transactions may still reference. The
//! state hash is computed deterministically from balances, index and entry
//! points so two nodes can compare snapshots.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tangle_types::{MilestoneIndex, ProtocolParams, Timestamp, TxHash};

use crate::{LedgerError, SnapshotState, StateDiff};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: SnapshotState,
    /// Milestone index this state is valid at.
    pub index: MilestoneIndex,
    /// Hash of that milestone transaction (genesis for the initial snapshot).
    pub hash: TxHash,
    pub timestamp: Timestamp,
    /// Entry-point hash → milestone index that confirmed it.
    pub solid_entry_points: HashMap<TxHash, MilestoneIndex>,
}

impl Snapshot {
    /// The initial snapshot: the whole supply held as `balances` at the
    /// protocol's initial milestone index, with genesis as the only entry point.
    pub fn initial(params: &ProtocolParams, state: SnapshotState) -> Self {
        let mut solid_entry_points = HashMap::new();
        solid_entry_points.insert(params.genesis_hash, params.initial_milestone_index);
        Self {
            state,
            index: params.initial_milestone_index,
            hash: params.genesis_hash,
            timestamp: Timestamp::EPOCH,
            solid_entry_points,
        }
    }

    pub fn is_solid_entry_point(&self, hash: &TxHash) -> bool {
        hash.is_zero() || self.solid_entry_points.contains_key(hash)
    }

    /// Apply a milestone's diff and advance to it.
    pub fn apply_milestone(
        &mut self,
        index: MilestoneIndex,
        hash: TxHash,
        diff: &StateDiff,
    ) -> Result<(), LedgerError> {
        self.state.apply_state_diff(index, diff)?;
        self.index = index;
        self.hash = hash;
        self.timestamp = Timestamp::now();
        Ok(())
    }

    /// Blake2b-256 over sorted balances, entry points and the index.
    pub fn state_hash(&self) -> [u8; 32] {
        use blake2::digest::consts::U32;
        use blake2::{Blake2b, Digest};

        let mut hasher = Blake2b::<U32>::new();
        let mut balances: Vec<_> = self.state.balances().iter().collect();
        balances.sort();
        for (address, balance) in balances {
            hasher.update(address.as_bytes());
            hasher.update(balance.to_be_bytes());
        }
        let mut entry_points: Vec<_> = self.solid_entry_points.iter().collect();
        entry_points.sort();
        for (hash, index) in entry_points {
            hasher.update(hash.as_bytes());
            hasher.update(index.to_be_bytes());
        }
        hasher.update(self.index.to_be_bytes());
        hasher.update(self.hash.as_bytes());

        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        bincode::serialize(self).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        bincode::deserialize(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
    }
}
