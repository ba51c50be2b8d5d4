//! Nullable store: thread-safe in-memory graph store for testing.
//!
//! Transactions live in an arena keyed by hash; approvers are an explicit
//! adjacency index rather than back-references between records.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tangle_store::{
    Milestone, MilestoneStore, StateDiffStore, StoreError, TransactionRecord, TransactionStore,
};
use tangle_types::{MilestoneIndex, TxHash};

#[derive(Default)]
struct Graph {
    records: HashMap<TxHash, TransactionRecord>,
    /// hash → direct approvers. Entries exist for referenced-but-missing hashes too.
    approvers: HashMap<TxHash, BTreeSet<TxHash>>,
    tips: BTreeSet<TxHash>,
    /// milestone index → transactions it confirmed.
    confirmed: BTreeMap<MilestoneIndex, BTreeSet<TxHash>>,
}

impl Graph {
    fn set_confirmation(&mut self, hash: &TxHash, index: MilestoneIndex) -> Result<(), StoreError> {
        let record = self
            .records
            .get_mut(hash)
            .ok_or_else(|| StoreError::NotFound(hash.to_string()))?;
        let previous = record.snapshot_index;
        record.snapshot_index = index;
        if previous != 0 {
            if let Some(set) = self.confirmed.get_mut(&previous) {
                set.remove(hash);
                if set.is_empty() {
                    self.confirmed.remove(&previous);
                }
            }
        }
        if index != 0 {
            self.confirmed.entry(index).or_default().insert(*hash);
        }
        Ok(())
    }
}

/// An in-memory graph, milestone and state-diff store for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Default)]
pub struct NullStore {
    graph: RwLock<Graph>,
    milestones: Mutex<BTreeMap<MilestoneIndex, Milestone>>,
    state_diffs: Mutex<BTreeMap<MilestoneIndex, Vec<u8>>>,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a batch of records, in order.
    pub fn insert_all<I>(&self, records: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = TransactionRecord>,
    {
        for record in records {
            self.put_transaction(&record)?;
        }
        Ok(())
    }

    /// Overwrite the solidity flag, including clearing it (test setup only).
    pub fn force_solid(&self, hash: &TxHash, solid: bool) -> Result<(), StoreError> {
        let mut graph = self.write()?;
        let record = graph
            .records
            .get_mut(hash)
            .ok_or_else(|| StoreError::NotFound(hash.to_string()))?;
        record.solid = solid;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Graph>, StoreError> {
        self.graph.read().map_err(|_| StoreError::Poisoned("graph"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Graph>, StoreError> {
        self.graph.write().map_err(|_| StoreError::Poisoned("graph"))
    }

    fn milestones(&self) -> Result<MutexGuard<'_, BTreeMap<MilestoneIndex, Milestone>>, StoreError> {
        self.milestones
            .lock()
            .map_err(|_| StoreError::Poisoned("milestones"))
    }

    fn diffs(&self) -> Result<MutexGuard<'_, BTreeMap<MilestoneIndex, Vec<u8>>>, StoreError> {
        self.state_diffs
            .lock()
            .map_err(|_| StoreError::Poisoned("state diffs"))
    }
}

impl TransactionStore for NullStore {
    fn put_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        let mut graph = self.write()?;
        if graph.records.contains_key(&record.hash) {
            return Ok(());
        }
        for parent in [record.trunk, record.branch] {
            graph.approvers.entry(parent).or_default().insert(record.hash);
            graph.tips.remove(&parent);
        }
        if graph
            .approvers
            .get(&record.hash)
            .map_or(true, |set| set.is_empty())
        {
            graph.tips.insert(record.hash);
        }
        if record.snapshot_index != 0 {
            graph
                .confirmed
                .entry(record.snapshot_index)
                .or_default()
                .insert(record.hash);
        }
        graph.records.insert(record.hash, record.clone());
        Ok(())
    }

    fn get_transaction(&self, hash: &TxHash) -> Result<Option<TransactionRecord>, StoreError> {
        Ok(self.read()?.records.get(hash).cloned())
    }

    fn approvers(&self, hash: &TxHash) -> Result<Vec<TxHash>, StoreError> {
        Ok(self
            .read()?
            .approvers
            .get(hash)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn set_solid(&self, hash: &TxHash) -> Result<(), StoreError> {
        let mut graph = self.write()?;
        let record = graph
            .records
            .get_mut(hash)
            .ok_or_else(|| StoreError::NotFound(hash.to_string()))?;
        record.solid = true;
        Ok(())
    }

    fn tips(&self) -> Result<Vec<TxHash>, StoreError> {
        Ok(self.read()?.tips.iter().copied().collect())
    }

    fn mark_confirmed(&self, hash: &TxHash, index: MilestoneIndex) -> Result<(), StoreError> {
        self.write()?.set_confirmation(hash, index)
    }

    fn confirmed_by(&self, index: MilestoneIndex) -> Result<Vec<TxHash>, StoreError> {
        Ok(self
            .read()?
            .confirmed
            .get(&index)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn delete_transaction(&self, hash: &TxHash) -> Result<(), StoreError> {
        let mut graph = self.write()?;
        let Some(record) = graph.records.remove(hash) else {
            return Ok(());
        };
        graph.tips.remove(hash);
        if record.snapshot_index != 0 {
            if let Some(set) = graph.confirmed.get_mut(&record.snapshot_index) {
                set.remove(hash);
                if set.is_empty() {
                    graph.confirmed.remove(&record.snapshot_index);
                }
            }
        }
        for parent in [record.trunk, record.branch] {
            if let Some(set) = graph.approvers.get_mut(&parent) {
                set.remove(hash);
                if set.is_empty() {
                    graph.approvers.remove(&parent);
                    if graph.records.contains_key(&parent) {
                        graph.tips.insert(parent);
                    }
                }
            }
        }
        Ok(())
    }

    fn transaction_count(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.records.len() as u64)
    }
}

impl MilestoneStore for NullStore {
    fn put_milestone(&self, milestone: &Milestone) -> Result<(), StoreError> {
        self.milestones()?.insert(milestone.index, *milestone);
        Ok(())
    }

    fn get_milestone(&self, index: MilestoneIndex) -> Result<Option<Milestone>, StoreError> {
        Ok(self.milestones()?.get(&index).copied())
    }

    fn closest_next_milestone(
        &self,
        from: MilestoneIndex,
        to: MilestoneIndex,
    ) -> Result<Option<Milestone>, StoreError> {
        if from > to {
            return Ok(None);
        }
        Ok(self
            .milestones()?
            .range(from..=to)
            .next()
            .map(|(_, ms)| *ms))
    }

    fn first_milestone(&self) -> Result<Option<Milestone>, StoreError> {
        Ok(self.milestones()?.values().next().copied())
    }

    fn latest_milestone(&self) -> Result<Option<Milestone>, StoreError> {
        Ok(self.milestones()?.values().next_back().copied())
    }

    fn delete_milestone(&self, index: MilestoneIndex) -> Result<(), StoreError> {
        self.milestones()?.remove(&index);
        Ok(())
    }
}

impl StateDiffStore for NullStore {
    fn put_state_diff(&self, index: MilestoneIndex, bytes: &[u8]) -> Result<(), StoreError> {
        self.diffs()?.insert(index, bytes.to_vec());
        Ok(())
    }

    fn get_state_diff(&self, index: MilestoneIndex) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.diffs()?.get(&index).cloned())
    }

    fn delete_state_diff(&self, index: MilestoneIndex) -> Result<(), StoreError> {
        self.diffs()?.remove(&index);
        Ok(())
    }
}
