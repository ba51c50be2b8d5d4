//! Local snapshots: compact the ledger to an older milestone.
//!
//! A local snapshot is derived from the live state by reverting persisted
//! diffs from the confirmed index down to the target. Once taken it becomes
//! the earliest retained point and every registered [`PruningListener`] is
//! told that records strictly older than it may go.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tangle_store::{GraphStore, MilestoneStore, StateDiffStore};
use tangle_types::{MilestoneIndex, Timestamp};

use crate::{LedgerError, LedgerState, Snapshot, StateDiff};

/// Receives a notification after each local snapshot.
pub trait PruningListener: Send + Sync {
    fn on_snapshot_taken(&self, index: MilestoneIndex);
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSnapshotConfig {
    pub enabled: bool,
    /// Milestones between two local snapshots.
    pub interval: u32,
    /// How many milestones behind the confirmed index a snapshot is pinned.
    pub depth: u32,
}

impl Default for LocalSnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 10,
            depth: 100,
        }
    }
}

pub struct LocalSnapshotManager {
    store: Arc<dyn GraphStore>,
    state: Arc<LedgerState>,
    config: LocalSnapshotConfig,
    listeners: RwLock<Vec<Arc<dyn PruningListener>>>,
}

impl LocalSnapshotManager {
    pub fn new(
        store: Arc<dyn GraphStore>,
        state: Arc<LedgerState>,
        config: LocalSnapshotConfig,
    ) -> Self {
        Self {
            store,
            state,
            config,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &LocalSnapshotConfig {
        &self.config
    }

    pub fn register_listener(&self, listener: Arc<dyn PruningListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Local snapshot index, or the initial snapshot index before the first one.
    pub fn earliest_retained_milestone_index(&self) -> MilestoneIndex {
        self.state.earliest_retained_index()
    }

    /// The index a snapshot should be pinned to now, if one is due.
    pub fn due_target(&self) -> Option<MilestoneIndex> {
        if !self.config.enabled {
            return None;
        }
        let confirmed = self.state.latest_snapshot_index();
        let last = self.state.earliest_retained_index();
        let threshold = last
            .saturating_add(self.config.interval)
            .saturating_add(self.config.depth);
        (confirmed > threshold).then(|| confirmed - self.config.depth)
    }

    /// Take a snapshot if one is due. Returns the new snapshot index.
    pub fn maybe_take_snapshot(&self) -> Result<Option<MilestoneIndex>, LedgerError> {
        match self.due_target() {
            Some(target) => self.take_local_snapshot(target).map(|s| Some(s.index)),
            None => Ok(None),
        }
    }

    /// Rebuild the state at `target_index` and record it as the local snapshot.
    pub fn take_local_snapshot(&self, target_index: MilestoneIndex) -> Result<Snapshot, LedgerError> {
        let snapshot = {
            let gate = self.state.begin_mutation();
            let live = gate.snapshot();
            if target_index > live.index || target_index < self.state.earliest_retained_index() {
                return Err(LedgerError::SnapshotUnavailable(target_index));
            }
            self.rewind(live, target_index)?
        };

        self.state.set_local_snapshot(snapshot.clone());
        tracing::info!(
            index = snapshot.index,
            addresses = snapshot.state.address_count(),
            entry_points = snapshot.solid_entry_points.len(),
            "local snapshot taken"
        );

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.on_snapshot_taken(snapshot.index);
        }
        Ok(snapshot)
    }

    fn rewind(&self, live: Snapshot, target: MilestoneIndex) -> Result<Snapshot, LedgerError> {
        let mut state = live.state;
        for index in ((target + 1)..=live.index).rev() {
            let bytes = self
                .store
                .get_state_diff(index)?
                .ok_or(LedgerError::SnapshotUnavailable(index))?;
            let diff = StateDiff::from_bytes(&bytes)?;
            state = state.patched_state(&diff.inverted())?;
        }

        let supply = self.state.params().total_supply;
        if !state.has_correct_supply(supply) {
            return Err(LedgerError::InvalidSupply {
                expected: supply,
                actual: state.total(),
            });
        }

        let hash = if target == live.index {
            live.hash
        } else {
            self.store
                .get_milestone(target)?
                .ok_or(LedgerError::MilestoneNotFound(target))?
                .hash
        };
        let mut solid_entry_points: HashMap<_, _> = live
            .solid_entry_points
            .into_iter()
            .filter(|(_, index)| *index <= target)
            .collect();
        solid_entry_points.insert(hash, target);

        Ok(Snapshot {
            state,
            index: target,
            hash,
            timestamp: Timestamp::now(),
            solid_entry_points,
        })
    }
}
