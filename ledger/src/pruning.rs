//! Transaction pruning: drop history older than the local snapshot.
//!
//! The pruner listens for local snapshots and queues one job per milestone
//! strictly older than the snapshot index. Each job deletes the transactions
//! that milestone confirmed along with its milestone and state-diff records.
//! Pruned transactions that retained transactions still approve are promoted
//! to solid entry points first, so walks and solidification keep treating
//! them as solid and confirmed.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tangle_store::{GraphStore, MilestoneStore, StateDiffStore, TransactionStore};
use tangle_types::{MilestoneIndex, TxHash};

use crate::{LedgerError, LedgerState, PruningListener};

/// Configuration for transaction pruning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruningConfig {
    pub enabled: bool,
    /// Maximum number of milestone jobs processed per batch.
    pub batch_size: usize,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 10,
        }
    }
}

/// Result of one pruning batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneResult {
    pub milestones_pruned: usize,
    pub transactions_pruned: usize,
    /// Pruned transactions promoted to solid entry points.
    pub entry_points_added: usize,
}

struct Jobs {
    queue: VecDeque<MilestoneIndex>,
    /// Lowest index not queued yet.
    next: MilestoneIndex,
}

pub struct TransactionPruner {
    store: Arc<dyn GraphStore>,
    state: Arc<LedgerState>,
    config: PruningConfig,
    jobs: Mutex<Jobs>,
}

impl TransactionPruner {
    pub fn new(store: Arc<dyn GraphStore>, state: Arc<LedgerState>, config: PruningConfig) -> Self {
        let next = state.params().initial_milestone_index.saturating_add(1);
        Self {
            store,
            state,
            config,
            jobs: Mutex::new(Jobs {
                queue: VecDeque::new(),
                next,
            }),
        }
    }

    pub fn config(&self) -> &PruningConfig {
        &self.config
    }

    /// Queue every milestone older than `snapshot_index` that is not queued yet.
    pub fn queue_below(&self, snapshot_index: MilestoneIndex) {
        if !self.config.enabled {
            return;
        }
        let mut jobs = self.jobs();
        let start = jobs.next;
        for index in start..snapshot_index {
            jobs.queue.push_back(index);
        }
        jobs.next = jobs.next.max(snapshot_index);
        tracing::debug!(
            from = start,
            to = snapshot_index,
            pending = jobs.queue.len(),
            "pruning jobs queued"
        );
    }

    pub fn pending(&self) -> usize {
        self.jobs().queue.len()
    }

    /// Process at most `batch_size` queued milestones.
    pub fn process_batch(&self) -> Result<PruneResult, LedgerError> {
        let mut result = PruneResult::default();
        for _ in 0..self.config.batch_size {
            let Some(index) = self.jobs().queue.pop_front() else {
                break;
            };
            if let Err(e) = self.prune_milestone(index, &mut result) {
                self.jobs().queue.push_front(index);
                return Err(e);
            }
            result.milestones_pruned += 1;
        }
        if result.milestones_pruned > 0 {
            tracing::info!(
                milestones = result.milestones_pruned,
                transactions = result.transactions_pruned,
                entry_points = result.entry_points_added,
                "pruned transactions below local snapshot"
            );
        }
        Ok(result)
    }

    fn prune_milestone(
        &self,
        index: MilestoneIndex,
        result: &mut PruneResult,
    ) -> Result<(), LedgerError> {
        let boundary = self.state.earliest_retained_index();
        let hashes = self.store.confirmed_by(index)?;

        let mut entry_points = Vec::new();
        for hash in &hashes {
            if self.referenced_by_retained(hash, boundary)? {
                entry_points.push((*hash, index));
            }
        }
        result.entry_points_added += entry_points.len();
        self.state.add_solid_entry_points(entry_points);

        for hash in &hashes {
            self.store.delete_transaction(hash)?;
        }
        result.transactions_pruned += hashes.len();
        self.store.delete_milestone(index)?;
        self.store.delete_state_diff(index)?;
        Ok(())
    }

    /// An approver survives pruning if it is unconfirmed or confirmed at or
    /// after the retention boundary.
    fn referenced_by_retained(
        &self,
        hash: &TxHash,
        boundary: MilestoneIndex,
    ) -> Result<bool, LedgerError> {
        for approver in self.store.approvers(hash)? {
            if let Some(record) = self.store.get_transaction(&approver)? {
                if !record.is_confirmed() || record.snapshot_index >= boundary {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn jobs(&self) -> MutexGuard<'_, Jobs> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PruningListener for TransactionPruner {
    fn on_snapshot_taken(&self, index: MilestoneIndex) {
        self.queue_below(index);
    }
}
