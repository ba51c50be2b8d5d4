//! Entry-point selection: where a random walk starts.
//!
//! The walk starts at the milestone `depth` rounds behind the latest solid
//! milestone. Deeper starts give older transactions a chance to be approved
//! at the cost of a larger rating subgraph.

use std::sync::{Arc, PoisonError, RwLock};

use tangle_ledger::LedgerState;
use tangle_milestone::MilestoneTracker;
use tangle_store::{GraphStore, Milestone, MilestoneStore};
use tangle_types::TxHash;

use crate::TipSelectionError;

/// Anything that knows the latest solid milestone.
pub trait SolidMilestoneSource: Send + Sync {
    fn latest_solid_milestone(&self) -> Option<Milestone>;
}

impl SolidMilestoneSource for RwLock<MilestoneTracker> {
    fn latest_solid_milestone(&self) -> Option<Milestone> {
        self.read()
            .unwrap_or_else(PoisonError::into_inner)
            .latest_solid_milestone()
    }
}

pub struct EntryPointSelector {
    store: Arc<dyn GraphStore>,
    ledger: Arc<LedgerState>,
    milestones: Arc<dyn SolidMilestoneSource>,
    max_depth: i64,
}

impl EntryPointSelector {
    pub fn new(
        store: Arc<dyn GraphStore>,
        ledger: Arc<LedgerState>,
        milestones: Arc<dyn SolidMilestoneSource>,
        max_depth: i64,
    ) -> Self {
        Self {
            store,
            ledger,
            milestones,
            max_depth,
        }
    }

    pub fn select_entry_point(&self, depth: i64) -> Result<TxHash, TipSelectionError> {
        if depth < 0 || depth > self.max_depth {
            return Err(TipSelectionError::InvalidDepth {
                depth,
                max: self.max_depth,
            });
        }

        let Some(latest) = self.milestones.latest_solid_milestone() else {
            let anchor = self.ledger.latest_snapshot_hash();
            tracing::debug!(%anchor, "no solid milestone yet, starting from snapshot");
            return Ok(anchor);
        };

        let chain = latest
            .index
            .saturating_sub(self.ledger.params().initial_milestone_index);
        let depth = u32::try_from(depth).unwrap_or(u32::MAX);
        if depth > chain {
            return Ok(latest.hash);
        }

        // a walk reaching back to the snapshot starts at its anchor
        let target = latest.index - depth;
        if let Some((index, hash)) = self.ledger.local_snapshot_anchor() {
            if target <= index {
                return Ok(hash);
            }
        }
        let params = self.ledger.params();
        if target <= params.initial_milestone_index {
            return Ok(params.genesis_hash);
        }
        let entry = self
            .store
            .closest_next_milestone(target, latest.index)?
            .map_or(latest.hash, |milestone| milestone.hash);
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle_ledger::SnapshotState;
    use tangle_nullables::NullStore;
    use tangle_types::{Address, ProtocolParams, Timestamp};

    fn ms(index: u32) -> Milestone {
        Milestone::new(index, TxHash::new([index as u8; 32]))
    }

    fn selector(store_indexes: &[u32], solid_up_to: Option<u32>) -> EntryPointSelector {
        let store = Arc::new(NullStore::new());
        for index in store_indexes {
            store.put_milestone(&ms(*index)).unwrap();
        }
        let balances = SnapshotState::new([(Address::new([1; 32]), 5)].into_iter().collect());
        let ledger = Arc::new(LedgerState::new(ProtocolParams::with_supply(5), balances).unwrap());

        let mut tracker = MilestoneTracker::new(0);
        if let Some(solid) = solid_up_to {
            for index in 1..=solid {
                tracker.observe(ms(index), Timestamp::new(1));
                tracker.mark_solid(index).unwrap();
            }
        }
        EntryPointSelector::new(store, ledger, Arc::new(RwLock::new(tracker)), 15)
    }

    #[test]
    fn depth_bounds_are_enforced() {
        let s = selector(&[], None);
        assert!(matches!(
            s.select_entry_point(-1),
            Err(TipSelectionError::InvalidDepth { depth: -1, .. })
        ));
        assert!(matches!(
            s.select_entry_point(16),
            Err(TipSelectionError::InvalidDepth { depth: 16, max: 15 })
        ));
    }

    #[test]
    fn genesis_before_any_solid_milestone() {
        let s = selector(&[1, 2], None);
        assert_eq!(s.select_entry_point(3).unwrap(), TxHash::ZERO);
    }

    #[test]
    fn walks_back_depth_milestones() {
        let s = selector(&[1, 2, 3, 4, 5, 6], Some(6));
        assert_eq!(s.select_entry_point(0).unwrap(), ms(6).hash);
        assert_eq!(s.select_entry_point(2).unwrap(), ms(4).hash);
    }

    #[test]
    fn depth_beyond_chain_uses_latest_solid() {
        let s = selector(&[1, 2, 3], Some(3));
        assert_eq!(s.select_entry_point(10).unwrap(), ms(3).hash);
    }

    #[test]
    fn depth_equal_to_chain_starts_at_genesis() {
        let s = selector(&[1, 2, 3], Some(3));
        let starts: Vec<TxHash> = (0..=4).map(|depth| s.select_entry_point(depth).unwrap()).collect();
        assert_eq!(starts, vec![ms(3).hash, ms(2).hash, ms(1).hash, TxHash::ZERO, ms(3).hash]);
    }

    #[test]
    fn depth_reaching_local_snapshot_starts_at_its_anchor() {
        let s = selector(&[1, 2, 3, 4, 5], Some(5));
        let mut local = s.ledger.snapshot();
        local.index = 2;
        local.hash = ms(2).hash;
        s.ledger.set_local_snapshot(local);

        assert_eq!(s.select_entry_point(2).unwrap(), ms(3).hash);
        assert_eq!(s.select_entry_point(3).unwrap(), ms(2).hash);
        assert_eq!(s.select_entry_point(5).unwrap(), ms(2).hash);
    }

    #[test]
    fn missing_index_uses_closest_next() {
        let s = selector(&[1, 4, 6], Some(6));
        assert_eq!(s.select_entry_point(4).unwrap(), ms(4).hash);
        assert_eq!(s.select_entry_point(3).unwrap(), ms(4).hash);
    }
}
