//! Ledger service: turns milestone confirmations into balance state.
//!
//! Milestones are applied strictly in index order. Each application walks the
//! milestone's past cone, stopping at confirmed transactions and solid entry
//! points, aggregates the values into a [`StateDiff`], checks conservation and
//! non-negativity against a stable snapshot, and commits under the mutation
//! gate. A failed store write undoes the confirmation marks and the persisted
//! diff before the error is returned.

use std::collections::HashSet;
use std::sync::Arc;

use tangle_store::{GraphStore, Milestone, MilestoneStore, StateDiffStore, TransactionStore};
use tangle_types::{MilestoneIndex, TxHash};

use crate::{LedgerError, LedgerState, Snapshot, StateDiff};

/// Transactions newly confirmed by a cone walk, plus their aggregate diff.
struct Cone {
    hashes: Vec<TxHash>,
    diff: StateDiff,
}

pub struct LedgerService {
    store: Arc<dyn GraphStore>,
    state: Arc<LedgerState>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn GraphStore>, state: Arc<LedgerState>) -> Self {
        Self { store, state }
    }

    pub fn state(&self) -> &Arc<LedgerState> {
        &self.state
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Confirm `milestone` and return its diff.
    ///
    /// Re-applying an already confirmed index returns the persisted diff
    /// without touching the state, provided `milestone` is the one the ledger
    /// confirmed there; any other hash is a `MilestoneMismatch`.
    pub fn apply_milestone(&self, milestone: Milestone) -> Result<StateDiff, LedgerError> {
        let index = milestone.index;
        let gate = self.state.begin_mutation();
        let snapshot = gate.snapshot();

        if index <= snapshot.index {
            self.check_applied(&milestone, &snapshot)?;
            return self.persisted_diff(index);
        }
        let expected = snapshot.index.saturating_add(1);
        if index != expected {
            return Err(LedgerError::MilestoneOutOfOrder {
                expected,
                got: index,
            });
        }

        let recorded = self
            .store
            .get_milestone(index)?
            .ok_or(LedgerError::MilestoneNotFound(index))?;
        if recorded.hash != milestone.hash {
            tracing::debug!(
                index,
                requested = %milestone.hash,
                recorded = %recorded.hash,
                "milestone record changed before application"
            );
            return Err(LedgerError::MilestoneMismatch {
                index,
                hash: milestone.hash,
            });
        }
        if !self.store.is_solid(&milestone.hash)? {
            return Err(LedgerError::MilestoneNotSolid(index));
        }

        let cone = match self.unconfirmed_cone(&[milestone.hash], &snapshot) {
            Ok(cone) => cone,
            Err(LedgerError::MissingTransaction(hash)) => {
                tracing::warn!(index, %hash, "milestone ancestry incomplete");
                return Err(LedgerError::MilestoneNotSolid(index));
            }
            Err(LedgerError::BalanceOverflow { address }) => {
                tracing::error!(index, %address, "protocol anomaly: milestone diff overflows");
                return Err(LedgerError::InconsistentSnapshotDiff {
                    index,
                    reason: format!("delta for {address} overflows"),
                });
            }
            Err(e) => return Err(e),
        };

        if !cone.diff.is_balanced() {
            tracing::error!(
                index,
                sum = %cone.diff.sum(),
                "protocol anomaly: milestone diff does not conserve supply"
            );
            return Err(LedgerError::InconsistentSnapshotDiff {
                index,
                reason: format!("diff sums to {}", cone.diff.sum()),
            });
        }
        let patched = snapshot.state.patched_state(&cone.diff).map_err(|e| {
            tracing::error!(index, error = %e, "protocol anomaly: milestone diff overflows a balance");
            LedgerError::InconsistentSnapshotDiff {
                index,
                reason: e.to_string(),
            }
        })?;
        let negative = patched.inconsistent_addresses();
        if !negative.is_empty() {
            tracing::error!(
                index,
                addresses = negative.len(),
                "protocol anomaly: milestone diff drives balances negative"
            );
            return Err(LedgerError::InconsistentSnapshotDiff {
                index,
                reason: format!("{} addresses would go negative", negative.len()),
            });
        }

        self.store.put_state_diff(index, &cone.diff.to_bytes())?;
        let mut marked = Vec::with_capacity(cone.hashes.len());
        for hash in &cone.hashes {
            if let Err(e) = self.store.mark_confirmed(hash, index) {
                self.roll_back(index, &marked);
                return Err(e.into());
            }
            marked.push(*hash);
        }
        if let Err(e) = gate.commit(index, milestone.hash, &cone.diff) {
            self.roll_back(index, &marked);
            return Err(e);
        }

        tracing::info!(
            index,
            hash = %milestone.hash,
            confirmed = cone.hashes.len(),
            changes = cone.diff.len(),
            "milestone applied to ledger"
        );
        Ok(cone.diff)
    }

    /// Whether confirming every unconfirmed transaction under `tips` together
    /// would leave the ledger consistent.
    pub fn tips_consistent(&self, tips: &[TxHash]) -> Result<bool, LedgerError> {
        let snapshot = self.state.read();
        match self.unconfirmed_cone(tips, &snapshot) {
            Ok(cone) => Ok(snapshot
                .state
                .patched_state(&cone.diff)
                .map_or(false, |patched| patched.is_consistent())),
            Err(LedgerError::MissingTransaction(hash)) => {
                tracing::debug!(%hash, "tip ancestry incomplete, treating as inconsistent");
                Ok(false)
            }
            Err(LedgerError::BalanceOverflow { address }) => {
                tracing::debug!(%address, "tip cone overflows a delta, treating as inconsistent");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Merged diff of the unconfirmed past cones of `tips`.
    pub fn balance_diff(&self, tips: &[TxHash]) -> Result<StateDiff, LedgerError> {
        let snapshot = self.state.read();
        Ok(self.unconfirmed_cone(tips, &snapshot)?.diff)
    }

    /// Whether the ledger confirmed `milestone` at its (already applied) index.
    ///
    /// The live snapshot knows the hash of its own index; older milestones
    /// are recognised by the confirmation mark on the milestone transaction,
    /// which its own cone walk set to that index.
    fn check_applied(&self, milestone: &Milestone, snapshot: &Snapshot) -> Result<(), LedgerError> {
        let index = milestone.index;
        let applied = if index == snapshot.index {
            snapshot.hash == milestone.hash
        } else if index < self.state.earliest_retained_index() {
            return Err(LedgerError::SnapshotUnavailable(index));
        } else {
            self.store
                .get_transaction(&milestone.hash)?
                .map_or(false, |record| record.snapshot_index == index)
        };
        if applied {
            return Ok(());
        }
        tracing::warn!(
            index,
            hash = %milestone.hash,
            "milestone index already confirmed with a different hash"
        );
        Err(LedgerError::MilestoneMismatch {
            index,
            hash: milestone.hash,
        })
    }

    fn persisted_diff(&self, index: MilestoneIndex) -> Result<StateDiff, LedgerError> {
        if index <= self.state.params().initial_milestone_index {
            return Ok(StateDiff::new());
        }
        let bytes = self
            .store
            .get_state_diff(index)?
            .ok_or(LedgerError::SnapshotUnavailable(index))?;
        Ok(StateDiff::from_bytes(&bytes)?)
    }

    /// Depth-first walk through trunk and branch from `starts`.
    fn unconfirmed_cone(&self, starts: &[TxHash], snapshot: &Snapshot) -> Result<Cone, LedgerError> {
        let mut visited = HashSet::new();
        let mut stack: Vec<TxHash> = starts.to_vec();
        let mut hashes = Vec::new();
        let mut diff = StateDiff::new();

        while let Some(hash) = stack.pop() {
            if !visited.insert(hash) || snapshot.is_solid_entry_point(&hash) {
                continue;
            }
            let record = self
                .store
                .get_transaction(&hash)?
                .ok_or(LedgerError::MissingTransaction(hash))?;
            if record.is_confirmed() && record.snapshot_index <= snapshot.index {
                continue;
            }
            diff.add(record.address, record.value)?;
            hashes.push(hash);
            stack.push(record.trunk);
            stack.push(record.branch);
        }
        Ok(Cone { hashes, diff })
    }

    fn roll_back(&self, index: MilestoneIndex, marked: &[TxHash]) {
        tracing::warn!(index, marked = marked.len(), "rolling back milestone confirmation");
        for hash in marked {
            if let Err(e) = self.store.mark_confirmed(hash, 0) {
                tracing::error!(index, %hash, error = %e, "failed to clear confirmation mark");
            }
        }
        if let Err(e) = self.store.delete_state_diff(index) {
            tracing::error!(index, error = %e, "failed to delete persisted state diff");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SnapshotState;
    use tangle_nullables::{NullStore, TxBuilder};
    use tangle_types::{Address, ProtocolParams};

    fn addr(n: u8) -> Address {
        Address::new([n; 32])
    }

    fn h(label: &str) -> TxHash {
        TxHash::digest(label.as_bytes())
    }

    fn ms(prefix: &str, index: MilestoneIndex) -> Milestone {
        Milestone::new(index, h(&format!("{prefix}-ms")))
    }

    struct Fixture {
        store: Arc<NullStore>,
        service: LedgerService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(NullStore::new());
        let balances = SnapshotState::new([(addr(1), 50)].into_iter().collect());
        let state = Arc::new(LedgerState::new(ProtocolParams::with_supply(50), balances).unwrap());
        let service = LedgerService::new(store.clone(), state);
        Fixture { store, service }
    }

    /// spend(-amount from 1) <- receive(+amount to 2) <- milestone
    fn transfer(store: &NullStore, prefix: &str, amount: i64, index: MilestoneIndex, base: TxHash) {
        let spend = TxBuilder::named(&format!("{prefix}-spend"))
            .parents(base, base)
            .value(addr(1), -amount)
            .build();
        let receive = TxBuilder::named(&format!("{prefix}-receive"))
            .parents(spend.hash, base)
            .value(addr(2), amount)
            .build();
        let milestone = TxBuilder::named(&format!("{prefix}-ms"))
            .parents(receive.hash, spend.hash)
            .milestone(index)
            .build();
        store.insert_all([spend, receive, milestone.clone()]).unwrap();
        store
            .put_milestone(&Milestone::new(index, milestone.hash))
            .unwrap();
    }

    #[test]
    fn applies_transfer_and_marks_cone() {
        let f = fixture();
        transfer(&f.store, "m1", 50, 1, TxHash::ZERO);

        let diff = f.service.apply_milestone(ms("m1", 1)).unwrap();
        assert_eq!(diff.get(&addr(1)), Some(-50));
        assert_eq!(diff.get(&addr(2)), Some(50));

        let state = f.service.state();
        assert_eq!(state.get_balance(&addr(1)), 0);
        assert_eq!(state.get_balance(&addr(2)), 50);
        assert_eq!(state.latest_snapshot_index(), 1);
        assert_eq!(f.store.confirmed_by(1).unwrap().len(), 3);
        assert!(f.store.get_state_diff(1).unwrap().is_some());
    }

    #[test]
    fn reapplying_returns_identical_diff() {
        let f = fixture();
        transfer(&f.store, "m1", 20, 1, TxHash::ZERO);
        let first = f.service.apply_milestone(ms("m1", 1)).unwrap();
        let second = f.service.apply_milestone(ms("m1", 1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(f.service.state().get_balance(&addr(2)), 20);
    }

    #[test]
    fn reapplying_with_a_forked_hash_is_refused() {
        let f = fixture();
        transfer(&f.store, "m1", 20, 1, TxHash::ZERO);
        f.service.apply_milestone(ms("m1", 1)).unwrap();
        transfer(&f.store, "fork", 30, 1, TxHash::ZERO);

        let err = f.service.apply_milestone(ms("fork", 1)).unwrap_err();
        assert!(matches!(err, LedgerError::MilestoneMismatch { index: 1, .. }));
        assert_eq!(f.service.state().get_balance(&addr(2)), 20);
        assert_eq!(f.service.state().latest_snapshot_hash(), h("m1-ms"));
    }

    #[test]
    fn older_applied_milestones_are_recognised_by_their_mark() {
        let f = fixture();
        transfer(&f.store, "m1", 10, 1, TxHash::ZERO);
        f.service.apply_milestone(ms("m1", 1)).unwrap();
        transfer(&f.store, "m2", 10, 2, h("m1-ms"));
        f.service.apply_milestone(ms("m2", 2)).unwrap();
        transfer(&f.store, "fork", 10, 1, TxHash::ZERO);

        assert_eq!(f.service.apply_milestone(ms("m1", 1)).unwrap().get(&addr(2)), Some(10));
        assert!(matches!(
            f.service.apply_milestone(ms("fork", 1)),
            Err(LedgerError::MilestoneMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn stale_milestone_record_is_not_applied() {
        let f = fixture();
        transfer(&f.store, "m1", 10, 1, TxHash::ZERO);
        transfer(&f.store, "fork", 10, 1, TxHash::ZERO);
        // the fork's record replaced the one the caller saw
        assert!(matches!(
            f.service.apply_milestone(ms("m1", 1)),
            Err(LedgerError::MilestoneMismatch { index: 1, .. })
        ));
        assert_eq!(f.service.state().latest_snapshot_index(), 0);
        f.service.apply_milestone(ms("fork", 1)).unwrap();
    }

    #[test]
    fn out_of_order_is_rejected() {
        let f = fixture();
        transfer(&f.store, "m2", 10, 2, TxHash::ZERO);
        let err = f.service.apply_milestone(ms("m2", 2)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::MilestoneOutOfOrder {
                expected: 1,
                got: 2
            }
        ));
    }

    #[test]
    fn second_milestone_skips_confirmed_ancestry() {
        let f = fixture();
        transfer(&f.store, "m1", 30, 1, TxHash::ZERO);
        f.service.apply_milestone(ms("m1", 1)).unwrap();
        transfer(&f.store, "m2", 20, 2, h("m1-ms"));

        let diff = f.service.apply_milestone(ms("m2", 2)).unwrap();
        assert_eq!(diff.get(&addr(1)), Some(-20));
        assert_eq!(f.store.confirmed_by(2).unwrap().len(), 3);
        assert_eq!(f.service.state().get_balance(&addr(1)), 0);
        assert_eq!(f.service.state().get_balance(&addr(2)), 50);
    }

    #[test]
    fn overdraft_is_rejected_without_mutation() {
        let f = fixture();
        transfer(&f.store, "m1", 100, 1, TxHash::ZERO);
        let err = f.service.apply_milestone(ms("m1", 1)).unwrap_err();
        assert!(matches!(err, LedgerError::InconsistentSnapshotDiff { index: 1, .. }));
        assert_eq!(f.service.state().get_balance(&addr(1)), 50);
        assert!(f.store.confirmed_by(1).unwrap().is_empty());
        assert!(f.store.get_state_diff(1).unwrap().is_none());
    }

    #[test]
    fn unbalanced_milestone_is_rejected() {
        let f = fixture();
        let mint = TxBuilder::named("mint").value(addr(3), 5).build();
        let ms = TxBuilder::named("ms").parents(mint.hash, mint.hash).milestone(1).build();
        f.store.insert_all([mint, ms.clone()]).unwrap();
        f.store.put_milestone(&Milestone::new(1, ms.hash)).unwrap();

        assert!(matches!(
            f.service.apply_milestone(Milestone::new(1, ms.hash)),
            Err(LedgerError::InconsistentSnapshotDiff { .. })
        ));
    }

    #[test]
    fn unsolid_milestone_is_not_applied() {
        let f = fixture();
        transfer(&f.store, "m1", 10, 1, TxHash::ZERO);
        f.store.force_solid(&h("m1-ms"), false).unwrap();
        assert!(matches!(
            f.service.apply_milestone(ms("m1", 1)),
            Err(LedgerError::MilestoneNotSolid(1))
        ));
    }

    #[test]
    fn missing_ancestor_reports_not_solid() {
        let f = fixture();
        let ms = TxBuilder::named("ms").parents(h("absent"), TxHash::ZERO).milestone(1).build();
        f.store.put_transaction(&ms).unwrap();
        f.store.put_milestone(&Milestone::new(1, ms.hash)).unwrap();
        assert!(matches!(
            f.service.apply_milestone(Milestone::new(1, ms.hash)),
            Err(LedgerError::MilestoneNotSolid(1))
        ));
    }

    #[test]
    fn tips_consistency_merges_cones() {
        let f = fixture();
        let spend_a = TxBuilder::named("a").value(addr(1), -40).build();
        let recv_a = TxBuilder::named("ra").parents(spend_a.hash, spend_a.hash).value(addr(2), 40).build();
        let spend_b = TxBuilder::named("b").value(addr(1), -40).build();
        let recv_b = TxBuilder::named("rb").parents(spend_b.hash, spend_b.hash).value(addr(3), 40).build();
        f.store
            .insert_all([spend_a, recv_a.clone(), spend_b, recv_b.clone()])
            .unwrap();

        assert!(f.service.tips_consistent(&[recv_a.hash]).unwrap());
        assert!(f.service.tips_consistent(&[recv_b.hash]).unwrap());
        // double spend of address 1
        assert!(!f.service.tips_consistent(&[recv_a.hash, recv_b.hash]).unwrap());

        let merged = f.service.balance_diff(&[recv_a.hash, recv_b.hash]).unwrap();
        assert_eq!(merged.get(&addr(1)), Some(-80));
    }

    #[test]
    fn missing_tip_ancestry_is_inconsistent() {
        let f = fixture();
        let tip = TxBuilder::named("tip").parents(h("gone"), TxHash::ZERO).build();
        f.store.put_transaction(&tip).unwrap();
        assert!(!f.service.tips_consistent(&[tip.hash]).unwrap());
    }
}
