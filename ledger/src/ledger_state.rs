//! Shared ledger state with an explicit mutation gate.
//!
//! `LedgerState` is owned once and shared as `Arc<LedgerState>`. Readers take
//! the read side of the snapshot lock for the duration of a query. The single
//! writer (the ledger service) first acquires the [`MutationGate`], computes
//! against a stable snapshot, and then swaps the patch in under the write
//! lock, so no reader ever observes a half-applied diff.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

use tangle_types::{Address, MilestoneIndex, ProtocolParams, TxHash};

use crate::{LedgerError, Snapshot, SnapshotState, StateDiff};

pub struct LedgerState {
    params: ProtocolParams,
    snapshot: RwLock<Snapshot>,
    gate: Mutex<()>,
    local_snapshot: RwLock<Option<Snapshot>>,
    earliest_retained: AtomicU32,
}

impl LedgerState {
    /// Start from the protocol's initial snapshot holding `balances`.
    pub fn new(params: ProtocolParams, balances: SnapshotState) -> Result<Self, LedgerError> {
        let snapshot = Snapshot::initial(&params, balances);
        Self::from_snapshot(params, snapshot)
    }

    /// Resume from a previously taken snapshot.
    pub fn from_snapshot(params: ProtocolParams, snapshot: Snapshot) -> Result<Self, LedgerError> {
        if !snapshot.state.has_correct_supply(params.total_supply) {
            return Err(LedgerError::InvalidSupply {
                expected: params.total_supply,
                actual: snapshot.state.total(),
            });
        }
        if let Some((address, balance)) = snapshot.state.inconsistent_addresses().first() {
            return Err(LedgerError::NegativeBalance {
                address: *address,
                balance: *balance,
            });
        }
        tracing::info!(
            index = snapshot.index,
            addresses = snapshot.state.address_count(),
            entry_points = snapshot.solid_entry_points.len(),
            "ledger state loaded"
        );
        let earliest = AtomicU32::new(snapshot.index);
        Ok(Self {
            params,
            snapshot: RwLock::new(snapshot),
            gate: Mutex::new(()),
            local_snapshot: RwLock::new(None),
            earliest_retained: earliest,
        })
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// Read access to the live snapshot.
    pub fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.read().clone()
    }

    /// Balance of `address`; absent addresses hold zero.
    pub fn get_balance(&self, address: &Address) -> i64 {
        self.read().state.get_balance(address).unwrap_or(0)
    }

    pub fn is_consistent(&self) -> bool {
        self.read().state.is_consistent()
    }

    pub fn latest_snapshot_index(&self) -> MilestoneIndex {
        self.read().index
    }

    pub fn latest_snapshot_hash(&self) -> TxHash {
        self.read().hash
    }

    pub fn is_solid_entry_point(&self, hash: &TxHash) -> bool {
        self.read().is_solid_entry_point(hash)
    }

    /// Register hashes that remain referenceable after pruning.
    pub fn add_solid_entry_points<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (TxHash, MilestoneIndex)>,
    {
        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        snapshot.solid_entry_points.extend(entries);
    }

    /// Acquire the single-writer gate. Held across compute and commit.
    pub fn begin_mutation(&self) -> MutationGate<'_> {
        MutationGate {
            _guard: self.gate.lock().unwrap_or_else(PoisonError::into_inner),
            state: self,
        }
    }

    /// Earliest milestone index whose data is still retained.
    pub fn earliest_retained_index(&self) -> MilestoneIndex {
        self.earliest_retained.load(Ordering::Acquire)
    }

    pub fn local_snapshot(&self) -> Option<Snapshot> {
        self.local_snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Index and hash of the latest local snapshot.
    pub fn local_snapshot_anchor(&self) -> Option<(MilestoneIndex, TxHash)> {
        self.local_snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|snapshot| (snapshot.index, snapshot.hash))
    }

    /// Record a freshly taken local snapshot and move the retention boundary.
    pub fn set_local_snapshot(&self, snapshot: Snapshot) {
        let index = snapshot.index;
        self.add_solid_entry_points(
            snapshot
                .solid_entry_points
                .iter()
                .map(|(hash, index)| (*hash, *index)),
        );
        *self
            .local_snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        self.earliest_retained.fetch_max(index, Ordering::AcqRel);
    }
}

/// Proof that the caller is the only writer.
pub struct MutationGate<'a> {
    _guard: MutexGuard<'a, ()>,
    state: &'a LedgerState,
}

impl MutationGate<'_> {
    /// Snapshot copy that cannot change while the gate is held.
    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    /// Apply a verified diff and advance to milestone `index` in one step.
    pub fn commit(
        &self,
        index: MilestoneIndex,
        hash: TxHash,
        diff: &StateDiff,
    ) -> Result<(), LedgerError> {
        let mut snapshot = self
            .state
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let patched = snapshot
            .state
            .patched_state(diff)
            .map_err(|e| LedgerError::InconsistentSnapshotDiff {
                index,
                reason: e.to_string(),
            })?;
        if !patched.is_consistent() {
            return Err(LedgerError::InconsistentSnapshotDiff {
                index,
                reason: "patched state has negative balances".into(),
            });
        }
        snapshot.apply_milestone(index, hash, diff)
    }
}
