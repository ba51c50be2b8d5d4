//! Snapshot state: the balance table at a confirmed point.
//!
//! The live state is mutated only by applying a diff that already passed
//! [`SnapshotState::patched_state`] + [`SnapshotState::is_consistent`]. After
//! application, addresses whose balance reaches zero are removed from the
//! table; reading them afterwards yields `None`, exactly like an address
//! that never held funds.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tangle_types::{Address, MilestoneIndex};

use crate::{LedgerError, StateDiff};

/// Mapping from address to balance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotState {
    balances: HashMap<Address, i64>,
}

impl SnapshotState {
    /// Build a state from a balance table. Zero entries are dropped.
    pub fn new(balances: HashMap<Address, i64>) -> Self {
        Self {
            balances: balances.into_iter().filter(|(_, b)| *b != 0).collect(),
        }
    }

    pub fn get_balance(&self, address: &Address) -> Option<i64> {
        self.balances.get(address).copied()
    }

    pub fn balances(&self) -> &HashMap<Address, i64> {
        &self.balances
    }

    pub fn address_count(&self) -> usize {
        self.balances.len()
    }

    /// No address holds a negative balance.
    pub fn is_consistent(&self) -> bool {
        self.inconsistent_addresses().is_empty()
    }

    /// Addresses with a negative balance.
    pub fn inconsistent_addresses(&self) -> Vec<(Address, i64)> {
        let mut result: Vec<_> = self
            .balances
            .iter()
            .filter(|(_, balance)| **balance < 0)
            .map(|(address, balance)| (*address, *balance))
            .collect();
        result.sort();
        for (address, balance) in &result {
            tracing::debug!(%address, balance, "negative balance in snapshot state");
        }
        result
    }

    /// Sum of all balances, or `None` on overflow.
    pub fn total(&self) -> Option<i64> {
        self.balances
            .values()
            .try_fold(0i64, |acc, balance| acc.checked_add(*balance))
    }

    pub fn has_correct_supply(&self, supply: i64) -> bool {
        self.total() == Some(supply)
    }

    /// Replace the whole table with `new_state`.
    pub fn update(&mut self, new_state: &SnapshotState) {
        self.balances.clear();
        self.balances.extend(new_state.balances.iter());
    }

    /// The state that would result from applying `diff`. Never mutates `self`.
    ///
    /// Fails with `BalanceOverflow` when a balance would leave the `i64` range.
    pub fn patched_state(&self, diff: &StateDiff) -> Result<SnapshotState, LedgerError> {
        let mut patched = self.clone();
        patched.patch(diff)?;
        Ok(patched)
    }

    /// Apply a balanced diff in place.
    ///
    /// Callers must have checked the patched state for consistency first;
    /// an unbalanced diff is refused without touching the table.
    pub fn apply_state_diff(
        &mut self,
        index: MilestoneIndex,
        diff: &StateDiff,
    ) -> Result<(), LedgerError> {
        if !diff.is_balanced() {
            return Err(LedgerError::InconsistentSnapshotDiff {
                index,
                reason: format!("diff sums to {}", diff.sum()),
            });
        }
        *self = self
            .patched_state(diff)
            .map_err(|e| LedgerError::InconsistentSnapshotDiff {
                index,
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn patch(&mut self, diff: &StateDiff) -> Result<(), LedgerError> {
        for (address, delta) in diff.changes() {
            let current = self.balances.get(address).copied().unwrap_or(0);
            let balance = current
                .checked_add(*delta)
                .ok_or(LedgerError::BalanceOverflow { address: *address })?;
            if balance == 0 {
                self.balances.remove(address);
            } else {
                self.balances.insert(*address, balance);
            }
        }
        Ok(())
    }
}
