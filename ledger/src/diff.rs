//! State diffs: balance deltas produced by confirming one milestone.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tangle_store::StoreError;
use tangle_types::Address;

use crate::LedgerError;

/// Encoded size of one entry: 32-byte address followed by a big-endian `i64`.
const ENTRY_LEN: usize = 32 + 8;

/// Mapping from address to signed balance delta.
///
/// A diff produced by a valid milestone sums to zero (value conservation).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDiff {
    changes: HashMap<Address, i64>,
}

impl StateDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_changes(changes: HashMap<Address, i64>) -> Self {
        Self {
            changes: changes.into_iter().filter(|(_, delta)| *delta != 0).collect(),
        }
    }

    /// Accumulate `(address, delta)` entries; repeated addresses are summed.
    pub fn from_entries<I>(entries: I) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = (Address, i64)>,
    {
        let mut diff = Self::new();
        for (address, delta) in entries {
            diff.add(address, delta)?;
        }
        Ok(diff)
    }

    /// Accumulate `delta` onto `address`. Entries that cancel out are dropped.
    pub fn add(&mut self, address: Address, delta: i64) -> Result<(), LedgerError> {
        if delta == 0 {
            return Ok(());
        }
        let current = self.changes.get(&address).copied().unwrap_or(0);
        let updated = current
            .checked_add(delta)
            .ok_or(LedgerError::BalanceOverflow { address })?;
        if updated == 0 {
            self.changes.remove(&address);
        } else {
            self.changes.insert(address, updated);
        }
        Ok(())
    }

    /// Fold every change of `other` into this diff. On overflow `self` is
    /// left unchanged.
    pub fn merge(&mut self, other: &StateDiff) -> Result<(), LedgerError> {
        let mut merged = self.clone();
        for (address, delta) in &other.changes {
            merged.add(*address, *delta)?;
        }
        *self = merged;
        Ok(())
    }

    /// The diff that undoes this one.
    pub fn inverted(&self) -> StateDiff {
        Self {
            changes: self.changes.iter().map(|(a, d)| (*a, d.saturating_neg())).collect(),
        }
    }

    /// Sum of all deltas, widened so that it cannot overflow.
    pub fn sum(&self) -> i128 {
        self.changes.values().map(|d| i128::from(*d)).sum()
    }

    /// Whether the diff conserves value.
    pub fn is_balanced(&self) -> bool {
        self.sum() == 0
    }

    pub fn get(&self, address: &Address) -> Option<i64> {
        self.changes.get(address).copied()
    }

    pub fn changes(&self) -> &HashMap<Address, i64> {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Encode as a sequence of `address ‖ delta` entries, sorted by address.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut entries: Vec<_> = self.changes.iter().collect();
        entries.sort_by_key(|(address, _)| **address);
        let mut out = Vec::with_capacity(entries.len() * ENTRY_LEN);
        for (address, delta) in entries {
            out.extend_from_slice(address.as_bytes());
            out.extend_from_slice(&delta.to_be_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() % ENTRY_LEN != 0 {
            return Err(StoreError::Serialization(format!(
                "state diff length {} is not a multiple of {ENTRY_LEN}",
                bytes.len()
            )));
        }
        let mut diff = Self::new();
        for chunk in bytes.chunks_exact(ENTRY_LEN) {
            let address = Address::from_slice(&chunk[..32])
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let mut delta = [0u8; 8];
            delta.copy_from_slice(&chunk[32..]);
            diff.add(address, i64::from_be_bytes(delta))
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
        }
        Ok(diff)
    }
}
