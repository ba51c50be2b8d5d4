//! Bundle tail resolution.
//!
//! Inside a bundle each transaction's trunk is the next member, so the member
//! before it (index − 1) is found among its approvers. Following those edges
//! ends at the tail (`current_index == 0`).

use std::collections::HashSet;
use std::sync::Arc;

use tangle_store::{GraphStore, TransactionRecord, TransactionStore};
use tangle_types::TxHash;

use crate::TipSelectionError;

pub struct TailFinder {
    store: Arc<dyn GraphStore>,
}

impl TailFinder {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn find_tail(&self, hash: &TxHash) -> Result<TxHash, TipSelectionError> {
        let mut current = self.record(hash, "transaction missing")?;
        let max_hops = u64::from(current.last_index) + 1;
        let mut visited = HashSet::from([current.hash]);
        let mut hops = 0u64;

        while !current.is_tail() {
            hops += 1;
            if hops > max_hops {
                return Err(inconsistent(hash, "more hops than bundle members"));
            }
            let previous = self.predecessor(&current)?.ok_or_else(|| {
                inconsistent(hash, format!("no member at index {}", current.current_index - 1))
            })?;
            if !visited.insert(previous.hash) {
                return Err(inconsistent(hash, "cycle inside bundle"));
            }
            current = previous;
        }
        Ok(current.hash)
    }

    /// The approver that is the bundle member right before `record`.
    fn predecessor(&self, record: &TransactionRecord) -> Result<Option<TransactionRecord>, TipSelectionError> {
        for approver in self.store.approvers(&record.hash)? {
            let Some(candidate) = self.store.get_transaction(&approver)? else {
                continue;
            };
            if candidate.bundle == record.bundle
                && candidate.current_index + 1 == record.current_index
            {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn record(&self, hash: &TxHash, reason: &str) -> Result<TransactionRecord, TipSelectionError> {
        self.store
            .get_transaction(hash)?
            .ok_or_else(|| inconsistent(hash, reason))
    }
}

fn inconsistent(hash: &TxHash, reason: impl Into<String>) -> TipSelectionError {
    TipSelectionError::BundleInconsistency {
        hash: *hash,
        reason: reason.into(),
    }
}
