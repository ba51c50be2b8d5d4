//! Walk validation: which tails a walk may step onto.

use std::collections::HashSet;
use std::sync::Arc;

use tangle_ledger::LedgerState;
use tangle_store::{GraphStore, TransactionStore};
use tangle_types::TxHash;

use crate::TipSelectionError;

/// Rejects tails that are missing, not solid, or excluded by the caller.
/// Solid entry points and confirmed transactions are always valid.
pub struct WalkValidator {
    store: Arc<dyn GraphStore>,
    ledger: Arc<LedgerState>,
    excluded: HashSet<TxHash>,
}

impl WalkValidator {
    pub fn new(store: Arc<dyn GraphStore>, ledger: Arc<LedgerState>, excluded: HashSet<TxHash>) -> Self {
        Self {
            store,
            ledger,
            excluded,
        }
    }

    pub fn is_valid(&self, hash: &TxHash) -> Result<bool, TipSelectionError> {
        if self.ledger.is_solid_entry_point(hash) {
            return Ok(true);
        }
        if self.excluded.contains(hash) {
            return Ok(false);
        }
        let Some(record) = self.store.get_transaction(hash)? else {
            return Ok(false);
        };
        Ok(record.is_confirmed() || record.solid)
    }

    pub fn excluded(&self) -> &HashSet<TxHash> {
        &self.excluded
    }
}
