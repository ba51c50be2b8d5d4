//! Windowed transaction counts.
//!
//! Only transactions whose arrival time lies in `[now - max_age, now - min_age]`
//! are counted. The total walks the past cones of every tip once, sharing a
//! visited set; the confirmed count is the in-window past cone of a single
//! tip picked by ordinary tip selection.

use std::collections::HashSet;
use std::sync::Arc;

use tangle_ledger::LedgerState;
use tangle_store::{GraphStore, StoreError, TransactionStore};
use tangle_types::{Timestamp, TxHash};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSample {
    pub total: u64,
    pub confirmed: u64,
}

pub struct TransactionStats {
    store: Arc<dyn GraphStore>,
    ledger: Arc<LedgerState>,
    min_age_secs: u64,
    max_age_secs: u64,
}

impl TransactionStats {
    pub fn new(
        store: Arc<dyn GraphStore>,
        ledger: Arc<LedgerState>,
        min_age_secs: u64,
        max_age_secs: u64,
    ) -> Self {
        Self {
            store,
            ledger,
            min_age_secs,
            max_age_secs,
        }
    }

    pub fn in_window(&self, now: Timestamp, arrival: Timestamp) -> bool {
        let age = arrival.elapsed_since(now);
        arrival <= now && age >= self.min_age_secs && age <= self.max_age_secs
    }

    /// In-window transactions reachable from any tip, tips included.
    pub fn total(&self, now: Timestamp) -> Result<u64, StoreError> {
        let mut visited = HashSet::new();
        let mut count = 0;
        for tip in self.store.tips()? {
            count += self.count_cone(now, tip, &mut visited, true)?;
        }
        Ok(count)
    }

    /// In-window transactions approved, directly or not, by `supertip`.
    pub fn confirmed(&self, now: Timestamp, supertip: &TxHash) -> Result<u64, StoreError> {
        self.count_cone(now, *supertip, &mut HashSet::new(), false)
    }

    pub fn sample(&self, now: Timestamp, supertip: Option<&TxHash>) -> Result<StatsSample, StoreError> {
        let confirmed = match supertip {
            Some(tip) => self.confirmed(now, tip)?,
            None => 0,
        };
        Ok(StatsSample {
            total: self.total(now)?,
            confirmed,
        })
    }

    /// Counts in-window transactions under `start`. Descent stops at
    /// transactions that arrived before the window, since their ancestors
    /// did too.
    fn count_cone(
        &self,
        now: Timestamp,
        start: TxHash,
        visited: &mut HashSet<TxHash>,
        include_start: bool,
    ) -> Result<u64, StoreError> {
        let oldest = now.saturating_sub_secs(self.max_age_secs);
        let mut stack = vec![(start, include_start)];
        let mut count = 0;

        while let Some((hash, counted)) = stack.pop() {
            if !visited.insert(hash) || self.ledger.is_solid_entry_point(&hash) {
                continue;
            }
            let Some(record) = self.store.get_transaction(&hash)? else {
                continue;
            };
            if counted && self.in_window(now, record.arrival_time) {
                count += 1;
            }
            if record.arrival_time < oldest {
                continue;
            }
            stack.push((record.trunk, true));
            stack.push((record.branch, true));
        }
        Ok(count)
    }
}
