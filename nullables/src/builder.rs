//! Builder for transaction records used in tests and simulations.

use tangle_store::TransactionRecord;
use tangle_types::{Address, MilestoneIndex, Timestamp, TxHash};

/// Fluent builder for [`TransactionRecord`].
///
/// Defaults: single-transaction bundle (tail), zero value, solid,
/// unconfirmed, not a milestone, both parents = genesis.
pub struct TxBuilder {
    record: TransactionRecord,
}

impl TxBuilder {
    pub fn new(hash: TxHash) -> Self {
        Self {
            record: TransactionRecord {
                hash,
                trunk: TxHash::ZERO,
                branch: TxHash::ZERO,
                bundle: hash,
                current_index: 0,
                last_index: 0,
                address: Address::new([0u8; 32]),
                value: 0,
                attachment_timestamp: Timestamp::EPOCH,
                arrival_time: Timestamp::EPOCH,
                solid: true,
                snapshot_index: 0,
                milestone_index: 0,
            },
        }
    }

    /// Shorthand: hash derived from a label.
    pub fn named(label: &str) -> Self {
        Self::new(TxHash::digest(label.as_bytes()))
    }

    pub fn parents(mut self, trunk: TxHash, branch: TxHash) -> Self {
        self.record.trunk = trunk;
        self.record.branch = branch;
        self
    }

    pub fn bundle(mut self, bundle: TxHash, current_index: u32, last_index: u32) -> Self {
        self.record.bundle = bundle;
        self.record.current_index = current_index;
        self.record.last_index = last_index;
        self
    }

    pub fn value(mut self, address: Address, value: i64) -> Self {
        self.record.address = address;
        self.record.value = value;
        self
    }

    pub fn arrival(mut self, at: Timestamp) -> Self {
        self.record.arrival_time = at;
        self.record.attachment_timestamp = at;
        self
    }

    pub fn solid(mut self, solid: bool) -> Self {
        self.record.solid = solid;
        self
    }

    pub fn confirmed_by(mut self, index: MilestoneIndex) -> Self {
        self.record.snapshot_index = index;
        self
    }

    pub fn milestone(mut self, index: MilestoneIndex) -> Self {
        self.record.milestone_index = index;
        self
    }

    pub fn build(self) -> TransactionRecord {
        self.record
    }
}
