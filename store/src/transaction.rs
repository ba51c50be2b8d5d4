//! Transaction graph storage trait.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use tangle_types::{Address, MilestoneIndex, Timestamp, TxHash};

/// A transaction as seen by the consensus core.
///
/// Everything except `solid`, `snapshot_index` and `milestone_index` is fixed
/// when the record is first persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: TxHash,
    /// First approved transaction. Inside a bundle this is the next member.
    pub trunk: TxHash,
    /// Second approved transaction.
    pub branch: TxHash,
    pub bundle: TxHash,
    /// Position inside the bundle; `0` is the tail.
    pub current_index: u32,
    pub last_index: u32,
    pub address: Address,
    /// Signed value moved by this transaction (negative = spend).
    pub value: i64,
    pub attachment_timestamp: Timestamp,
    /// When this node first stored the transaction.
    pub arrival_time: Timestamp,
    /// Full ancestry is locally present.
    pub solid: bool,
    /// Milestone that confirmed this transaction; `0` while unconfirmed.
    pub snapshot_index: MilestoneIndex,
    /// Non-zero if this transaction is a milestone.
    pub milestone_index: MilestoneIndex,
}

impl TransactionRecord {
    pub fn is_tail(&self) -> bool {
        self.current_index == 0
    }

    pub fn is_confirmed(&self) -> bool {
        self.snapshot_index != 0
    }

    pub fn is_milestone(&self) -> bool {
        self.milestone_index != 0
    }
}

/// Trait for the transaction graph: records, approver index, tips, metadata.
pub trait TransactionStore: Send + Sync {
    /// Store a transaction and index it as an approver of its trunk and branch.
    fn put_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError>;

    fn get_transaction(&self, hash: &TxHash) -> Result<Option<TransactionRecord>, StoreError>;

    fn exists(&self, hash: &TxHash) -> Result<bool, StoreError> {
        self.get_transaction(hash).map(|tx| tx.is_some())
    }

    /// Direct approvers of `hash` (reverse edges), in ascending hash order.
    fn approvers(&self, hash: &TxHash) -> Result<Vec<TxHash>, StoreError>;

    fn is_solid(&self, hash: &TxHash) -> Result<bool, StoreError> {
        Ok(self.get_transaction(hash)?.map_or(false, |tx| tx.solid))
    }

    /// Set the solidity flag. Solidity is never cleared.
    fn set_solid(&self, hash: &TxHash) -> Result<(), StoreError>;

    /// Whether the transaction currently has no approvers.
    fn is_tip(&self, hash: &TxHash) -> Result<bool, StoreError> {
        Ok(self.exists(hash)? && self.approvers(hash)?.is_empty())
    }

    /// All transactions without approvers.
    fn tips(&self) -> Result<Vec<TxHash>, StoreError>;

    /// Record the milestone that confirmed `hash`. Passing `0` clears the mark.
    fn mark_confirmed(&self, hash: &TxHash, index: MilestoneIndex) -> Result<(), StoreError>;

    /// Transactions confirmed by exactly this milestone.
    fn confirmed_by(&self, index: MilestoneIndex) -> Result<Vec<TxHash>, StoreError>;

    /// Remove a transaction and its approver edges (pruning).
    fn delete_transaction(&self, hash: &TxHash) -> Result<(), StoreError>;

    fn transaction_count(&self) -> Result<u64, StoreError>;
}
