//! Per-milestone state diff storage trait.

use crate::StoreError;
use tangle_types::MilestoneIndex;

/// Trait for persisted ledger diffs, keyed by the milestone that produced them.
///
/// Values are opaque bytes; the ledger crate owns the encoding.
pub trait StateDiffStore: Send + Sync {
    fn put_state_diff(&self, index: MilestoneIndex, bytes: &[u8]) -> Result<(), StoreError>;

    fn get_state_diff(&self, index: MilestoneIndex) -> Result<Option<Vec<u8>>, StoreError>;

    fn delete_state_diff(&self, index: MilestoneIndex) -> Result<(), StoreError>;
}
