use tangle_types::{Address, MilestoneIndex, TxHash};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The diff would break conservation or drive a balance negative.
    #[error("inconsistent state diff for milestone {index}: {reason}")]
    InconsistentSnapshotDiff { index: MilestoneIndex, reason: String },

    #[error("milestone {got} is out of order: expected {expected}")]
    MilestoneOutOfOrder {
        expected: MilestoneIndex,
        got: MilestoneIndex,
    },

    /// The ledger confirmed a different milestone at this index.
    #[error("milestone {index} was not applied with hash {hash}")]
    MilestoneMismatch { index: MilestoneIndex, hash: TxHash },

    #[error("balance or delta for address {address} overflows")]
    BalanceOverflow { address: Address },

    #[error("milestone {0} is not solid")]
    MilestoneNotSolid(MilestoneIndex),

    #[error("milestone {0} not found")]
    MilestoneNotFound(MilestoneIndex),

    #[error("snapshot supply {actual:?} does not match protocol supply {expected}")]
    InvalidSupply { expected: i64, actual: Option<i64> },

    #[error("negative balance for address {address}: {balance}")]
    NegativeBalance { address: Address, balance: i64 },

    #[error("state diff for milestone {0} is unavailable")]
    SnapshotUnavailable(MilestoneIndex),

    #[error("transaction {0} is missing from the store")]
    MissingTransaction(TxHash),

    #[error("snapshot serialization failed: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(#[from] tangle_store::StoreError),
}
