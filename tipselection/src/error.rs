use tangle_ledger::LedgerError;
use tangle_store::StoreError;
use tangle_types::TxHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TipSelectionError {
    #[error("invalid depth {depth}: must be between 0 and {max}")]
    InvalidDepth { depth: i64, max: i64 },

    #[error("subgraph exceeds {limit} transactions")]
    SubgraphTooLarge { limit: usize },

    #[error("bundle of {hash} is inconsistent: {reason}")]
    BundleInconsistency { hash: TxHash, reason: String },

    #[error("entry point {0} has no valid approvers and is not a tip")]
    NoApprovers(TxHash),

    #[error("no consistent tip set after {attempts} attempts")]
    TipSelectionFailed { attempts: u32 },

    #[error("reference {0} is not in the rated subtangle")]
    ReferenceNotInSubtangle(TxHash),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}
