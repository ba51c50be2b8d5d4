use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] tangle_ledger::LedgerError),

    #[error("milestone error: {0}")]
    Milestone(#[from] tangle_milestone::MilestoneError),

    #[error("tip selection error: {0}")]
    TipSelection(#[from] tangle_tipselection::TipSelectionError),

    #[error("store error: {0}")]
    Store(#[from] tangle_store::StoreError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("node already started")]
    AlreadyStarted,

    #[error("shutdown timeout after {0:?}")]
    ShutdownTimeout(std::time::Duration),
}
