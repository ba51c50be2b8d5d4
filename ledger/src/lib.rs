//! Milestone-driven ledger.
//!
//! Balances change only when a milestone is confirmed. Each confirmation
//! produces a zero-sum [`StateDiff`] that is checked against the current
//! [`SnapshotState`] before it is committed through the single-writer
//! [`LedgerState`] gate. Local snapshots compact history and hand older
//! records to the [`TransactionPruner`].

pub mod diff;
pub mod error;
pub mod ledger_state;
pub mod local_snapshot;
pub mod pruning;
pub mod service;
pub mod snapshot;
pub mod state;

pub use diff::StateDiff;
pub use error::LedgerError;
pub use ledger_state::{LedgerState, MutationGate};
pub use local_snapshot::{LocalSnapshotConfig, LocalSnapshotManager, PruningListener};
pub use pruning::{PruneResult, PruningConfig, TransactionPruner};
pub use service::LedgerService;
pub use snapshot::Snapshot;
pub use state::SnapshotState;
