//! Pre-built [`tracing::Span`] constructors for the node's recurring work.
//!
//! Every worker iteration runs inside one of these, so a milestone index or
//! snapshot target shows up on every event emitted below it.

use tangle_types::MilestoneIndex;
use tracing::{info_span, Span};

/// One call to `get_transactions_to_approve`.
pub fn tip_selection_span(depth: i64) -> Span {
    info_span!("tip_selection", depth)
}

/// One solidification round over every due milestone.
pub fn solidification_span(queued: usize) -> Span {
    info_span!("solidification", queued)
}

/// Applying a single milestone to the ledger.
pub fn confirmation_span(index: MilestoneIndex) -> Span {
    info_span!("confirmation", index)
}

/// Taking a local snapshot pinned at `target`.
pub fn local_snapshot_span(target: MilestoneIndex) -> Span {
    info_span!("local_snapshot", target)
}

/// One pruning batch.
pub fn pruning_span(pending: usize) -> Span {
    info_span!("pruning", pending)
}
