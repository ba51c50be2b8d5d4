use tangle_store::StoreError;
use tangle_types::MilestoneIndex;
use thiserror::Error;

use crate::MilestoneState;

#[derive(Debug, Error)]
pub enum MilestoneError {
    #[error("milestone {index} did not become solid after {attempts} attempts")]
    SolidificationTimeout {
        index: MilestoneIndex,
        attempts: u32,
    },

    #[error("milestone {index}: illegal transition {from:?} -> {to:?}")]
    InvalidTransition {
        index: MilestoneIndex,
        from: MilestoneState,
        to: MilestoneState,
    },

    #[error("milestone {0} is not tracked")]
    UnknownMilestone(MilestoneIndex),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}
