//! Milestone tracking and solidification.
//!
//! - [`tracker`]: per-milestone state machine (Pending → Solidifying → Solid → Confirmed).
//! - [`solidifier`]: ancestry checks, missing-transaction requests, retry backoff.
//! - [`error`]: milestone error types.

pub mod error;
pub mod solidifier;
pub mod tracker;

pub use error::MilestoneError;
pub use solidifier::{
    MilestoneSolidifier, SolidificationQueue, SolidificationRound, SolidifierConfig,
};
pub use tracker::{MilestoneState, MilestoneTracker, ObserveOutcome, TrackedMilestone};
