//! Tip selection.
//!
//! A new transaction approves two tips chosen by a biased random walk:
//!
//! 1. [`entry_point`] picks a milestone `depth` rounds behind the latest solid one.
//! 2. [`cumulative_weight`] rates every transaction reachable from it.
//! 3. [`walker`] walks from the entry point towards the tips, preferring
//!    heavier approvers, resolving bundles with [`tail_finder`] and filtering
//!    steps through [`walk_validator`].
//! 4. [`tip_selector`] repeats the walk and checks the combined tip set
//!    against the ledger.

pub mod config;
pub mod cumulative_weight;
pub mod entry_point;
pub mod error;
pub mod tail_finder;
pub mod tip_selector;
pub mod walk_validator;
pub mod walker;

pub use config::{TipSelectionConfig, WalkerKind};
pub use cumulative_weight::{CumulativeWeightCalculator, Ratings};
pub use entry_point::{EntryPointSelector, SolidMilestoneSource};
pub use error::TipSelectionError;
pub use tail_finder::TailFinder;
pub use tip_selector::TipSelector;
pub use walk_validator::WalkValidator;
pub use walker::{AlphaWalk, UniformWalk, Walker};
