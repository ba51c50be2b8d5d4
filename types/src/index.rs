//! Milestone indices.

/// Position of a milestone in the coordinator's chain.
///
/// Index `0` is never issued; it marks "unconfirmed" in transaction metadata.
pub type MilestoneIndex = u32;
