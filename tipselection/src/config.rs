//! Tip selection configuration.

use serde::{Deserialize, Serialize};

/// Which random walk to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalkerKind {
    /// Weighted by cumulative weight, biased by `alpha`.
    #[default]
    Alpha,
    /// Every valid approver equally likely.
    Uniform,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TipSelectionConfig {
    /// Bias towards heavier approvers. `0` makes the alpha walk uniform.
    pub alpha: f64,
    /// Largest accepted depth (milestones behind the latest solid one).
    pub max_depth: i64,
    /// Largest subgraph the rating calculator will walk.
    pub max_subgraph_size: usize,
    /// Walk/verify rounds before giving up on a consistent tip set.
    pub max_attempts: u32,
    pub walker: WalkerKind,
}

impl Default for TipSelectionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.001,
            max_depth: 15,
            max_subgraph_size: 100_000,
            max_attempts: 10,
            walker: WalkerKind::Alpha,
        }
    }
}
