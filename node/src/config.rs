//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;

use tangle_ledger::{LocalSnapshotConfig, PruningConfig};
use tangle_milestone::SolidifierConfig;
use tangle_tipselection::TipSelectionConfig;
use tangle_types::ProtocolParams;

use crate::{LogFormat, NodeError};

/// Configuration for a Tangle node.
///
/// Loaded from a TOML file via [`NodeConfig::from_toml_file`] or built
/// programmatically. Every field has a default, so an empty file is valid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Protocol parameters come from the network's genesis, not the file.
    #[serde(skip)]
    pub params: ProtocolParams,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Filter directive, e.g. `"info"` or `"info,tangle_ledger=debug"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between two transaction stats refreshes.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,

    /// Transactions younger than this are not counted yet.
    #[serde(default = "default_stats_min_age_secs")]
    pub stats_min_age_secs: u64,

    /// Transactions older than this are no longer counted.
    #[serde(default = "default_stats_max_age_secs")]
    pub stats_max_age_secs: u64,

    #[serde(default)]
    pub tip_selection: TipSelectionConfig,

    #[serde(default)]
    pub milestone: SolidifierConfig,

    #[serde(default)]
    pub snapshot: SnapshotSection,

    #[serde(default)]
    pub workers: WorkerIntervals,
}

/// The `[snapshot]` table: local snapshots and the pruning they trigger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSection {
    #[serde(default)]
    pub local: LocalSnapshotConfig,
    #[serde(default)]
    pub pruning: PruningConfig,
}

/// How often each background worker wakes up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerIntervals {
    pub solidification_ms: u64,
    pub confirmation_ms: u64,
    pub local_snapshot_secs: u64,
    pub pruning_ms: u64,
}

impl Default for WorkerIntervals {
    fn default() -> Self {
        Self {
            solidification_ms: 500,
            confirmation_ms: 500,
            local_snapshot_secs: 10,
            pruning_ms: 1_000,
        }
    }
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stats_interval_secs() -> u64 {
    10
}

fn default_stats_min_age_secs() -> u64 {
    5
}

fn default_stats_max_age_secs() -> u64 {
    120
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Reject combinations the workers cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.tip_selection.max_depth < 0 {
            return Err(NodeError::Config("tip_selection.max_depth must not be negative".into()));
        }
        if !self.tip_selection.alpha.is_finite() || self.tip_selection.alpha < 0.0 {
            return Err(NodeError::Config("tip_selection.alpha must be a non-negative number".into()));
        }
        if self.stats_min_age_secs >= self.stats_max_age_secs {
            return Err(NodeError::Config(format!(
                "stats window is empty: min age {}s, max age {}s",
                self.stats_min_age_secs, self.stats_max_age_secs
            )));
        }
        if self.snapshot.local.enabled && self.snapshot.local.interval == 0 {
            return Err(NodeError::Config("snapshot.local.interval must be at least 1".into()));
        }
        let w = &self.workers;
        if [w.solidification_ms, w.confirmation_ms, w.local_snapshot_secs, w.pruning_ms]
            .contains(&0)
            || self.stats_interval_secs == 0
        {
            return Err(NodeError::Config("worker intervals must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            params: ProtocolParams::default(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            tip_selection: TipSelectionConfig::default(),
            milestone: SolidifierConfig::default(),
            snapshot: SnapshotSection::default(),
            workers: WorkerIntervals::default(),
            stats_interval_secs: default_stats_interval_secs(),
            stats_min_age_secs: default_stats_min_age_secs(),
            stats_max_age_secs: default_stats_max_age_secs(),
        }
    }
}
