//! Prometheus metrics for the Tangle node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`]. Metrics are collected
//! in-process only; whoever embeds the node decides whether and how to
//! expose the registry.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Histogram, HistogramOpts, IntCounter, IntGauge, Opts,
    Registry,
};

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub milestones_observed: IntCounter,
    pub milestones_solidified: IntCounter,
    pub milestones_confirmed: IntCounter,
    /// Milestones quarantined because their diff broke a ledger invariant.
    pub milestones_rejected: IntCounter,
    pub solidification_timeouts: IntCounter,
    pub tip_selections: IntCounter,
    pub tip_selection_failures: IntCounter,
    pub local_snapshots_taken: IntCounter,
    pub transactions_pruned: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub latest_milestone_index: IntGauge,
    pub latest_solid_milestone_index: IntGauge,
    pub confirmed_milestone_index: IntGauge,
    pub earliest_retained_milestone_index: IntGauge,
    pub tips: IntGauge,
    /// Transactions that arrived inside the stats window.
    pub window_transactions: IntGauge,
    /// Of those, the ones in the past cone of a freshly selected tip.
    pub window_confirmed_transactions: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    pub tip_selection_time_ms: Histogram,
    pub milestone_apply_time_ms: Histogram,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new [`Registry`].
    ///
    /// Metric names are static and unique, so registration cannot fail.
    pub fn new() -> Self {
        let registry = Registry::new();

        macro_rules! counter {
            ($name:expr, $help:expr) => {
                register_int_counter_with_registry!(Opts::new($name, $help), registry)
                    .expect("static counter registration")
            };
        }
        macro_rules! gauge {
            ($name:expr, $help:expr) => {
                register_int_gauge_with_registry!(Opts::new($name, $help), registry)
                    .expect("static gauge registration")
            };
        }

        let milestones_observed =
            counter!("tangle_milestones_observed_total", "Milestones received from validation");
        let milestones_solidified =
            counter!("tangle_milestones_solidified_total", "Milestones whose past cone became complete");
        let milestones_confirmed =
            counter!("tangle_milestones_confirmed_total", "Milestones applied to the ledger");
        let milestones_rejected =
            counter!("tangle_milestones_rejected_total", "Milestones rejected for an inconsistent diff");
        let solidification_timeouts =
            counter!("tangle_solidification_timeouts_total", "Solidification attempts that ran out of retries");
        let tip_selections = counter!("tangle_tip_selections_total", "Successful tip selections");
        let tip_selection_failures =
            counter!("tangle_tip_selection_failures_total", "Failed tip selections");
        let local_snapshots_taken =
            counter!("tangle_local_snapshots_total", "Local snapshots taken");
        let transactions_pruned =
            counter!("tangle_transactions_pruned_total", "Transactions deleted by pruning");

        let latest_milestone_index =
            gauge!("tangle_latest_milestone_index", "Highest milestone index observed");
        let latest_solid_milestone_index =
            gauge!("tangle_latest_solid_milestone_index", "Highest solid milestone index");
        let confirmed_milestone_index =
            gauge!("tangle_confirmed_milestone_index", "Index of the ledger's current snapshot");
        let earliest_retained_milestone_index = gauge!(
            "tangle_earliest_retained_milestone_index",
            "Oldest milestone whose history is still stored"
        );
        let tips = gauge!("tangle_tips", "Current number of tips");
        let window_transactions = gauge!(
            "tangle_window_transactions",
            "Transactions that arrived inside the stats window"
        );
        let window_confirmed_transactions = gauge!(
            "tangle_window_confirmed_transactions",
            "Window transactions referenced by a selected tip"
        );

        let tip_selection_time_ms = register_histogram_with_registry!(
            HistogramOpts::new("tangle_tip_selection_time_ms", "Tip selection time in milliseconds")
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0]),
            registry
        )
        .expect("static histogram registration");

        let milestone_apply_time_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "tangle_milestone_apply_time_ms",
                "Time to apply one milestone to the ledger in milliseconds"
            )
            .buckets(vec![0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]),
            registry
        )
        .expect("static histogram registration");

        Self {
            registry,
            milestones_observed,
            milestones_solidified,
            milestones_confirmed,
            milestones_rejected,
            solidification_timeouts,
            tip_selections,
            tip_selection_failures,
            local_snapshots_taken,
            transactions_pruned,
            latest_milestone_index,
            latest_solid_milestone_index,
            confirmed_milestone_index,
            earliest_retained_milestone_index,
            tips,
            window_transactions,
            window_confirmed_transactions,
            tip_selection_time_ms,
            milestone_apply_time_ms,
        }
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
