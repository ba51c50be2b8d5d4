//! Tangle node. Wires the consensus core into a running service.
//!
//! The node:
//! - Accepts validated milestones and tracks them to confirmation
//! - Solidifies milestone past cones, requesting missing transactions
//! - Applies confirmed milestones to the ledger in index order
//! - Answers tip selection and balance queries
//! - Takes local snapshots and prunes history behind them
//! - Collects windowed transaction stats into Prometheus gauges

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod shutdown;
pub mod stats;
pub mod tracing_spans;

pub use config::{NodeConfig, SnapshotSection, WorkerIntervals};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::{NodeStatus, TangleNode};
pub use shutdown::ShutdownController;
pub use stats::{StatsSample, TransactionStats};
