//! Nullable infrastructure for deterministic testing.
//!
//! External collaborators of the consensus core (graph store, transaction
//! requester) are abstracted behind traits in `tangle-store`. This crate
//! provides test-friendly implementations that:
//! - Keep everything in memory
//! - Can be inspected and driven programmatically
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod builder;
pub mod requester;
pub mod store;

pub use builder::TxBuilder;
pub use requester::NullRequester;
pub use store::NullStore;
