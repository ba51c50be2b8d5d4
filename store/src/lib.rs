//! Abstract storage traits for the Tangle consensus core.
//!
//! The persistence engine lives outside the core. Every backend (the node's
//! column-family database, the in-memory store used in tests) implements
//! these traits; the rest of the workspace depends only on the traits.

pub mod error;
pub mod milestone;
pub mod requester;
pub mod state_diff;
pub mod transaction;

pub use error::StoreError;
pub use milestone::{Milestone, MilestoneStore};
pub use requester::TransactionRequester;
pub use state_diff::StateDiffStore;
pub use transaction::{TransactionRecord, TransactionStore};

/// Everything the consensus core reads from and writes to the graph store.
///
/// Blanket-implemented for any type providing the three record families, so
/// components can hold a single `Arc<dyn GraphStore>`.
pub trait GraphStore: TransactionStore + MilestoneStore + StateDiffStore {}

impl<T> GraphStore for T where T: TransactionStore + MilestoneStore + StateDiffStore {}
