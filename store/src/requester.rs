//! Missing-transaction requests handed to the networking layer.

use tangle_types::TxHash;

/// Queue of transactions the node wants to fetch from neighbors.
///
/// Implemented by the networking layer; solidification only enqueues.
pub trait TransactionRequester: Send + Sync {
    /// Ask neighbors for `hash`. `milestone` requests are prioritised.
    fn request(&self, hash: &TxHash, milestone: bool);

    /// Number of outstanding requests.
    fn pending(&self) -> usize;
}
