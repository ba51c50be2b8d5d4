//! Nullable requester: record transaction requests without sending them.

use std::sync::Mutex;

use tangle_store::TransactionRequester;
use tangle_types::TxHash;

/// A requester that records every request instead of asking neighbors.
#[derive(Default)]
pub struct NullRequester {
    requests: Mutex<Vec<(TxHash, bool)>>,
}

impl NullRequester {
    pub fn new() -> Self {
        Self::default()
    }

    /// All hashes requested so far, in request order (for assertions).
    pub fn requested(&self) -> Vec<TxHash> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(hash, _)| *hash)
            .collect()
    }

    /// Whether `hash` was requested with milestone priority.
    pub fn requested_as_milestone(&self, hash: &TxHash) -> bool {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .any(|(h, milestone)| h == hash && *milestone)
    }

    /// Forget all recorded requests.
    pub fn reset(&self) {
        self.requests.lock().unwrap().clear();
    }
}

impl TransactionRequester for NullRequester {
    fn request(&self, hash: &TxHash, milestone: bool) {
        let mut requests = self.requests.lock().unwrap();
        if !requests.iter().any(|(h, _)| h == hash) {
            requests.push((*hash, milestone));
        }
    }

    fn pending(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_requests_are_collapsed() {
        let requester = NullRequester::new();
        let hash = TxHash::new([3u8; 32]);
        requester.request(&hash, false);
        requester.request(&hash, true);
        assert_eq!(requester.pending(), 1);
        assert_eq!(requester.requested(), vec![hash]);
        assert!(!requester.requested_as_milestone(&hash));
    }

    #[test]
    fn reset_clears_requests() {
        let requester = NullRequester::new();
        requester.request(&TxHash::new([1u8; 32]), true);
        requester.reset();
        assert_eq!(requester.pending(), 0);
    }
}
