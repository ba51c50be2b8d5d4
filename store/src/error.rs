//! Errors reported by graph-store backends.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A record the caller required is absent.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A write would overwrite an immutable record with different content.
    #[error("conflicting record for key: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("graph store is corrupted: {0}")]
    Corruption(String),

    /// A writer panicked while holding a store lock.
    #[error("store lock poisoned: {0}")]
    Poisoned(&'static str),
}
