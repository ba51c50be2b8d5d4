//! Top-level error type shared across crates.

use thiserror::Error;

/// Errors raised while constructing or parsing fundamental types.
#[derive(Debug, Error)]
pub enum TangleError {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("serialization error: {0}")]
    Serialization(String),
}
