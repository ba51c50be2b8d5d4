//! Fundamental types for the Tangle consensus core.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! transaction hashes, ledger addresses, milestone indices, timestamps, and
//! protocol parameters.

pub mod address;
pub mod error;
pub mod hash;
pub mod index;
pub mod params;
pub mod time;

pub use address::Address;
pub use error::TangleError;
pub use hash::TxHash;
pub use index::MilestoneIndex;
pub use params::ProtocolParams;
pub use time::Timestamp;
