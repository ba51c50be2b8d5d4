//! Protocol parameters fixed for a given network.

use serde::{Deserialize, Serialize};

use crate::{MilestoneIndex, TxHash};

/// Total token supply, constant across every confirmed ledger state.
pub const DEFAULT_TOTAL_SUPPLY: i64 = 2_779_530_283_277_761;

/// Parameters every node of a network agrees on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Sum of all balances at every confirmed point.
    pub total_supply: i64,

    /// Index of the initial snapshot. The first milestone to confirm is
    /// `initial_milestone_index + 1`.
    pub initial_milestone_index: MilestoneIndex,

    /// Anchor hash of the initial snapshot (genesis).
    pub genesis_hash: TxHash,
}

impl ProtocolParams {
    pub fn mainnet_defaults() -> Self {
        Self {
            total_supply: DEFAULT_TOTAL_SUPPLY,
            initial_milestone_index: 0,
            genesis_hash: TxHash::ZERO,
        }
    }

    /// Parameters with a custom supply, for local networks and tests.
    pub fn with_supply(total_supply: i64) -> Self {
        Self {
            total_supply,
            ..Self::mainnet_defaults()
        }
    }
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self::mainnet_defaults()
    }
}
