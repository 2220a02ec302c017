//! Network-wide settings shared by every miner.
//!
//! Every node on a network must run with identical settings: they decide
//! block validity, ink rewards and canvas bounds.

use serde::{Deserialize, Serialize};

use crate::types::BlockHash;

/// Canvas dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSettings {
    pub canvas_x_max: u32,
    pub canvas_y_max: u32,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            canvas_x_max: 1024,
            canvas_y_max: 1024,
        }
    }
}

/// Settings for one BlockArt network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerNetSettings {
    /// Hash of the well-known, empty first block.
    pub genesis_block_hash: BlockHash,

    /// Below this many neighbours a miner asks for more.
    pub min_num_miner_connections: u8,

    /// Ink credited to the miner of a block with ops.
    pub ink_per_op_block: u32,

    /// Ink credited to the miner of a block without ops.
    pub ink_per_noop_block: u32,

    /// Milliseconds between heartbeats to the discovery server.
    pub heartbeat_ms: u32,

    /// Trailing zero hex characters required of an op block's hash.
    pub pow_difficulty_op_block: u8,

    /// Trailing zero hex characters required of a no-op block's hash.
    pub pow_difficulty_noop_block: u8,

    pub canvas: CanvasSettings,

    /// When set, a shape may overlap other live shapes of the same owner.
    pub allow_self_overlap: bool,
}

impl MinerNetSettings {
    /// Required difficulty for a block with or without ops.
    pub fn difficulty_for(&self, has_ops: bool) -> u8 {
        if has_ops {
            self.pow_difficulty_op_block
        } else {
            self.pow_difficulty_noop_block
        }
    }

    /// Ink reward for mining a block with or without ops.
    pub fn reward_for(&self, has_ops: bool) -> u64 {
        if has_ops {
            u64::from(self.ink_per_op_block)
        } else {
            u64::from(self.ink_per_noop_block)
        }
    }
}

impl Default for MinerNetSettings {
    fn default() -> Self {
        Self {
            genesis_block_hash: BlockHash::from_bytes(crate::crypto::domain_hash(
                crate::crypto::BLOCK_HASH_CONTEXT,
                b"genesis",
            )),
            min_num_miner_connections: 2,
            ink_per_op_block: 50,
            ink_per_noop_block: 25,
            heartbeat_ms: 2000,
            pow_difficulty_op_block: 2,
            pow_difficulty_noop_block: 2,
            canvas: CanvasSettings::default(),
            allow_self_overlap: false,
        }
    }
}
