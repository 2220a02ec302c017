//! Miner configuration.
//!
//! Network settings must be identical on every miner; mining and gossip
//! knobs are local.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use blockart_core::{BlockHash, MinerNetSettings};
use blockart_sync::GossipConfig;

/// Local mining knobs.
#[derive(Debug, Clone)]
pub struct MiningConfig {
    /// Run the mining loop. A miner that does not mine still relays.
    pub enabled: bool,
    /// Most ops packed into one block.
    pub max_ops_per_block: usize,
    /// How long to wait for ops before mining a no-op block.
    pub noop_wait: Duration,
    /// Nonces tried between progress reports.
    pub nonce_batch: u64,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_ops_per_block: 64,
            noop_wait: Duration::from_millis(250),
            nonce_batch: 100_000,
        }
    }
}

/// Configuration for a miner.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Network-wide settings.
    pub settings: MinerNetSettings,
    /// Mining configuration.
    pub mining: MiningConfig,
    /// Gossip configuration.
    pub gossip: GossipConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::from_settings(MinerNetSettings::default())
    }
}

impl NodeConfig {
    /// Defaults for everything local, gossip timing derived from `settings`.
    pub fn from_settings(settings: MinerNetSettings) -> Self {
        Self {
            gossip: GossipConfig::from_settings(&settings),
            mining: MiningConfig::default(),
            settings,
        }
    }

    /// Read `BLOCKART_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = MinerNetSettings::default();

        if let Some(hex) = lookup("BLOCKART_GENESIS_HASH") {
            settings.genesis_block_hash = BlockHash::from_hex(hex.trim())
                .context("BLOCKART_GENESIS_HASH must be 64 hex characters")?;
        }
        set(&lookup, "BLOCKART_MIN_PEERS", &mut settings.min_num_miner_connections)?;
        set(&lookup, "BLOCKART_INK_PER_OP_BLOCK", &mut settings.ink_per_op_block)?;
        set(&lookup, "BLOCKART_INK_PER_NOOP_BLOCK", &mut settings.ink_per_noop_block)?;
        set(&lookup, "BLOCKART_HEARTBEAT_MS", &mut settings.heartbeat_ms)?;
        set(&lookup, "BLOCKART_POW_OP_BLOCK", &mut settings.pow_difficulty_op_block)?;
        set(&lookup, "BLOCKART_POW_NOOP_BLOCK", &mut settings.pow_difficulty_noop_block)?;
        set(&lookup, "BLOCKART_CANVAS_X_MAX", &mut settings.canvas.canvas_x_max)?;
        set(&lookup, "BLOCKART_CANVAS_Y_MAX", &mut settings.canvas.canvas_y_max)?;
        set(&lookup, "BLOCKART_ALLOW_SELF_OVERLAP", &mut settings.allow_self_overlap)?;

        // A hex digest has 64 characters.
        if settings.pow_difficulty_op_block > 64 || settings.pow_difficulty_noop_block > 64 {
            bail!("proof-of-work difficulty cannot exceed 64");
        }
        if settings.canvas.canvas_x_max == 0 || settings.canvas.canvas_y_max == 0 {
            bail!("canvas dimensions must be positive");
        }
        if settings.heartbeat_ms == 0 {
            bail!("BLOCKART_HEARTBEAT_MS must be positive");
        }

        let mut config = Self::from_settings(settings);
        set(&lookup, "BLOCKART_MINE", &mut config.mining.enabled)?;
        set(&lookup, "BLOCKART_MAX_OPS_PER_BLOCK", &mut config.mining.max_ops_per_block)?;
        let mut noop_wait_ms = config.mining.noop_wait.as_millis() as u64;
        set(&lookup, "BLOCKART_NOOP_WAIT_MS", &mut noop_wait_ms)?;
        config.mining.noop_wait = Duration::from_millis(noop_wait_ms);

        if config.mining.max_ops_per_block == 0 {
            bail!("BLOCKART_MAX_OPS_PER_BLOCK must be positive");
        }
        Ok(config)
    }
}

fn set<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}"))?;
    }
    Ok(())
}
