//! Proof-of-work mining.
//!
//! ```text
//! Idle -> Assembling -> Searching -> Found -> Idle
//!                           |
//!                           +-> Preempted -> Assembling
//! ```
//!
//! The nonce search is CPU-bound and runs on a blocking thread. It checks a
//! cancel flag before every nonce, so a new head stops it promptly.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use blockart_core::{meets_difficulty, Block, BlockTemplate, Keypair, MinerNetSettings, PublicKey};
use blockart_store::ChainTree;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::MiningConfig;
use crate::error::{NodeError, Result};
use crate::pool::PendingPool;

/// Where the miner is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    Idle,
    Assembling,
    Searching,
    Found,
    Preempted,
}

/// How a search ended.
#[derive(Debug)]
pub enum MineOutcome {
    /// A sealed block meeting its difficulty.
    Found(Block),
    /// The search was abandoned.
    Preempted,
}

/// Builds candidate blocks and searches for their nonce.
pub struct MiningEngine {
    keypair: Keypair,
    settings: MinerNetSettings,
    config: MiningConfig,
    state: watch::Sender<MinerState>,
}

impl MiningEngine {
    pub fn new(keypair: Keypair, settings: MinerNetSettings, config: MiningConfig) -> Self {
        let (state, _) = watch::channel(MinerState::Idle);
        Self {
            keypair,
            settings,
            config,
            state,
        }
    }

    pub fn miner(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn config(&self) -> &MiningConfig {
        &self.config
    }

    pub fn state(&self) -> MinerState {
        *self.state.borrow()
    }

    /// Follow state transitions.
    pub fn subscribe(&self) -> watch::Receiver<MinerState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: MinerState) {
        self.state.send_replace(state);
    }

    /// A candidate on top of the current head, holding the oldest pending ops.
    ///
    /// The pool must have been rebased onto `tree`'s head.
    pub fn assemble(&self, tree: &ChainTree, pool: &PendingPool) -> BlockTemplate {
        self.set_state(MinerState::Assembling);
        let head = tree.head();
        let ops = pool.batch(self.config.max_ops_per_block);
        debug!(parent = %head.hash, height = head.height + 1, ops = ops.len(), "assembled candidate");
        BlockTemplate::new(head.hash, head.height + 1, ops, self.keypair.public_key())
    }

    /// Try nonces from `start` until one meets `difficulty` or `cancel` is set.
    pub fn search(
        template: &BlockTemplate,
        difficulty: u8,
        start: u64,
        cancel: &AtomicBool,
        report_every: u64,
    ) -> Option<u64> {
        let report_every = report_every.max(1);
        let mut nonce = start;
        let mut tried: u64 = 0;
        loop {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            if meets_difficulty(&template.hash_with_nonce(nonce), difficulty) {
                return Some(nonce);
            }
            nonce = nonce.wrapping_add(1);
            tried += 1;
            if tried % report_every == 0 {
                debug!(tried, "still searching");
            }
        }
    }

    /// Search for the template's nonce until found or `preempt` completes.
    #[tracing::instrument(skip(self, template, preempt), fields(height = template.height, ops = template.ops.len()))]
    pub async fn mine<F>(&self, template: BlockTemplate, preempt: F) -> Result<MineOutcome>
    where
        F: Future<Output = ()> + Send,
    {
        let difficulty = self.settings.difficulty_for(!template.is_noop());
        self.set_state(MinerState::Searching);

        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let start: u64 = rand::random();
        let report_every = self.config.nonce_batch;
        let mut search = tokio::task::spawn_blocking(move || {
            let nonce = Self::search(&template, difficulty, start, &flag, report_every);
            (template, nonce)
        });

        tokio::pin!(preempt);
        let joined = tokio::select! {
            joined = &mut search => joined,
            () = &mut preempt => {
                cancel.store(true, Ordering::Relaxed);
                let _ = search.await;
                self.set_state(MinerState::Preempted);
                debug!("search preempted");
                return Ok(MineOutcome::Preempted);
            }
        };

        let (template, nonce) = joined.map_err(|e| NodeError::Task(e.to_string()))?;
        let Some(nonce) = nonce else {
            self.set_state(MinerState::Preempted);
            return Ok(MineOutcome::Preempted);
        };

        let block = template.seal(nonce, &self.keypair);
        self.set_state(MinerState::Found);
        info!(block = %block.hash, height = block.height, ops = block.ops.len(), "mined block");
        Ok(MineOutcome::Found(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockart_core::BlockHash;

    fn settings(difficulty: u8) -> MinerNetSettings {
        MinerNetSettings {
            pow_difficulty_op_block: difficulty,
            pow_difficulty_noop_block: difficulty,
            ..MinerNetSettings::default()
        }
    }

    fn engine(difficulty: u8) -> MiningEngine {
        MiningEngine::new(
            Keypair::from_seed(&[7; 32]),
            settings(difficulty),
            MiningConfig::default(),
        )
    }

    #[test]
    fn test_search_meets_difficulty() {
        let kp = Keypair::from_seed(&[7; 32]);
        let template = BlockTemplate::new(BlockHash::ZERO, 1, vec![], kp.public_key());
        let cancel = AtomicBool::new(false);

        let nonce = MiningEngine::search(&template, 2, 0, &cancel, 1000).unwrap();
        assert!(meets_difficulty(&template.hash_with_nonce(nonce), 2));
    }

    #[test]
    fn test_search_stops_when_cancelled() {
        let kp = Keypair::from_seed(&[7; 32]);
        let template = BlockTemplate::new(BlockHash::ZERO, 1, vec![], kp.public_key());
        let cancel = AtomicBool::new(true);
        assert_eq!(MiningEngine::search(&template, 64, 0, &cancel, 1000), None);
    }

    #[tokio::test]
    async fn test_mine_seals_a_valid_block() {
        let engine = engine(1);
        let tree = ChainTree::new(settings(1));
        let pool = PendingPool::new(*tree.validator(), &tree.head_ledger());

        let template = engine.assemble(&tree, &pool);
        assert_eq!(engine.state(), MinerState::Assembling);

        let outcome = engine.mine(template, std::future::pending()).await.unwrap();
        let MineOutcome::Found(block) = outcome else {
            panic!("expected a block");
        };
        assert_eq!(engine.state(), MinerState::Found);
        assert_eq!(block.prev_hash, tree.genesis());
        assert_eq!(block.height, 1);
        assert!(block.verify_hash().is_ok());
        assert!(block.verify_work(1).is_ok());
        assert!(block.verify_signature().is_ok());
    }

    #[tokio::test]
    async fn test_mine_is_preempted() {
        // Unreachable difficulty: only preemption can end the search.
        let engine = engine(40);
        let tree = ChainTree::new(settings(40));
        let pool = PendingPool::new(*tree.validator(), &tree.head_ledger());
        let template = engine.assemble(&tree, &pool);

        let preempt = tokio::time::sleep(std::time::Duration::from_millis(20));
        let outcome = engine.mine(template, preempt).await.unwrap();
        assert!(matches!(outcome, MineOutcome::Preempted));
        assert_eq!(engine.state(), MinerState::Preempted);
    }
}
