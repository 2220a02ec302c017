//! Test fixtures and helpers.
//!
//! A fixture owns a miner key and a [`ChainTree`] under easy proof of work,
//! so tests can mine real blocks in microseconds.

use std::sync::atomic::AtomicBool;

use blockart::MiningEngine;
use blockart_core::{
    Block, BlockError, BlockHash, BlockTemplate, Keypair, MinerNetSettings, Op, PublicKey,
    ShapeId,
};
use blockart_store::ChainTree;

/// Network settings with difficulty 1 for both block kinds.
pub fn easy_settings() -> MinerNetSettings {
    MinerNetSettings {
        pow_difficulty_op_block: 1,
        pow_difficulty_noop_block: 1,
        ..MinerNetSettings::default()
    }
}

/// Path data for an axis-aligned square.
pub fn square_svg(x: u32, y: u32, side: u32) -> String {
    format!("M {x} {y} h {side} v {side} h -{side} Z")
}

/// Path data for a single segment.
pub fn segment_svg(x1: u32, y1: u32, x2: u32, y2: u32) -> String {
    format!("M {x1} {y1} L {x2} {y2}")
}

/// Seal a block on `parent` at the difficulty its kind requires.
pub fn seal_on(
    parent: &Block,
    ops: Vec<Op>,
    miner: &Keypair,
    settings: &MinerNetSettings,
) -> Block {
    let difficulty = settings.difficulty_for(!ops.is_empty());
    let template = BlockTemplate::new(parent.hash, parent.height + 1, ops, miner.public_key());
    let cancel = AtomicBool::new(false);
    let nonce = MiningEngine::search(&template, difficulty, 0, &cancel, u64::MAX)
        .unwrap_or_default();
    template.seal(nonce, miner)
}

/// A miner key and its chain.
pub struct TestFixture {
    pub keypair: Keypair,
    pub tree: ChainTree,
}

impl TestFixture {
    /// Create a new fixture with a random keypair.
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::with_settings(seed, easy_settings())
    }

    pub fn with_settings(seed: [u8; 32], settings: MinerNetSettings) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
            tree: ChainTree::new(settings),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn settings(&self) -> &MinerNetSettings {
        self.tree.settings()
    }

    pub fn ink(&self) -> u64 {
        self.tree.head_ledger().balance(&self.public_key())
    }

    /// An add op for a path, signed by this fixture.
    pub fn add(&self, svg: &str, fill: &str, stroke: &str) -> Op {
        Op::add_path(&self.keypair, svg, fill, stroke, 0)
    }

    pub fn delete(&self, shape: ShapeId) -> Op {
        Op::delete(&self.keypair, shape)
    }

    /// Seal a block on `parent` without appending it.
    pub fn seal(&self, parent: &BlockHash, ops: Vec<Op>) -> Block {
        let parent = match self.tree.get(parent) {
            Some(block) => block.clone(),
            None => panic!("unknown parent {parent}"),
        };
        seal_on(&parent, ops, &self.keypair, self.settings())
    }

    /// Mine `ops` on the current head and append the block.
    pub fn mine(&mut self, ops: Vec<Op>) -> Result<Block, BlockError> {
        let block = self.seal(&self.tree.head_hash(), ops);
        self.tree.append(block.clone())?;
        Ok(block)
    }

    /// Mine `count` no-op blocks, earning ink.
    pub fn mine_empty(&mut self, count: usize) -> Vec<Block> {
        (0..count)
            .filter_map(|_| self.mine(Vec::new()).ok())
            .collect()
    }

    /// Every block on the canonical chain, genesis first.
    pub fn canonical(&self) -> Vec<Block> {
        self.tree
            .path_from_genesis(&self.tree.head_hash())
            .unwrap_or_default()
            .into_iter()
            .map(|block| (*block).clone())
            .collect()
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple test fixtures for multi-party tests.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            TestFixture::with_seed(seed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockart_core::{CanvasError, Ledger};
    use blockart_store::{BlockStore, BlockStoreExt, MemoryBlockStore};

    #[test]
    fn test_fixture_earns_and_spends_ink() {
        let mut fixture = TestFixture::with_seed([1; 32]);
        fixture.mine_empty(4);
        assert_eq!(fixture.ink(), 100);

        let op = fixture.add(&square_svg(0, 0, 5), "red", "red");
        fixture.mine(vec![op]).unwrap();
        // 25 spent on the square, 50 earned for the op block.
        assert_eq!(fixture.ink(), 125);
        assert_eq!(fixture.tree.head().height, 5);
    }

    #[test]
    fn test_invalid_op_rejects_block() {
        let mut fixture = TestFixture::with_seed([1; 32]);
        let op = fixture.add(&segment_svg(0, 0, 10, 0), "transparent", "black");

        let err = fixture.mine(vec![op]).unwrap_err();
        assert!(matches!(
            err,
            BlockError::InvalidOp {
                source: CanvasError::InsufficientInk(0),
                ..
            }
        ));
        assert_eq!(fixture.tree.head().height, 0);
    }

    #[test]
    fn test_canonical_replays_to_head_ledger() {
        let mut fixture = TestFixture::with_seed([2; 32]);
        fixture.mine_empty(2);
        let line = fixture.add(&segment_svg(10, 10, 30, 10), "transparent", "black");
        let id = line.id();
        fixture.mine(vec![line]).unwrap();
        let delete = fixture.delete(id);
        fixture.mine(vec![delete]).unwrap();

        let replayed = Ledger::replay(&fixture.canonical(), fixture.settings()).unwrap();
        let head = fixture.tree.head_ledger();
        assert_eq!(replayed.balance(&fixture.public_key()), head.balance(&fixture.public_key()));
        assert!(!replayed.is_live(&id));
    }

    #[test]
    fn test_multi_party() {
        let parties = multi_party_fixtures(3);

        let pks: Vec<_> = parties.iter().map(|p| p.public_key()).collect();
        assert_ne!(pks[0], pks[1]);
        assert_ne!(pks[1], pks[2]);
        assert_ne!(pks[0], pks[2]);
        // Same network, same genesis.
        assert_eq!(parties[0].tree.genesis(), parties[2].tree.genesis());
    }

    #[tokio::test]
    async fn test_store_restores_fixture_chain() {
        let mut fixture = TestFixture::with_seed([3; 32]);
        let store = MemoryBlockStore::new();
        for block in fixture.mine_empty(3) {
            store.insert_block(&block).await.unwrap();
        }

        let tree = store.restore_tree(easy_settings()).await.unwrap();
        assert_eq!(tree.head_hash(), fixture.tree.head_hash());
    }
}
