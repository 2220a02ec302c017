//! ChainTree: every known block, linked under its parent.
//!
//! Blocks are never removed. The canonical head is the highest block; among
//! equal heights the smallest hash wins, so every node picks the same head
//! from the same set of blocks.
//!
//! Each node caches the ledger after its block, so validating a child only
//! replays the child's own ops.

use std::collections::HashMap;
use std::sync::Arc;

use blockart_core::{
    Block, BlockError, BlockHash, Ledger, MinerNetSettings, Op, OpId, OpValidator,
};
use tracing::{debug, info};

/// A block in the tree.
#[derive(Debug, Clone)]
pub struct ChainNode {
    pub block: Arc<Block>,
    /// Ledger after applying `block`.
    pub ledger: Arc<Ledger>,
    /// Children in arrival order.
    pub children: Vec<BlockHash>,
}

/// A move of the canonical head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadChange {
    pub old_head: BlockHash,
    pub new_head: BlockHash,
    /// The old head is not an ancestor of the new one.
    pub reorg: bool,
    /// Ops in abandoned blocks that the new chain does not contain.
    pub dropped: Vec<Op>,
}

/// Result of [`ChainTree::append`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The block was already in the tree.
    Duplicate,
    Appended {
        hash: BlockHash,
        head_change: Option<HeadChange>,
    },
}

impl AppendOutcome {
    pub fn head_change(&self) -> Option<&HeadChange> {
        match self {
            Self::Appended { head_change, .. } => head_change.as_ref(),
            Self::Duplicate => None,
        }
    }
}

/// The block tree of one node.
#[derive(Debug)]
pub struct ChainTree {
    settings: MinerNetSettings,
    validator: OpValidator,
    nodes: HashMap<BlockHash, ChainNode>,
    genesis: BlockHash,
    head: BlockHash,
    /// Blocks containing each op, on any branch.
    op_index: HashMap<OpId, Vec<BlockHash>>,
}

impl ChainTree {
    /// A tree holding only the genesis block.
    pub fn new(settings: MinerNetSettings) -> Self {
        let genesis = Block::genesis(settings.genesis_block_hash);
        let hash = genesis.hash;
        let mut nodes = HashMap::new();
        nodes.insert(
            hash,
            ChainNode {
                block: Arc::new(genesis),
                ledger: Arc::new(Ledger::new()),
                children: Vec::new(),
            },
        );
        Self {
            validator: OpValidator::new(&settings),
            settings,
            nodes,
            genesis: hash,
            head: hash,
            op_index: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &MinerNetSettings {
        &self.settings
    }

    pub fn validator(&self) -> &OpValidator {
        &self.validator
    }

    /// Validate `block` and link it under its parent.
    ///
    /// Steps, in order: duplicate, known parent, hash, proof of work,
    /// height, miner signature, then every op against the parent's ledger.
    pub fn append(&mut self, block: Block) -> Result<AppendOutcome, BlockError> {
        // 1. Already known
        if self.nodes.contains_key(&block.hash) {
            return Ok(AppendOutcome::Duplicate);
        }

        // 2. Parent
        let parent = self
            .nodes
            .get(&block.prev_hash)
            .ok_or(BlockError::UnknownParent(block.prev_hash))?;

        // 3. Hash matches content
        block.verify_hash()?;

        // 4. Proof of work for the block kind
        block.verify_work(self.settings.difficulty_for(!block.is_noop()))?;

        // 5. Height
        let expected = parent.block.height + 1;
        if block.height != expected {
            return Err(BlockError::BadHeight {
                expected,
                got: block.height,
            });
        }

        // 6. Miner signature
        block
            .verify_signature()
            .map_err(|_| BlockError::BadSignature(block.hash))?;

        // 7. Ops against the parent's ledger
        let mut ledger = (*parent.ledger).clone();
        ledger.apply_block(&block, &self.validator, &self.settings)?;

        let hash = block.hash;
        for op in &block.ops {
            self.op_index.entry(op.id()).or_default().push(hash);
        }
        if let Some(parent) = self.nodes.get_mut(&block.prev_hash) {
            parent.children.push(hash);
        }
        debug!(block = %hash, height = block.height, ops = block.ops.len(), "block appended");
        self.nodes.insert(
            hash,
            ChainNode {
                block: Arc::new(block),
                ledger: Arc::new(ledger),
                children: Vec::new(),
            },
        );

        let head_change = self.select_head(hash);
        Ok(AppendOutcome::Appended { hash, head_change })
    }

    /// Move the head to `candidate` if it beats the current head.
    fn select_head(&mut self, candidate: BlockHash) -> Option<HeadChange> {
        let (new, old) = (self.nodes.get(&candidate)?, self.nodes.get(&self.head)?);
        let better = new.block.height > old.block.height
            || (new.block.height == old.block.height && new.block.hash < old.block.hash);
        if !better {
            return None;
        }

        let old_head = self.head;
        let (abandoned, _) = self.blocks_between(&old_head, &candidate)?;
        let reorg = !abandoned.is_empty();
        let new_ledger = new.ledger.clone();
        let dropped = abandoned
            .iter()
            .flat_map(|block| block.ops.iter())
            .filter(|op| !new_ledger.contains_op(&op.id()))
            .cloned()
            .collect();

        self.head = candidate;
        if reorg {
            info!(old = %old_head, new = %candidate, abandoned = abandoned.len(), "chain reorganised");
        }
        Some(HeadChange {
            old_head,
            new_head: candidate,
            reorg,
            dropped,
        })
    }

    pub fn genesis(&self) -> BlockHash {
        self.genesis
    }

    pub fn head(&self) -> &Arc<Block> {
        // The head is always a tree node.
        &self.nodes[&self.head].block
    }

    pub fn head_hash(&self) -> BlockHash {
        self.head
    }

    pub fn head_ledger(&self) -> Arc<Ledger> {
        self.nodes[&self.head].ledger.clone()
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.nodes.contains_key(hash)
    }

    pub fn get(&self, hash: &BlockHash) -> Option<&Arc<Block>> {
        self.nodes.get(hash).map(|node| &node.block)
    }

    pub fn ledger_at(&self, hash: &BlockHash) -> Option<Arc<Ledger>> {
        self.nodes.get(hash).map(|node| node.ledger.clone())
    }

    pub fn children(&self, hash: &BlockHash) -> Option<&[BlockHash]> {
        self.nodes.get(hash).map(|node| node.children.as_slice())
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Blocks from genesis to `hash`, inclusive.
    pub fn path_from_genesis(&self, hash: &BlockHash) -> Option<Vec<Arc<Block>>> {
        let mut path = Vec::new();
        let mut cursor = self.nodes.get(hash)?;
        loop {
            path.push(cursor.block.clone());
            if cursor.block.hash == self.genesis {
                break;
            }
            cursor = self.nodes.get(&cursor.block.prev_hash)?;
        }
        path.reverse();
        Some(path)
    }

    /// Walk from `hash` towards genesis until reaching `height`.
    fn ancestor_at(&self, hash: &BlockHash, height: u64) -> Option<&ChainNode> {
        let mut cursor = self.nodes.get(hash)?;
        while cursor.block.height > height {
            cursor = self.nodes.get(&cursor.block.prev_hash)?;
        }
        (cursor.block.height == height).then_some(cursor)
    }

    /// The block is an ancestor of (or is) the head.
    pub fn is_canonical(&self, hash: &BlockHash) -> bool {
        match self.nodes.get(hash) {
            Some(node) => self
                .ancestor_at(&self.head, node.block.height)
                .map_or(false, |ancestor| ancestor.block.hash == *hash),
            None => false,
        }
    }

    /// Head height minus the block's height, for canonical blocks only.
    pub fn confirmation_depth(&self, hash: &BlockHash) -> Option<u64> {
        if !self.is_canonical(hash) {
            return None;
        }
        let height = self.nodes.get(hash)?.block.height;
        Some(self.head().height - height)
    }

    /// The canonical block containing `op`.
    pub fn locate_op(&self, op: &OpId) -> Option<BlockHash> {
        self.op_index
            .get(op)?
            .iter()
            .copied()
            .find(|hash| self.is_canonical(hash))
    }

    /// An op from any branch, preferring the canonical one.
    pub fn find_op(&self, op: &OpId) -> Option<(BlockHash, &Op)> {
        let blocks = self.op_index.get(op)?;
        let hash = blocks
            .iter()
            .copied()
            .find(|hash| self.is_canonical(hash))
            .or_else(|| blocks.first().copied())?;
        let found = self.nodes.get(&hash)?.block.ops.iter().find(|o| o.id() == *op)?;
        Some((hash, found))
    }

    /// Ids of every op in the block, in block order.
    pub fn shape_ids(&self, hash: &BlockHash) -> Option<Vec<OpId>> {
        self.nodes.get(hash).map(|node| node.block.op_ids())
    }

    /// Blocks leaving and joining the chain when the head moves from
    /// `old` to `new`: `(abandoned, adopted)`, each ordered from the common
    /// ancestor outwards.
    pub fn blocks_between(
        &self,
        old: &BlockHash,
        new: &BlockHash,
    ) -> Option<(Vec<Arc<Block>>, Vec<Arc<Block>>)> {
        let mut a = self.nodes.get(old)?;
        let mut b = self.nodes.get(new)?;
        let mut abandoned = Vec::new();
        let mut adopted = Vec::new();

        while a.block.height > b.block.height {
            abandoned.push(a.block.clone());
            a = self.nodes.get(&a.block.prev_hash)?;
        }
        while b.block.height > a.block.height {
            adopted.push(b.block.clone());
            b = self.nodes.get(&b.block.prev_hash)?;
        }
        while a.block.hash != b.block.hash {
            abandoned.push(a.block.clone());
            adopted.push(b.block.clone());
            a = self.nodes.get(&a.block.prev_hash)?;
            b = self.nodes.get(&b.block.prev_hash)?;
        }

        abandoned.reverse();
        adopted.reverse();
        Some((abandoned, adopted))
    }

    /// Every block except genesis, parents before children.
    pub fn blocks_by_height(&self) -> Vec<Arc<Block>> {
        let mut blocks: Vec<Arc<Block>> = self
            .nodes
            .values()
            .filter(|node| node.block.hash != self.genesis)
            .map(|node| node.block.clone())
            .collect();
        blocks.sort_by_key(|block| (block.height, block.hash));
        blocks
    }
}
