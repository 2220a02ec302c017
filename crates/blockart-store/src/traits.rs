//! BlockStore trait: the abstract interface for block persistence.
//!
//! The tree itself lives in memory. A store only keeps accepted blocks so a
//! restarted node can rebuild its tree without asking peers.

use async_trait::async_trait;
use blockart_core::{Block, BlockHash, MinerNetSettings};
use tracing::{info, warn};

use crate::error::Result;
use crate::tree::ChainTree;

/// Result of inserting a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Block was inserted successfully.
    Inserted,
    /// Block already exists (idempotent - not an error).
    AlreadyExists,
}

/// Async interface for block persistence.
///
/// # Design Notes
///
/// - **Idempotent inserts**: Inserting the same block twice returns `AlreadyExists`.
/// - **No validation**: callers store only blocks the tree accepted.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Persist a block.
    async fn insert_block(&self, block: &Block) -> Result<InsertResult>;

    /// Get a block by hash.
    async fn get_block(&self, hash: &BlockHash) -> Result<Option<Block>>;

    /// Check if a block exists.
    async fn has_block(&self, hash: &BlockHash) -> Result<bool>;

    /// Every stored block, parents before children (by height, then hash).
    async fn load_all(&self) -> Result<Vec<Block>>;

    /// Number of stored blocks.
    async fn block_count(&self) -> Result<u64>;
}

/// Extension trait for rebuilding a tree from storage.
pub trait BlockStoreExt: BlockStore {
    /// Replay stored blocks into a fresh tree.
    ///
    /// Blocks the tree rejects are skipped and logged; they can only come
    /// from a store written under different network settings.
    fn restore_tree(
        &self,
        settings: MinerNetSettings,
    ) -> impl std::future::Future<Output = Result<ChainTree>> + Send;
}

impl<S: BlockStore + ?Sized> BlockStoreExt for S {
    async fn restore_tree(&self, settings: MinerNetSettings) -> Result<ChainTree> {
        let mut tree = ChainTree::new(settings);
        let blocks = self.load_all().await?;
        let total = blocks.len();
        let mut skipped = 0usize;

        for block in blocks {
            let hash = block.hash;
            if let Err(err) = tree.append(block) {
                warn!(block = %hash, error = %err, "skipping stored block");
                skipped += 1;
            }
        }

        info!(
            blocks = total - skipped,
            skipped,
            head = %tree.head_hash(),
            "restored chain from store"
        );
        Ok(tree)
    }
}
