//! In-memory implementation of the BlockStore trait.
//!
//! Same semantics as SQLite but nothing survives the process.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use blockart_core::{Block, BlockHash};

use crate::error::Result;
use crate::traits::{BlockStore, InsertResult};

/// In-memory block store. Thread-safe via RwLock.
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<BlockHash, Block>>,
}

impl MemoryBlockStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn insert_block(&self, block: &Block) -> Result<InsertResult> {
        let mut blocks = self.blocks.write().unwrap();
        if blocks.contains_key(&block.hash) {
            return Ok(InsertResult::AlreadyExists);
        }
        blocks.insert(block.hash, block.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<Option<Block>> {
        let blocks = self.blocks.read().unwrap();
        Ok(blocks.get(hash).cloned())
    }

    async fn has_block(&self, hash: &BlockHash) -> Result<bool> {
        let blocks = self.blocks.read().unwrap();
        Ok(blocks.contains_key(hash))
    }

    async fn load_all(&self) -> Result<Vec<Block>> {
        let blocks = self.blocks.read().unwrap();
        let mut all: Vec<Block> = blocks.values().cloned().collect();
        all.sort_by_key(|block| (block.height, block.hash));
        Ok(all)
    }

    async fn block_count(&self) -> Result<u64> {
        let blocks = self.blocks.read().unwrap();
        Ok(blocks.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::BlockStoreExt;
    use blockart_core::{meets_difficulty, BlockTemplate, Keypair, MinerNetSettings};

    fn mine(parent: &Block, miner: &Keypair) -> Block {
        let template = BlockTemplate::new(parent.hash, parent.height + 1, vec![], miner.public_key());
        let nonce = (0u64..)
            .find(|n| meets_difficulty(&template.hash_with_nonce(*n), 1))
            .unwrap();
        template.seal(nonce, miner)
    }

    fn settings() -> MinerNetSettings {
        MinerNetSettings {
            pow_difficulty_op_block: 1,
            pow_difficulty_noop_block: 1,
            ..MinerNetSettings::default()
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryBlockStore::new();
        let kp = Keypair::from_seed(&[1; 32]);
        let genesis = Block::genesis(settings().genesis_block_hash);
        let block = mine(&genesis, &kp);

        assert_eq!(store.insert_block(&block).await.unwrap(), InsertResult::Inserted);
        assert_eq!(store.insert_block(&block).await.unwrap(), InsertResult::AlreadyExists);
        assert!(store.has_block(&block.hash).await.unwrap());
        assert_eq!(store.get_block(&block.hash).await.unwrap(), Some(block));
        assert_eq!(store.block_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restore_tree_in_any_insert_order() {
        let store = MemoryBlockStore::new();
        let kp = Keypair::from_seed(&[1; 32]);
        let genesis = Block::genesis(settings().genesis_block_hash);
        let b1 = mine(&genesis, &kp);
        let b2 = mine(&b1, &kp);
        let b3 = mine(&b2, &kp);

        for block in [&b3, &b1, &b2] {
            store.insert_block(block).await.unwrap();
        }

        let tree = store.restore_tree(settings()).await.unwrap();
        assert_eq!(tree.head_hash(), b3.hash);
        assert_eq!(tree.len(), 4);
    }
}
