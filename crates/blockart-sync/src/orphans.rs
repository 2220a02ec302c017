//! Blocks that arrived before their parent.

use std::collections::{HashMap, HashSet, VecDeque};

use blockart_core::{Block, BlockHash};

/// Bounded pool of blocks waiting for their parent.
///
/// The oldest orphan is evicted when the pool is full.
#[derive(Debug)]
pub struct OrphanPool {
    by_parent: HashMap<BlockHash, Vec<Block>>,
    hashes: HashSet<BlockHash>,
    order: VecDeque<(BlockHash, BlockHash)>,
    capacity: usize,
}

impl OrphanPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            by_parent: HashMap::new(),
            hashes: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Park a block. Returns false if it was already parked.
    pub fn insert(&mut self, block: Block) -> bool {
        if !self.hashes.insert(block.hash) {
            return false;
        }
        while self.order.len() >= self.capacity {
            let Some((parent, hash)) = self.order.pop_front() else {
                break;
            };
            self.remove(&parent, &hash);
        }
        self.order.push_back((block.prev_hash, block.hash));
        self.by_parent.entry(block.prev_hash).or_default().push(block);
        true
    }

    fn remove(&mut self, parent: &BlockHash, hash: &BlockHash) {
        self.hashes.remove(hash);
        if let Some(children) = self.by_parent.get_mut(parent) {
            children.retain(|b| b.hash != *hash);
            if children.is_empty() {
                self.by_parent.remove(parent);
            }
        }
    }

    /// Remove and return every orphan whose parent is `parent`.
    pub fn take_children(&mut self, parent: &BlockHash) -> Vec<Block> {
        let children = self.by_parent.remove(parent).unwrap_or_default();
        for child in &children {
            self.hashes.remove(&child.hash);
        }
        self.order.retain(|(p, _)| p != parent);
        children
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.hashes.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockart_core::{BlockTemplate, Keypair};

    fn child_of(parent: BlockHash, nonce: u64) -> Block {
        let kp = Keypair::from_seed(&[1; 32]);
        BlockTemplate::new(parent, 1, vec![], kp.public_key()).seal(nonce, &kp)
    }

    #[test]
    fn test_take_children() {
        let mut pool = OrphanPool::new(8);
        let parent = BlockHash([1; 32]);
        let a = child_of(parent, 1);
        let b = child_of(parent, 2);
        let other = child_of(BlockHash([2; 32]), 3);

        assert!(pool.insert(a.clone()));
        assert!(!pool.insert(a.clone()));
        pool.insert(b.clone());
        pool.insert(other.clone());

        let children = pool.take_children(&parent);
        assert_eq!(children, vec![a, b]);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&other.hash));
        assert!(pool.take_children(&parent).is_empty());
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut pool = OrphanPool::new(2);
        let first = child_of(BlockHash([1; 32]), 1);
        let second = child_of(BlockHash([2; 32]), 2);
        let third = child_of(BlockHash([3; 32]), 3);

        pool.insert(first.clone());
        pool.insert(second.clone());
        pool.insert(third.clone());

        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&first.hash));
        assert!(pool.contains(&third.hash));
    }
}
