//! Blocks: batches of ops sealed with proof of work.
//!
//! A block's hash is the digest of `{prev_hash, ops, miner}` followed by the
//! nonce. The block is valid work when the hex form of that hash ends in at
//! least `difficulty` zero characters.

use serde::{Deserialize, Serialize};

use crate::canonical::block_prefix_bytes;
use crate::crypto::{Keypair, PublicKey, Signature, BLOCK_HASH_CONTEXT};
use crate::error::{BlockError, CoreError};
use crate::op::Op;
use crate::types::{BlockHash, OpId};

/// Whether `hash` satisfies `difficulty`.
pub fn meets_difficulty(hash: &BlockHash, difficulty: u8) -> bool {
    hash.trailing_zero_nibbles() >= u32::from(difficulty)
}

/// A block as stored in the chain and sent between miners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Declared hash. Receivers recompute and compare.
    pub hash: BlockHash,
    pub prev_hash: BlockHash,
    pub ops: Vec<Op>,
    pub miner: PublicKey,
    pub nonce: u64,
    /// Parent height + 1; genesis is 0.
    pub height: u64,
    /// Miner's signature over the hash.
    pub signature: Signature,
}

impl Block {
    /// The well-known first block of a network.
    pub fn genesis(hash: BlockHash) -> Self {
        Self {
            hash,
            prev_hash: BlockHash::ZERO,
            ops: Vec::new(),
            miner: PublicKey([0u8; 32]),
            nonce: 0,
            height: 0,
            signature: Signature::ZERO,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.prev_hash == BlockHash::ZERO
    }

    /// A block without ops.
    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }

    /// Recompute the hash from content.
    pub fn compute_hash(&self) -> BlockHash {
        BlockTemplate::new(self.prev_hash, self.height, self.ops.clone(), self.miner)
            .hash_with_nonce(self.nonce)
    }

    /// The declared hash matches the content.
    pub fn verify_hash(&self) -> Result<(), BlockError> {
        let computed = self.compute_hash();
        if computed != self.hash {
            return Err(BlockError::HashMismatch {
                declared: self.hash,
                computed,
            });
        }
        Ok(())
    }

    /// The declared hash carries enough work.
    pub fn verify_work(&self, difficulty: u8) -> Result<(), BlockError> {
        if !meets_difficulty(&self.hash, difficulty) {
            return Err(BlockError::InsufficientWork {
                required: difficulty,
                actual: self.hash.trailing_zero_nibbles(),
            });
        }
        Ok(())
    }

    pub fn verify_signature(&self) -> Result<(), CoreError> {
        self.miner.verify(self.hash.as_bytes(), &self.signature)
    }

    pub fn op_ids(&self) -> Vec<OpId> {
        self.ops.iter().map(Op::id).collect()
    }
}

/// An unsealed block: everything except the nonce.
///
/// Holds a hasher already fed with the block prefix so each nonce attempt
/// only hashes eight more bytes.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub prev_hash: BlockHash,
    pub height: u64,
    pub ops: Vec<Op>,
    pub miner: PublicKey,
    hasher: blake3::Hasher,
}

impl BlockTemplate {
    pub fn new(prev_hash: BlockHash, height: u64, ops: Vec<Op>, miner: PublicKey) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(BLOCK_HASH_CONTEXT);
        hasher.update(&block_prefix_bytes(&prev_hash, &ops, &miner));
        Self {
            prev_hash,
            height,
            ops,
            miner,
            hasher,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> BlockHash {
        let mut hasher = self.hasher.clone();
        hasher.update(&nonce.to_be_bytes());
        BlockHash(*hasher.finalize().as_bytes())
    }

    /// Fix the nonce and sign. The miner key must match the template.
    pub fn seal(self, nonce: u64, keypair: &Keypair) -> Block {
        let hash = self.hash_with_nonce(nonce);
        let signature = keypair.sign(hash.as_bytes());
        Block {
            hash,
            prev_hash: self.prev_hash,
            ops: self.ops,
            miner: self.miner,
            nonce,
            height: self.height,
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mine(template: &BlockTemplate, difficulty: u8) -> u64 {
        (0u64..)
            .find(|n| meets_difficulty(&template.hash_with_nonce(*n), difficulty))
            .unwrap()
    }

    #[test]
    fn test_sealed_block_verifies() {
        let kp = Keypair::from_seed(&[4; 32]);
        let op = Op::add_path(&kp, "M 0 0 L 5 0", "transparent", "red", 1);
        let template = BlockTemplate::new(BlockHash([1; 32]), 1, vec![op], kp.public_key());
        let nonce = mine(&template, 2);
        let block = template.seal(nonce, &kp);

        assert!(block.verify_hash().is_ok());
        assert!(block.verify_work(2).is_ok());
        assert!(block.verify_signature().is_ok());
        assert!(!block.is_noop());
        assert!(block.hash.to_hex().ends_with("00"));
    }

    #[test]
    fn test_tampered_block_fails_hash_check() {
        let kp = Keypair::from_seed(&[4; 32]);
        let template = BlockTemplate::new(BlockHash([1; 32]), 1, vec![], kp.public_key());
        let mut block = template.seal(7, &kp);
        block.nonce = 8;
        assert!(matches!(block.verify_hash(), Err(BlockError::HashMismatch { .. })));
    }

    #[test]
    fn test_insufficient_work_reports_actual() {
        let kp = Keypair::from_seed(&[4; 32]);
        let template = BlockTemplate::new(BlockHash([1; 32]), 1, vec![], kp.public_key());
        let nonce = (0u64..)
            .find(|n| !template.hash_with_nonce(*n).to_hex().ends_with('0'))
            .unwrap();
        let block = template.seal(nonce, &kp);
        assert_eq!(
            block.verify_work(1),
            Err(BlockError::InsufficientWork { required: 1, actual: 0 })
        );
    }

    #[test]
    fn test_genesis() {
        let genesis = Block::genesis(BlockHash([5; 32]));
        assert!(genesis.is_genesis());
        assert!(genesis.is_noop());
        assert_eq!(genesis.height, 0);
    }

    #[test]
    fn test_hash_ignores_height() {
        let kp = Keypair::from_seed(&[4; 32]);
        let a = BlockTemplate::new(BlockHash([1; 32]), 1, vec![], kp.public_key());
        let b = BlockTemplate::new(BlockHash([1; 32]), 9, vec![], kp.public_key());
        assert_eq!(a.hash_with_nonce(3), b.hash_with_nonce(3));
    }
}
