//! Ink ledger: balances and shapes derived from a chain path.
//!
//! A ledger is never stored. It is the left-to-right fold of every op along
//! the path from genesis to some block:
//! - an add debits the owner by the shape's ink cost and marks it live
//! - a delete refunds that cost and marks the shape non-live
//! - each mined block credits its miner after its ops are applied
//!
//! Deleted shapes stay in the index so later queries can still render them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::block::Block;
use crate::crypto::PublicKey;
use crate::error::{BlockError, LedgerError};
use crate::settings::MinerNetSettings;
use crate::shape::Shape;
use crate::types::{OpId, ShapeId};
use crate::validation::{OpEffect, OpValidator, ValidatedOp};

#[derive(Debug, Clone)]
struct ShapeEntry {
    shape: Arc<Shape>,
    live: bool,
}

/// Ledger state at one block.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    credits: HashMap<PublicKey, u64>,
    spent: HashMap<PublicKey, u64>,
    shapes: HashMap<ShapeId, ShapeEntry>,
    /// Shape ids in the order they were added.
    order: Vec<ShapeId>,
    ops: HashSet<OpId>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the ledger by replaying `path`, which must start at genesis.
    pub fn replay(path: &[Block], settings: &MinerNetSettings) -> Result<Self, LedgerError> {
        let (genesis, rest) = path.split_first().ok_or(LedgerError::MissingGenesis)?;
        if !genesis.is_genesis() || genesis.hash != settings.genesis_block_hash {
            return Err(LedgerError::MissingGenesis);
        }

        let validator = OpValidator::new(settings);
        let mut ledger = Self::new();
        let mut parent = genesis;
        for block in rest {
            if block.prev_hash != parent.hash {
                return Err(LedgerError::BrokenLink {
                    parent: parent.hash,
                    child: block.hash,
                });
            }
            ledger
                .apply_block(block, &validator, settings)
                .map_err(|source| LedgerError::InvalidBlock {
                    block: block.hash,
                    source,
                })?;
            parent = block;
        }
        Ok(ledger)
    }

    /// Ink available to `owner`.
    pub fn balance(&self, owner: &PublicKey) -> u64 {
        let credited = self.credits.get(owner).copied().unwrap_or(0);
        let spent = self.spent.get(owner).copied().unwrap_or(0);
        credited.saturating_sub(spent)
    }

    pub fn credit(&mut self, owner: &PublicKey, amount: u64) {
        *self.credits.entry(*owner).or_insert(0) += amount;
    }

    /// Apply an op validated against this exact ledger state.
    pub fn apply(&mut self, op: ValidatedOp) {
        self.ops.insert(op.id);
        match op.effect {
            OpEffect::Add(shape) => {
                *self.spent.entry(op.owner).or_insert(0) += shape.ink_cost;
                self.order.push(shape.id);
                self.shapes.insert(shape.id, ShapeEntry { shape, live: true });
            }
            OpEffect::Delete { shape, refund } => {
                let spent = self.spent.entry(op.owner).or_insert(0);
                *spent = spent.saturating_sub(refund);
                if let Some(entry) = self.shapes.get_mut(&shape) {
                    entry.live = false;
                }
            }
        }
    }

    /// Validate and apply every op of `block`, then reward its miner.
    ///
    /// On error the ledger may hold some of the block's ops; callers apply
    /// blocks to a copy.
    pub fn apply_block(
        &mut self,
        block: &Block,
        validator: &OpValidator,
        settings: &MinerNetSettings,
    ) -> Result<(), BlockError> {
        if block.is_genesis() {
            return Ok(());
        }
        for op in &block.ops {
            let id = op.id();
            if self.ops.contains(&id) {
                return Err(BlockError::DuplicateOp(id));
            }
            validator
                .apply(op, self)
                .map_err(|source| BlockError::InvalidOp { op: id, source })?;
        }
        self.credit(&block.miner, settings.reward_for(!block.is_noop()));
        Ok(())
    }

    pub fn contains_op(&self, id: &OpId) -> bool {
        self.ops.contains(id)
    }

    /// Any shape ever added on this path, live or deleted.
    pub fn shape(&self, id: &ShapeId) -> Option<&Arc<Shape>> {
        self.shapes.get(id).map(|entry| &entry.shape)
    }

    pub fn is_live(&self, id: &ShapeId) -> bool {
        self.shapes.get(id).map_or(false, |entry| entry.live)
    }

    /// Live shapes in the order they were added.
    pub fn live_shapes(&self) -> impl Iterator<Item = &Arc<Shape>> + '_ {
        self.order.iter().filter_map(|id| {
            self.shapes
                .get(id)
                .filter(|entry| entry.live)
                .map(|entry| &entry.shape)
        })
    }

    pub fn shape_count(&self) -> usize {
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{meets_difficulty, BlockTemplate};
    use crate::crypto::Keypair;
    use crate::op::Op;
    use proptest::prelude::*;

    fn settings() -> MinerNetSettings {
        MinerNetSettings {
            pow_difficulty_op_block: 0,
            pow_difficulty_noop_block: 0,
            ink_per_op_block: 50,
            ink_per_noop_block: 100,
            ..MinerNetSettings::default()
        }
    }

    fn mined(parent: &Block, ops: Vec<Op>, miner: &Keypair) -> Block {
        let template = BlockTemplate::new(parent.hash, parent.height + 1, ops, miner.public_key());
        let nonce = (0u64..)
            .find(|n| meets_difficulty(&template.hash_with_nonce(*n), 0))
            .unwrap();
        template.seal(nonce, miner)
    }

    fn square(kp: &Keypair, side: u32) -> Op {
        Op::add_path(kp, format!("M 0 0 h {side} v {side} h -{side} Z"), "red", "red", 0)
    }

    #[test]
    fn test_replay_credits_after_ops() {
        let s = settings();
        let kp = Keypair::from_seed(&[1; 32]);
        let genesis = Block::genesis(s.genesis_block_hash);
        let b1 = mined(&genesis, vec![], &kp);
        let b2 = mined(&b1, vec![square(&kp, 10)], &kp);

        let ledger = Ledger::replay(&[genesis, b1, b2], &s).unwrap();
        // 100 (no-op) - 100 (square) + 50 (op block)
        assert_eq!(ledger.balance(&kp.public_key()), 50);
        assert_eq!(ledger.live_shapes().count(), 1);
    }

    #[test]
    fn test_reward_not_spendable_within_its_own_block() {
        let s = settings();
        let kp = Keypair::from_seed(&[1; 32]);
        let genesis = Block::genesis(s.genesis_block_hash);
        let b1 = mined(&genesis, vec![square(&kp, 1)], &kp);

        let err = Ledger::replay(&[genesis, b1.clone()], &s).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidBlock { block, source: BlockError::InvalidOp { .. } } if block == b1.hash
        ));
    }

    #[test]
    fn test_replay_rejects_broken_link_and_missing_genesis() {
        let s = settings();
        let kp = Keypair::from_seed(&[1; 32]);
        let genesis = Block::genesis(s.genesis_block_hash);
        let b1 = mined(&genesis, vec![], &kp);
        let b2 = mined(&b1, vec![], &kp);

        assert!(matches!(
            Ledger::replay(&[genesis.clone(), b2.clone()], &s),
            Err(LedgerError::BrokenLink { .. })
        ));
        assert_eq!(Ledger::replay(&[b1, b2], &s).unwrap_err(), LedgerError::MissingGenesis);
        assert_eq!(Ledger::replay(&[], &s).unwrap_err(), LedgerError::MissingGenesis);
    }

    #[test]
    fn test_duplicate_op_across_blocks() {
        let s = settings();
        let kp = Keypair::from_seed(&[1; 32]);
        let genesis = Block::genesis(s.genesis_block_hash);
        let b1 = mined(&genesis, vec![], &kp);
        let op = square(&kp, 2);
        let b2 = mined(&b1, vec![op.clone()], &kp);
        let b3 = mined(&b2, vec![op.clone()], &kp);

        let err = Ledger::replay(&[genesis, b1, b2, b3], &s).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidBlock { source: BlockError::DuplicateOp(id), .. } if id == op.id()
        ));
    }

    #[test]
    fn test_deleted_shape_stays_indexed() {
        let kp = Keypair::from_seed(&[1; 32]);
        let validator = OpValidator::new(&settings());
        let mut ledger = Ledger::new();
        ledger.credit(&kp.public_key(), 500);

        let add = square(&kp, 4);
        validator.apply(&add, &mut ledger).unwrap();
        validator.apply(&Op::delete(&kp, add.id()), &mut ledger).unwrap();

        assert!(!ledger.is_live(&add.id()));
        assert!(ledger.shape(&add.id()).is_some());
        assert_eq!(ledger.shape_count(), 1);
        assert_eq!(ledger.live_shapes().count(), 0);
    }

    proptest! {
        #[test]
        fn prop_delete_refunds_exact_cost(side in 1u32..100, extra in 0u64..1000) {
            let kp = Keypair::from_seed(&[7; 32]);
            let validator = OpValidator::new(&settings());
            let start = u64::from(side) * u64::from(side) + extra;
            let mut ledger = Ledger::new();
            ledger.credit(&kp.public_key(), start);

            let add = square(&kp, side);
            validator.apply(&add, &mut ledger).unwrap();
            prop_assert_eq!(ledger.balance(&kp.public_key()), extra);

            validator.apply(&Op::delete(&kp, add.id()), &mut ledger).unwrap();
            prop_assert_eq!(ledger.balance(&kp.public_key()), start);
            prop_assert!(!ledger.is_live(&add.id()));
        }
    }
}
