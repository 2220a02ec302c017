//! Ops waiting to be mined.
//!
//! The pool keeps a projected ledger: the head ledger with every pending op
//! applied in arrival order. A new op is validated against that projection,
//! so two pending ops can never spend the same ink or claim the same space.

use std::collections::HashSet;
use std::num::NonZeroUsize;

use blockart_core::{CanvasError, Ledger, Op, OpId, OpValidator};
use lru::LruCache;
use tracing::debug;

/// How many dropped ops the pool remembers the reason for.
const REJECTED_MEMORY: NonZeroUsize = match NonZeroUsize::new(256) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// Insertion-ordered set of validated, unmined ops.
#[derive(Debug, Clone)]
pub struct PendingPool {
    validator: OpValidator,
    ops: Vec<Op>,
    ids: HashSet<OpId>,
    projected: Ledger,
    rejected: LruCache<OpId, CanvasError>,
}

impl PendingPool {
    /// An empty pool on top of `head`.
    pub fn new(validator: OpValidator, head: &Ledger) -> Self {
        Self {
            validator,
            ops: Vec::new(),
            ids: HashSet::new(),
            projected: head.clone(),
            rejected: LruCache::new(REJECTED_MEMORY),
        }
    }

    /// Validate and queue an op.
    ///
    /// Returns `Ok(false)` if the op is already pending. An op already on
    /// the head chain is validated again, so deleting a deleted shape fails.
    /// A rejected op leaves the pool untouched.
    pub fn submit(&mut self, op: Op) -> Result<bool, CanvasError> {
        let id = op.id();
        if self.ids.contains(&id) {
            return Ok(false);
        }
        self.validator.apply(&op, &mut self.projected)?;
        self.rejected.pop(&id);
        self.ids.insert(id);
        self.ops.push(op);
        debug!(op = %id, pending = self.ops.len(), "op queued");
        Ok(true)
    }

    /// Move the pool onto a new head.
    ///
    /// `requeue` holds ops from blocks that left the canonical chain; they go
    /// ahead of the ops already pending. Ops the new head already contains
    /// are dropped quietly. Ops that no longer validate are dropped and
    /// returned with the reason, which [`rejection`](Self::rejection) keeps
    /// answering afterwards.
    pub fn rebase(&mut self, head: &Ledger, requeue: Vec<Op>) -> Vec<(OpId, CanvasError)> {
        let candidates: Vec<Op> = requeue
            .into_iter()
            .chain(std::mem::take(&mut self.ops))
            .collect();
        self.ids.clear();
        self.projected = head.clone();

        let mut rejected = Vec::new();
        for op in candidates {
            let id = op.id();
            if self.ids.contains(&id) || head.contains_op(&id) {
                continue;
            }
            match self.validator.apply(&op, &mut self.projected) {
                Ok(_) => {
                    self.ids.insert(id);
                    self.ops.push(op);
                }
                Err(err) => {
                    debug!(op = %id, error = %err, "pending op no longer valid");
                    self.rejected.put(id, err.clone());
                    rejected.push((id, err));
                }
            }
        }
        rejected
    }

    /// The oldest `limit` ops. They stay pending until a block holding them
    /// becomes the head.
    pub fn batch(&self, limit: usize) -> Vec<Op> {
        self.ops.iter().take(limit).cloned().collect()
    }

    pub fn contains(&self, id: &OpId) -> bool {
        self.ids.contains(id)
    }

    /// Why a recently dropped op stopped validating.
    pub fn rejection(&self, id: &OpId) -> Option<&CanvasError> {
        self.rejected.peek(id)
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockart_core::{Keypair, MinerNetSettings};

    fn funded(owner: &Keypair, ink: u64) -> Ledger {
        let mut ledger = Ledger::new();
        ledger.credit(&owner.public_key(), ink);
        ledger
    }

    fn pool_on(ledger: &Ledger) -> PendingPool {
        PendingPool::new(OpValidator::new(&MinerNetSettings::default()), ledger)
    }

    fn square(kp: &Keypair, x: u32) -> Op {
        // 10x10 filled square: 100 ink.
        let svg = format!("M {x} 0 h 10 v 10 h -10 Z");
        Op::add_path(kp, svg, "red", "red", 0)
    }

    #[test]
    fn test_pending_ops_share_one_balance() {
        let kp = Keypair::from_seed(&[1; 32]);
        let ledger = funded(&kp, 150);
        let mut pool = pool_on(&ledger);

        assert!(pool.submit(square(&kp, 0)).unwrap());
        assert!(matches!(
            pool.submit(square(&kp, 50)),
            Err(CanvasError::InsufficientInk(50))
        ));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_pending_ops_cannot_overlap() {
        let a = Keypair::from_seed(&[1; 32]);
        let b = Keypair::from_seed(&[2; 32]);
        let mut ledger = funded(&a, 500);
        ledger.credit(&b.public_key(), 500);
        let mut pool = pool_on(&ledger);

        pool.submit(square(&a, 0)).unwrap();
        assert!(matches!(
            pool.submit(square(&b, 5)),
            Err(CanvasError::ShapeOverlap(_))
        ));
    }

    #[test]
    fn test_resubmit_is_not_an_error() {
        let kp = Keypair::from_seed(&[1; 32]);
        let ledger = funded(&kp, 500);
        let mut pool = pool_on(&ledger);
        let op = square(&kp, 0);

        assert!(pool.submit(op.clone()).unwrap());
        assert!(!pool.submit(op).unwrap());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_mined_delete_cannot_be_resubmitted() {
        let kp = Keypair::from_seed(&[1; 32]);
        let validator = OpValidator::new(&MinerNetSettings::default());
        let mut head = funded(&kp, 500);
        let add = square(&kp, 0);
        let delete = Op::delete(&kp, add.id());
        validator.apply(&add, &mut head).unwrap();
        validator.apply(&delete, &mut head).unwrap();

        let mut pool = pool_on(&head);
        assert!(matches!(pool.submit(delete), Err(CanvasError::ShapeOwner(_))));
        assert!(matches!(pool.submit(add), Err(CanvasError::InvalidShapeHash(_))));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_rebase_drops_mined_and_invalid_ops() {
        let a = Keypair::from_seed(&[1; 32]);
        let b = Keypair::from_seed(&[2; 32]);
        let mut base = funded(&a, 500);
        base.credit(&b.public_key(), 500);
        let mut pool = pool_on(&base);

        let mined = square(&a, 0);
        let kept = square(&a, 100);
        let clashing = square(&b, 200);
        pool.submit(mined.clone()).unwrap();
        pool.submit(kept.clone()).unwrap();
        pool.submit(clashing.clone()).unwrap();

        // The new head contains `mined` and a foreign shape over `clashing`.
        let validator = OpValidator::new(&MinerNetSettings::default());
        let mut head = base.clone();
        validator.apply(&mined, &mut head).unwrap();
        validator.apply(&square(&a, 205), &mut head).unwrap();

        let rejected = pool.rebase(&head, Vec::new());
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0, clashing.id());
        assert!(matches!(rejected[0].1, CanvasError::ShapeOverlap(_)));
        assert_eq!(pool.ops(), &[kept]);
        assert!(matches!(
            pool.rejection(&clashing.id()),
            Some(CanvasError::ShapeOverlap(_))
        ));
        assert!(pool.rejection(&mined.id()).is_none());
    }

    proptest::proptest! {
        #[test]
        fn test_pool_never_overspends(
            budget in 0u64..2_000,
            squares in proptest::collection::vec((0u32..100, 1u32..20), 0..12),
        ) {
            let kp = Keypair::from_seed(&[3; 32]);
            let ledger = funded(&kp, budget);
            let mut pool = pool_on(&ledger);

            for (slot, side) in squares {
                let svg = format!("M {} 0 h {side} v {side} h -{side} Z", slot * 25);
                let _ = pool.submit(Op::add_path(&kp, svg, "red", "red", 0));
            }

            let validator = OpValidator::new(&MinerNetSettings::default());
            let mut replayed = ledger.clone();
            for op in pool.ops() {
                proptest::prop_assert!(validator.apply(op, &mut replayed).is_ok());
            }
            proptest::prop_assert!(replayed.balance(&kp.public_key()) <= budget);
        }
    }

    #[test]
    fn test_rebase_requeues_abandoned_ops_first() {
        let kp = Keypair::from_seed(&[1; 32]);
        let ledger = funded(&kp, 500);
        let mut pool = pool_on(&ledger);

        let pending = square(&kp, 0);
        let abandoned = square(&kp, 100);
        pool.submit(pending.clone()).unwrap();

        let rejected = pool.rebase(&ledger, vec![abandoned.clone(), pending.clone()]);
        assert!(rejected.is_empty());
        assert_eq!(pool.ops(), &[abandoned.clone(), pending]);
        assert_eq!(pool.batch(1), vec![abandoned]);
    }
}
