//! Op validation against a ledger snapshot.

use std::sync::Arc;

use crate::crypto::PublicKey;
use crate::error::CanvasError;
use crate::geometry::{bounds_check, shapes_overlap};
use crate::ledger::Ledger;
use crate::op::{Op, OpKind};
use crate::settings::{CanvasSettings, MinerNetSettings};
use crate::shape::Shape;
use crate::types::{OpId, ShapeId};

/// The effect of an op that passed validation.
#[derive(Debug, Clone)]
pub enum OpEffect {
    Add(Arc<Shape>),
    Delete { shape: ShapeId, refund: u64 },
}

/// An op that may be applied to the ledger it was validated against.
#[derive(Debug, Clone)]
pub struct ValidatedOp {
    pub id: OpId,
    pub owner: PublicKey,
    pub effect: OpEffect,
}

/// Checks ops against canvas rules and ledger state.
#[derive(Debug, Clone, Copy)]
pub struct OpValidator {
    canvas: CanvasSettings,
    allow_self_overlap: bool,
}

impl OpValidator {
    pub fn new(settings: &MinerNetSettings) -> Self {
        Self {
            canvas: settings.canvas,
            allow_self_overlap: settings.allow_self_overlap,
        }
    }

    pub fn canvas(&self) -> CanvasSettings {
        self.canvas
    }

    /// Validate an op against `ledger` without mutating it.
    pub fn validate(&self, op: &Op, ledger: &Ledger) -> Result<ValidatedOp, CanvasError> {
        let id = op.id();

        // 1. Owner signature
        if op.verify_signature().is_err() {
            return Err(CanvasError::ShapeOwner(id.to_hex()));
        }

        let effect = match &op.kind {
            OpKind::Add(spec) => {
                // 2. Geometry
                let shape = Shape::build(id, op.owner, spec.clone())?;

                // 3. Bounds
                bounds_check(
                    &shape.outline.edges,
                    self.canvas.canvas_x_max,
                    self.canvas.canvas_y_max,
                )?;

                // 4. Unique id
                if ledger.contains_op(&id) || ledger.shape(&id).is_some() {
                    return Err(CanvasError::InvalidShapeHash(id.to_hex()));
                }

                // 5. Overlap with live shapes
                for other in ledger.live_shapes() {
                    if self.allow_self_overlap && other.owner == op.owner {
                        continue;
                    }
                    if shapes_overlap(&shape.outline, &other.outline) {
                        return Err(CanvasError::ShapeOverlap(other.id.to_hex()));
                    }
                }

                // 6. Ink
                let balance = ledger.balance(&op.owner);
                if balance < shape.ink_cost {
                    return Err(CanvasError::InsufficientInk(balance));
                }

                OpEffect::Add(Arc::new(shape))
            }
            OpKind::Delete(target) => {
                // 2. Target live and owned by the deleter
                let shape = match ledger.shape(target) {
                    Some(shape) if shape.owner == op.owner && ledger.is_live(target) => shape,
                    _ => return Err(CanvasError::ShapeOwner(target.to_hex())),
                };
                if ledger.contains_op(&id) {
                    return Err(CanvasError::InvalidShapeHash(id.to_hex()));
                }
                OpEffect::Delete {
                    shape: *target,
                    refund: shape.ink_cost,
                }
            }
        };

        Ok(ValidatedOp {
            id,
            owner: op.owner,
            effect,
        })
    }

    /// Validate then apply in one step; on error `ledger` is untouched.
    pub fn apply(&self, op: &Op, ledger: &mut Ledger) -> Result<OpId, CanvasError> {
        let validated = self.validate(op, ledger)?;
        let id = validated.id;
        ledger.apply(validated);
        Ok(id)
    }
}
