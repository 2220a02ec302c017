//! Ops: signed requests to add or delete a shape.

use serde::{Deserialize, Serialize};

use crate::canonical::op_content_bytes;
use crate::crypto::{domain_hash, Keypair, PublicKey, Signature, OP_ID_CONTEXT};
use crate::error::CoreError;
use crate::shape::{ShapeSpec, ShapeType};
use crate::types::{OpId, ShapeId};

/// What an op does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    Add(ShapeSpec),
    Delete(ShapeId),
}

/// A signed drawing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    pub kind: OpKind,
    pub owner: PublicKey,
    /// Owner's signature over the op id.
    pub signature: Signature,
}

impl Op {
    /// Sign a new op with the owner's keypair.
    pub fn new(kind: OpKind, keypair: &Keypair) -> Self {
        let owner = keypair.public_key();
        let id = compute_op_id(&kind, &owner);
        let signature = keypair.sign(id.as_bytes());
        Self {
            kind,
            owner,
            signature,
        }
    }

    /// Add a path shape.
    pub fn add_path(
        keypair: &Keypair,
        svg: impl Into<String>,
        fill: impl Into<String>,
        stroke: impl Into<String>,
        created_at: i64,
    ) -> Self {
        let spec = ShapeSpec {
            shape_type: ShapeType::Path,
            svg: svg.into(),
            fill: fill.into(),
            stroke: stroke.into(),
            created_at,
        };
        Self::new(OpKind::Add(spec), keypair)
    }

    /// Delete a previously added shape.
    pub fn delete(keypair: &Keypair, shape: ShapeId) -> Self {
        Self::new(OpKind::Delete(shape), keypair)
    }

    /// Content-addressed id. For an add op this is also the shape id.
    pub fn id(&self) -> OpId {
        compute_op_id(&self.kind, &self.owner)
    }

    pub fn verify_signature(&self) -> Result<(), CoreError> {
        self.owner.verify(self.id().as_bytes(), &self.signature)
    }

    pub fn is_add(&self) -> bool {
        matches!(self.kind, OpKind::Add(_))
    }

    /// The shape this op adds or deletes.
    pub fn shape_id(&self) -> ShapeId {
        match &self.kind {
            OpKind::Add(_) => self.id(),
            OpKind::Delete(target) => *target,
        }
    }
}

fn compute_op_id(kind: &OpKind, owner: &PublicKey) -> OpId {
    OpId(domain_hash(OP_ID_CONTEXT, &op_content_bytes(kind, owner)))
}
