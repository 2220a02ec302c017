//! Error types for BlockArt core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{BlockHash, OpId};

/// Errors reported to a canvas client.
///
/// This is the closed set a client can observe. Each variant carries only
/// what the caller needs: the offending string, hash, or ink amount.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CanvasError {
    #[error("BlockArt: cannot connect to miner")]
    Disconnected,

    #[error("BlockArt: not enough ink to add shape, {0} ink remaining")]
    InsufficientInk(u64),

    #[error("BlockArt: bad shape svg string [{0}]")]
    InvalidShapeSvgString(String),

    #[error("BlockArt: shape svg string too long [{0}]")]
    ShapeSvgStringTooLong(String),

    #[error("BlockArt: invalid shape hash [{0}]")]
    InvalidShapeHash(String),

    #[error("BlockArt: shape owned by someone else [{0}]")]
    ShapeOwner(String),

    #[error("BlockArt: shape is outside the bounds of the canvas")]
    OutOfBounds,

    #[error("BlockArt: shape overlaps with a previously added shape [{0}]")]
    ShapeOverlap(String),

    #[error("BlockArt: invalid block hash [{0}]")]
    InvalidBlockHash(String),
}

/// Low-level faults in keys, signatures and encodings.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Why a block was refused by the chain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlockError {
    #[error("unknown parent block {0}")]
    UnknownParent(BlockHash),

    #[error("block hash mismatch: declared {declared}, computed {computed}")]
    HashMismatch {
        declared: BlockHash,
        computed: BlockHash,
    },

    #[error("insufficient proof of work: needed {required} trailing zeros, got {actual}")]
    InsufficientWork { required: u8, actual: u32 },

    #[error("bad height: expected {expected}, got {got}")]
    BadHeight { expected: u64, got: u64 },

    #[error("bad miner signature on block {0}")]
    BadSignature(BlockHash),

    #[error("block contains the same op twice: {0}")]
    DuplicateOp(OpId),

    #[error("invalid op {op} in block: {source}")]
    InvalidOp {
        op: OpId,
        #[source]
        source: CanvasError,
    },
}

/// A chain path that breaks ledger invariants.
///
/// Seeing one of these means a block was accepted that never should have been.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("path does not start at genesis")]
    MissingGenesis,

    #[error("block {child} does not extend {parent}")]
    BrokenLink { parent: BlockHash, child: BlockHash },

    #[error("block {block} violates ledger state: {source}")]
    InvalidBlock {
        block: BlockHash,
        #[source]
        source: BlockError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_error_messages_carry_payload() {
        let err = CanvasError::InsufficientInk(12);
        assert!(err.to_string().contains("12 ink remaining"));

        let err = CanvasError::ShapeOverlap("abc".into());
        assert!(err.to_string().contains("[abc]"));
    }

    #[test]
    fn test_canvas_error_serde_roundtrip() {
        let err = CanvasError::ShapeOwner("deadbeef".into());
        let json = serde_json::to_string(&err).unwrap();
        let back: CanvasError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
