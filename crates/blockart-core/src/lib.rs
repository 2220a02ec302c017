//! # BlockArt Core
//!
//! Pure primitives for BlockArt: canvas geometry, shapes, ops, blocks and the
//! ink ledger.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over signed, content-addressed data.
//!
//! ## Key Types
//!
//! - [`Op`] - A signed request to add or delete a shape
//! - [`Block`] - A batch of ops sealed with proof of work
//! - [`Ledger`] - Ink balances and shapes at one point in the chain
//! - [`OpValidator`] - Checks an op against canvas rules and a ledger
//! - [`CanvasError`] - The closed set of errors a canvas client sees
//!
//! ## Canonicalization
//!
//! Op ids and block hashes are digests of deterministic CBOR. See [`canonical`] module.

pub mod block;
pub mod canonical;
pub mod crypto;
pub mod error;
pub mod geometry;
pub mod ledger;
pub mod op;
pub mod settings;
pub mod shape;
pub mod types;
pub mod validation;

pub use block::{meets_difficulty, Block, BlockTemplate};
pub use crypto::{Keypair, PublicKey, Signature};
pub use error::{BlockError, CanvasError, CoreError, LedgerError};
pub use geometry::{Edge, Outline, Point, MAX_SVG_LENGTH};
pub use ledger::Ledger;
pub use op::{Op, OpKind};
pub use settings::{CanvasSettings, MinerNetSettings};
pub use shape::{Shape, ShapeSpec, ShapeType, TRANSPARENT};
pub use types::{BlockHash, OpId, ShapeId};
pub use validation::{OpEffect, OpValidator, ValidatedOp};

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
