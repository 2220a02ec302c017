//! # BlockArt Testkit
//!
//! Testing utilities for BlockArt.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known ops whose ids every miner must agree on
//! - **Generators**: Proptest strategies for shapes, keys and ids
//! - **Fixtures**: A miner key with its own chain under easy proof of work
//!
//! ## Golden Vectors
//!
//! ```rust
//! use blockart_testkit::vectors::{all_vectors, generate_op_from_vector};
//!
//! for vector in all_vectors() {
//!     let op = generate_op_from_vector(&vector);
//!     println!("{}: {}", vector.name, op.id().to_hex());
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use blockart_testkit::generators::{op_from_params, ShapeParams};
//!
//! proptest! {
//!     #[test]
//!     fn op_id_is_deterministic(params: ShapeParams) {
//!         prop_assert_eq!(op_from_params(&params).id(), op_from_params(&params).id());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use blockart_testkit::fixtures::{square_svg, TestFixture};
//!
//! let mut fixture = TestFixture::new();
//! fixture.mine_empty(4);
//! let op = fixture.add(&square_svg(0, 0, 5), "red", "red");
//! fixture.mine(vec![op]).unwrap();
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{easy_settings, multi_party_fixtures, seal_on, TestFixture};
pub use generators::{op_from_params, ShapeParams};
pub use vectors::{all_vectors, generate_op_from_vector, verify_all_vectors, GoldenVector};
