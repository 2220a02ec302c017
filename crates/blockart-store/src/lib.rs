//! # BlockArt Store
//!
//! The block tree of a miner and the persistence behind it.
//!
//! ## Overview
//!
//! [`ChainTree`] holds every block the node has accepted, linked under its
//! parent, and picks the canonical head. Blocks can be persisted through the
//! [`BlockStore`] trait so a restarted node rebuilds the same tree.
//!
//! ## Key Types
//!
//! - [`ChainTree`] - Block tree, head selection, reorgs and confirmation depth
//! - [`AppendOutcome`] / [`HeadChange`] - What appending a block did
//! - [`BlockStore`] - The async trait for block persistence
//! - [`SqliteBlockStore`] - SQLite-based persistent storage
//! - [`MemoryBlockStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blockart_core::MinerNetSettings;
//! use blockart_store::{BlockStoreExt, SqliteBlockStore};
//!
//! async fn example() {
//!     let store = SqliteBlockStore::open("chain.db").unwrap();
//!     let tree = store.restore_tree(MinerNetSettings::default()).await.unwrap();
//!     println!("head at height {}", tree.head().height);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Never delete**: abandoned branches stay in the tree but stop being canonical
//! - **Deterministic head**: greatest height, then smallest hash
//! - **Cached ledgers**: each node keeps the ledger after its block

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;
pub mod tree;

pub use error::{Result, StoreError};
pub use memory::MemoryBlockStore;
pub use sqlite::SqliteBlockStore;
pub use traits::{BlockStore, BlockStoreExt, InsertResult};
pub use tree::{AppendOutcome, ChainNode, ChainTree, HeadChange};
