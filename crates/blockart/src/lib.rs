//! # BlockArt
//!
//! The ink miner: a node of the BlockArt network, where miners maintain a
//! proof-of-work blockchain of drawing operations on a shared canvas.
//!
//! ## Overview
//!
//! - **Ops**: signed requests to add or delete a shape, paid for in ink
//! - **Blocks**: batches of ops sealed with a nonce; mining earns ink
//! - **Chain**: a block tree whose highest branch is canonical
//! - **Confirmation**: an op is durable once its block is buried deep enough
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use blockart::{CanvasService, Node, NodeConfig};
//! use blockart::core::{Keypair, ShapeType};
//! use blockart::sync::{Gossip, MemoryDiscovery, MemoryNetwork, NodeId};
//!
//! async fn example() {
//!     let keypair = Keypair::generate();
//!     let config = NodeConfig::default();
//!
//!     let network = MemoryNetwork::new();
//!     let discovery = Arc::new(MemoryDiscovery::new(Duration::from_secs(10)));
//!     let transport = network
//!         .create_transport(NodeId::from_public_key(&keypair.public_key()))
//!         .await;
//!     let gossip = Gossip::new(Arc::new(transport), discovery, config.gossip.clone());
//!
//!     let node = Node::new(keypair.clone(), config, gossip, None).await.unwrap();
//!     node.start().await.unwrap();
//!
//!     let canvas = CanvasService::new(node);
//!     canvas.open_canvas(&keypair.public_key()).unwrap();
//!     let (shape, block, ink) = canvas
//!         .add_shape(2, ShapeType::Path, "M 0 0 L 20 20", "transparent", "red")
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `blockart::core` - geometry, shapes, ops, blocks, ink ledger
//! - `blockart::store` - block tree and block persistence
//! - `blockart::sync` - peer protocol, transports, discovery, gossip

pub mod config;
pub mod error;
pub mod miner;
pub mod node;
pub mod pool;
pub mod rpc;

pub use config::{MiningConfig, NodeConfig};
pub use error::{NodeError, Result};
pub use miner::{MineOutcome, MinerState, MiningEngine};
pub use node::{Confirmation, Node, NodeEvent};
pub use pool::PendingPool;
pub use rpc::{CanvasReply, CanvasRequest, CanvasService, ReplyBody};

pub use blockart_core as core;
pub use blockart_store as store;
pub use blockart_sync as sync;
