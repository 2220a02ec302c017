//! # BlockArt Sync
//!
//! How miners find each other and spread ops and blocks.
//!
//! ## Overview
//!
//! Miners form an unstructured peer graph. Ops and blocks are flooded to
//! every neighbour; a bounded seen-set stops floods from circling forever.
//! A miner below its peer minimum asks discovery and its neighbours for more.
//!
//! ## Key Properties
//!
//! - **At most once**: a flooded message is processed once per node
//! - **Validate first**: callers run ops and blocks through the chain before re-flooding
//! - **Pull on gaps**: a block with an unknown parent triggers `GetBlock`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use blockart_sync::{Gossip, GossipConfig, MemoryDiscovery, MemoryNetwork, NodeId};
//!
//! async fn example() {
//!     let network = MemoryNetwork::new();
//!     let discovery = Arc::new(MemoryDiscovery::new(Duration::from_secs(10)));
//!     let transport = network.create_transport(NodeId::random()).await;
//!     let gossip = Gossip::new(Arc::new(transport), discovery, GossipConfig::default());
//!     gossip.join().await.unwrap();
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Node A                              Node B
//!   |-------- Hello ------------------>|
//!   |<------- Hello -------------------|
//!   |<------- Block (B's head) --------|
//!   |<------- Op (B's pending) --------|
//!   |-------- GetBlock (parent) ------>|
//!   |<------- Block -------------------|
//!   |-------- RequestPeers ----------->|
//!   |<------- PeerList ----------------|
//! ```

pub mod discovery;
pub mod error;
pub mod gossip;
pub mod messages;
pub mod orphans;
pub mod transport;

pub use discovery::{Discovery, MemoryDiscovery};
pub use error::{Result, SyncError};
pub use gossip::{Gossip, GossipConfig, SeenCache};
pub use messages::{limits, MessageKey, NodeId, PeerMessage, PROTOCOL_VERSION};
pub use orphans::OrphanPool;
pub use transport::{memory::MemoryNetwork, memory::MemoryTransport, Transport};
