//! Transport abstraction for the peer protocol.
//!
//! The transport handles message delivery between linked miners.
//! Implementations may use TCP, QUIC, or any other channel.

use async_trait::async_trait;

use crate::error::{Result, SyncError};
use crate::messages::{NodeId, PeerMessage};

/// Transport trait for sending and receiving peer messages.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message to a connected peer.
    async fn send(&self, peer: &NodeId, message: &PeerMessage) -> Result<()>;

    /// Receive the next message from any peer.
    ///
    /// Returns the sender's NodeId and the message. Fails only when the
    /// transport is closed or a frame cannot be decoded.
    async fn recv(&self) -> Result<(NodeId, PeerMessage)>;

    /// Receive with timeout.
    ///
    /// Returns None if timeout expires before a message arrives.
    async fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Option<(NodeId, PeerMessage)>>;

    /// Open a link to `peer`.
    async fn connect(&self, peer: &NodeId) -> Result<()>;

    /// Drop the link to `peer`, if any.
    async fn disconnect(&self, peer: &NodeId);

    /// Get the local node's identity.
    fn local_node_id(&self) -> NodeId;

    /// List currently connected peers.
    async fn connected_peers(&self) -> Vec<NodeId>;

    /// Check if a specific peer is connected.
    async fn is_connected(&self, peer: &NodeId) -> bool;
}

/// A simple in-memory transport for tests and simulation.
///
/// Links are symmetric. Messages cross the network as encoded bytes so
/// the wire codec is exercised.
pub mod memory {
    use super::*;
    use bytes::Bytes;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use tokio::sync::{mpsc, RwLock};

    #[derive(Debug, Clone)]
    struct Envelope {
        from: NodeId,
        frame: Bytes,
    }

    /// Shared state for the memory transport network.
    #[derive(Default)]
    pub struct MemoryNetwork {
        senders: RwLock<HashMap<NodeId, mpsc::Sender<Envelope>>>,
        links: RwLock<HashMap<NodeId, HashSet<NodeId>>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a transport attached to this network.
        pub async fn create_transport(self: &Arc<Self>, node_id: NodeId) -> MemoryTransport {
            let (tx, rx) = mpsc::channel(1000);

            self.senders.write().await.insert(node_id, tx);
            self.links.write().await.entry(node_id).or_default();

            MemoryTransport {
                node_id,
                network: Arc::clone(self),
                receiver: RwLock::new(rx),
            }
        }

        /// Take a node off the network, dropping all its links.
        pub async fn remove(&self, node_id: &NodeId) {
            self.senders.write().await.remove(node_id);
            let mut links = self.links.write().await;
            if let Some(peers) = links.remove(node_id) {
                for peer in peers {
                    if let Some(theirs) = links.get_mut(&peer) {
                        theirs.remove(node_id);
                    }
                }
            }
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        node_id: NodeId,
        network: Arc<MemoryNetwork>,
        receiver: RwLock<mpsc::Receiver<Envelope>>,
    }

    impl MemoryTransport {
        fn open(envelope: Envelope) -> Result<(NodeId, PeerMessage)> {
            let message = PeerMessage::from_bytes(&envelope.frame)?;
            Ok((envelope.from, message))
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, peer: &NodeId, message: &PeerMessage) -> Result<()> {
            if !self.is_connected(peer).await {
                return Err(SyncError::PeerNotConnected(peer.to_string()));
            }
            let frame = message.to_bytes()?;
            let senders = self.network.senders.read().await;
            let sender = senders
                .get(peer)
                .ok_or_else(|| SyncError::TransportError("peer not found".into()))?;
            sender
                .send(Envelope {
                    from: self.node_id,
                    frame,
                })
                .await
                .map_err(|_| SyncError::TransportError("peer disconnected".into()))
        }

        async fn recv(&self) -> Result<(NodeId, PeerMessage)> {
            let mut rx = self.receiver.write().await;
            match rx.recv().await {
                Some(envelope) => Self::open(envelope),
                None => Err(SyncError::TransportError("channel closed".into())),
            }
        }

        async fn recv_timeout(
            &self,
            timeout: std::time::Duration,
        ) -> Result<Option<(NodeId, PeerMessage)>> {
            let mut rx = self.receiver.write().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(envelope)) => Self::open(envelope).map(Some),
                Ok(None) => Err(SyncError::TransportError("channel closed".into())),
                Err(_) => Ok(None),
            }
        }

        async fn connect(&self, peer: &NodeId) -> Result<()> {
            if *peer == self.node_id {
                return Err(SyncError::TransportError("cannot connect to self".into()));
            }
            if !self.network.senders.read().await.contains_key(peer) {
                return Err(SyncError::TransportError(format!("no route to {}", peer)));
            }
            let mut links = self.network.links.write().await;
            links.entry(self.node_id).or_default().insert(*peer);
            links.entry(*peer).or_default().insert(self.node_id);
            Ok(())
        }

        async fn disconnect(&self, peer: &NodeId) {
            let mut links = self.network.links.write().await;
            if let Some(mine) = links.get_mut(&self.node_id) {
                mine.remove(peer);
            }
            if let Some(theirs) = links.get_mut(peer) {
                theirs.remove(&self.node_id);
            }
        }

        fn local_node_id(&self) -> NodeId {
            self.node_id
        }

        async fn connected_peers(&self) -> Vec<NodeId> {
            let links = self.network.links.read().await;
            let mut peers: Vec<NodeId> = links
                .get(&self.node_id)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
            peers.sort();
            peers
        }

        async fn is_connected(&self, peer: &NodeId) -> bool {
            let links = self.network.links.read().await;
            links
                .get(&self.node_id)
                .map_or(false, |set| set.contains(peer))
        }
    }
}
