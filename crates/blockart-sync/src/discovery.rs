//! Discovery: where a miner finds its first neighbours.
//!
//! Miners register once, then heartbeat. A node that misses heartbeats for
//! longer than the expiry disappears from `get_nodes`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::messages::NodeId;

/// The external registry of live miners.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Announce `node` as live.
    async fn register(&self, node: NodeId) -> Result<()>;

    /// Live nodes other than `requester`.
    async fn get_nodes(&self, requester: &NodeId) -> Result<Vec<NodeId>>;

    /// Keep `node` registered.
    async fn heartbeat(&self, node: &NodeId) -> Result<()>;
}

/// In-process registry for tests and simulation.
pub struct MemoryDiscovery {
    nodes: RwLock<HashMap<NodeId, Instant>>,
    expiry: Duration,
}

impl MemoryDiscovery {
    pub fn new(expiry: Duration) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            expiry,
        }
    }

    fn is_fresh(&self, last_seen: &Instant, now: Instant) -> bool {
        now.duration_since(*last_seen) <= self.expiry
    }
}

#[async_trait]
impl Discovery for MemoryDiscovery {
    async fn register(&self, node: NodeId) -> Result<()> {
        self.nodes.write().unwrap().insert(node, Instant::now());
        debug!(node = %node, "registered with discovery");
        Ok(())
    }

    async fn get_nodes(&self, requester: &NodeId) -> Result<Vec<NodeId>> {
        let now = Instant::now();
        let mut nodes = self.nodes.write().unwrap();
        nodes.retain(|_, last_seen| self.is_fresh(last_seen, now));
        if !nodes.contains_key(requester) {
            return Err(SyncError::UnknownNode(requester.to_string()));
        }
        let mut live: Vec<NodeId> = nodes.keys().filter(|id| *id != requester).copied().collect();
        live.sort();
        Ok(live)
    }

    async fn heartbeat(&self, node: &NodeId) -> Result<()> {
        let now = Instant::now();
        let mut nodes = self.nodes.write().unwrap();
        match nodes.get_mut(node) {
            Some(last_seen) if self.is_fresh(last_seen, now) => {
                *last_seen = now;
                Ok(())
            }
            _ => {
                nodes.remove(node);
                Err(SyncError::UnknownNode(node.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_nodes_excludes_requester() {
        let discovery = MemoryDiscovery::new(Duration::from_secs(60));
        let a = NodeId::from_bytes([1; 32]);
        let b = NodeId::from_bytes([2; 32]);
        discovery.register(a).await.unwrap();
        discovery.register(b).await.unwrap();

        assert_eq!(discovery.get_nodes(&a).await.unwrap(), vec![b]);
        assert!(discovery.heartbeat(&a).await.is_ok());
    }

    #[tokio::test]
    async fn test_unregistered_node_is_rejected() {
        let discovery = MemoryDiscovery::new(Duration::from_secs(60));
        let a = NodeId::from_bytes([1; 32]);
        assert!(matches!(discovery.heartbeat(&a).await, Err(SyncError::UnknownNode(_))));
        assert!(discovery.get_nodes(&a).await.is_err());
    }

    #[tokio::test]
    async fn test_missed_heartbeats_expire() {
        let discovery = MemoryDiscovery::new(Duration::from_millis(20));
        let a = NodeId::from_bytes([1; 32]);
        let b = NodeId::from_bytes([2; 32]);
        discovery.register(a).await.unwrap();
        discovery.register(b).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        discovery.heartbeat(&a).await.unwrap_err();
        discovery.register(a).await.unwrap();

        assert!(discovery.get_nodes(&a).await.unwrap().is_empty());
    }
}
