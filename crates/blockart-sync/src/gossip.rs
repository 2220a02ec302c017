//! Flooding with deduplication, and peer-set upkeep.
//!
//! Every op and block is flooded to all neighbours except those known to
//! hold it already. A bounded seen-set, keyed by op id or block hash,
//! remembers which neighbours sent or were sent each message, so floods
//! terminate on cyclic peer graphs. A key enters the seen-set only once the
//! node has accepted the message; anything it parked or refused can still
//! arrive again.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use blockart_core::MinerNetSettings;
use lru::LruCache;
use tracing::{debug, info, warn};

use crate::discovery::Discovery;
use crate::error::{Result, SyncError};
use crate::messages::{MessageKey, NodeId, PeerMessage};
use crate::transport::Transport;

/// Configuration for gossip behaviour.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Below this many neighbours, look for more.
    pub min_peers: usize,
    /// Flooded messages remembered for deduplication.
    pub seen_cache_size: usize,
    /// Blocks parked while their parent is fetched.
    pub max_orphans: usize,
    /// How often the peer count is checked.
    pub peer_poll_interval: Duration,
    /// How often discovery and neighbours are pinged.
    pub heartbeat_interval: Duration,
    /// Neighbours silent for this long are dropped.
    pub peer_timeout: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            min_peers: 2,
            seen_cache_size: 10_000,
            max_orphans: 256,
            peer_poll_interval: Duration::from_millis(500),
            heartbeat_interval: Duration::from_millis(500),
            peer_timeout: Duration::from_secs(8),
        }
    }
}

impl GossipConfig {
    /// Peer minimum and heartbeat timing from the network settings.
    pub fn from_settings(settings: &MinerNetSettings) -> Self {
        let heartbeat = u64::from(settings.heartbeat_ms);
        Self {
            min_peers: usize::from(settings.min_num_miner_connections),
            heartbeat_interval: Duration::from_millis((heartbeat / 4).max(10)),
            peer_timeout: Duration::from_millis((heartbeat * 4).max(100)),
            ..Self::default()
        }
    }
}

/// Bounded record of flooded messages and the neighbours that hold them.
pub struct SeenCache {
    inner: Mutex<LruCache<MessageKey, HashSet<NodeId>>>,
}

impl SeenCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Record `key`, optionally held by `peer`. True the first time.
    pub fn record(&self, key: MessageKey, peer: Option<NodeId>) -> bool {
        let mut cache = self.inner.lock().unwrap();
        let fresh = !cache.contains(&key);
        let holders = cache.get_or_insert_mut(key, HashSet::new);
        if let Some(peer) = peer {
            holders.insert(peer);
        }
        fresh
    }

    pub fn has_seen(&self, key: &MessageKey) -> bool {
        self.inner.lock().unwrap().contains(key)
    }

    /// Of `peers`, those not known to hold `key`; they are marked as holders.
    fn claim_targets(&self, key: MessageKey, peers: &[NodeId]) -> Vec<NodeId> {
        let mut cache = self.inner.lock().unwrap();
        let holders = cache.get_or_insert_mut(key, HashSet::new);
        peers
            .iter()
            .copied()
            .filter(|peer| holders.insert(*peer))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The gossip layer of one miner.
pub struct Gossip {
    transport: Arc<dyn Transport>,
    discovery: Arc<dyn Discovery>,
    config: GossipConfig,
    seen: SeenCache,
    last_heard: Mutex<HashMap<NodeId, Instant>>,
}

impl Gossip {
    pub fn new(
        transport: Arc<dyn Transport>,
        discovery: Arc<dyn Discovery>,
        config: GossipConfig,
    ) -> Self {
        Self {
            seen: SeenCache::new(config.seen_cache_size),
            transport,
            discovery,
            config,
            last_heard: Mutex::new(HashMap::new()),
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.transport.local_node_id()
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    /// Register with discovery.
    pub async fn join(&self) -> Result<()> {
        self.discovery.register(self.local_id()).await
    }

    /// Note an inbound message. False if it is a flood this node already
    /// accepted; the sender is then remembered as a holder.
    pub fn observe(&self, from: &NodeId, message: &PeerMessage) -> bool {
        self.last_heard.lock().unwrap().insert(*from, Instant::now());
        match message.key() {
            Some(key) if self.seen.has_seen(&key) => {
                self.seen.record(key, Some(*from));
                false
            }
            _ => true,
        }
    }

    /// Mark an inbound flood as accepted, with `from` holding it.
    pub fn accept(&self, from: &NodeId, key: MessageKey) {
        self.seen.record(key, Some(*from));
    }

    /// Whether a flood has passed through this node.
    pub fn has_seen(&self, key: &MessageKey) -> bool {
        self.seen.has_seen(key)
    }

    /// Send a flooded message to every neighbour that lacks it.
    ///
    /// Returns the number of neighbours it was sent to.
    pub async fn flood(&self, message: &PeerMessage) -> usize {
        let peers = self.transport.connected_peers().await;
        let targets = match message.key() {
            Some(key) => {
                self.seen.record(key, None);
                self.seen.claim_targets(key, &peers)
            }
            None => peers,
        };

        let mut sent = 0;
        for peer in &targets {
            match self.transport.send(peer, message).await {
                Ok(()) => sent += 1,
                Err(err) => debug!(peer = %peer, error = %err, kind = message.kind(), "flood send failed"),
            }
        }
        debug!(kind = message.kind(), sent, "flooded");
        sent
    }

    pub async fn send(&self, peer: &NodeId, message: &PeerMessage) -> Result<()> {
        self.transport.send(peer, message).await
    }

    pub async fn recv(&self) -> Result<(NodeId, PeerMessage)> {
        self.transport.recv().await
    }

    pub async fn recv_timeout(&self, timeout: Duration) -> Result<Option<(NodeId, PeerMessage)>> {
        self.transport.recv_timeout(timeout).await
    }

    pub async fn peers(&self) -> Vec<NodeId> {
        self.transport.connected_peers().await
    }

    async fn link(&self, peer: &NodeId, hello: &PeerMessage) -> bool {
        if let Err(err) = self.transport.connect(peer).await {
            debug!(peer = %peer, error = %err, "connect failed");
            return false;
        }
        self.last_heard.lock().unwrap().insert(*peer, Instant::now());
        if let Err(err) = self.transport.send(peer, hello).await {
            warn!(peer = %peer, error = %err, "hello failed");
        }
        info!(peer = %peer, "neighbour connected");
        true
    }

    /// Connect to candidates until the peer minimum is met.
    ///
    /// Returns the peers newly connected.
    pub async fn add_peers(&self, candidates: &[NodeId], hello: &PeerMessage) -> Vec<NodeId> {
        let local = self.local_id();
        let mut connected = self.peers().await;
        let mut added = Vec::new();
        for candidate in candidates {
            if connected.len() >= self.config.min_peers {
                break;
            }
            if *candidate == local || connected.contains(candidate) {
                continue;
            }
            if self.link(candidate, hello).await {
                connected.push(*candidate);
                added.push(*candidate);
            }
        }
        added
    }

    /// Drop silent neighbours, then top up from discovery and peer exchange.
    ///
    /// Returns the peers newly connected.
    pub async fn maintain_peers(&self, hello: &PeerMessage) -> Result<Vec<NodeId>> {
        self.prune_silent().await;

        let connected = self.peers().await;
        if connected.len() >= self.config.min_peers {
            return Ok(Vec::new());
        }

        let candidates = self.discovery.get_nodes(&self.local_id()).await?;
        let added = self.add_peers(&candidates, hello).await;

        let connected = self.peers().await;
        if connected.len() < self.config.min_peers {
            for peer in &connected {
                let _ = self.transport.send(peer, &PeerMessage::RequestPeers).await;
            }
        }
        Ok(added)
    }

    async fn prune_silent(&self) {
        let now = Instant::now();
        for peer in self.peers().await {
            let silent = {
                let mut heard = self.last_heard.lock().unwrap();
                let last = *heard.entry(peer).or_insert(now);
                now.duration_since(last) > self.config.peer_timeout
            };
            if silent {
                warn!(peer = %peer, "dropping silent neighbour");
                self.transport.disconnect(&peer).await;
                self.last_heard.lock().unwrap().remove(&peer);
            }
        }
    }

    /// Ping discovery and every neighbour. Re-registers if discovery
    /// forgot this node.
    pub async fn heartbeat(&self) -> Result<()> {
        let local = self.local_id();
        match self.discovery.heartbeat(&local).await {
            Ok(()) => {}
            Err(SyncError::UnknownNode(_)) => {
                warn!("discovery expired this node; registering again");
                self.discovery.register(local).await?;
            }
            Err(err) => return Err(err),
        }

        let ping = PeerMessage::Heartbeat { node_id: local };
        for peer in self.peers().await {
            let _ = self.transport.send(&peer, &ping).await;
        }
        Ok(())
    }
}
