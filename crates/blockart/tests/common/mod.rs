//! Shared helpers for the miner integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use blockart::core::{Block, BlockTemplate, Keypair, MinerNetSettings, Op};
use blockart::store::BlockStore;
use blockart::sync::{Gossip, MemoryDiscovery, MemoryNetwork, NodeId};
use blockart::{MiningEngine, Node, NodeConfig};

/// Easy proof of work and quick heartbeats.
pub fn fast_settings() -> MinerNetSettings {
    MinerNetSettings {
        pow_difficulty_op_block: 1,
        pow_difficulty_noop_block: 1,
        heartbeat_ms: 400,
        ..MinerNetSettings::default()
    }
}

pub fn config(mining: bool) -> NodeConfig {
    let mut config = NodeConfig::from_settings(fast_settings());
    config.mining.enabled = mining;
    config.mining.noop_wait = Duration::from_millis(20);
    config
}

pub fn keypair(seed: u8) -> Keypair {
    Keypair::from_seed(&[seed; 32])
}

/// An in-process network that nodes join.
pub struct Net {
    pub network: Arc<MemoryNetwork>,
    pub discovery: Arc<MemoryDiscovery>,
}

impl Net {
    pub fn new() -> Self {
        Self {
            network: MemoryNetwork::new(),
            discovery: Arc::new(MemoryDiscovery::new(Duration::from_secs(30))),
        }
    }

    pub async fn node(
        &self,
        seed: u8,
        config: NodeConfig,
        store: Option<Arc<dyn BlockStore>>,
    ) -> Arc<Node> {
        let kp = keypair(seed);
        let transport = self
            .network
            .create_transport(NodeId::from_public_key(&kp.public_key()))
            .await;
        let gossip = Gossip::new(Arc::new(transport), self.discovery.clone(), config.gossip.clone());
        let node = Node::new(kp, config, gossip, store).await.unwrap();
        node.start().await.unwrap();
        node
    }
}

/// Seal a block on `parent` at difficulty 1.
pub fn mine_on(parent: &Block, ops: Vec<Op>, miner: &Keypair) -> Block {
    let template = BlockTemplate::new(parent.hash, parent.height + 1, ops, miner.public_key());
    let cancel = AtomicBool::new(false);
    let nonce = MiningEngine::search(&template, 1, 0, &cancel, u64::MAX).unwrap();
    template.seal(nonce, miner)
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
