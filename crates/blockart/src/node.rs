//! The ink miner: chain, pending pool, gossip and mining wired together.
//!
//! A running node has three background tasks: the gossip receive loop, the
//! mining loop and the peer maintenance loop. Client calls run on the
//! caller's task.
//!
//! Locks are always taken chain first, then pool, and are never held across
//! an await.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use blockart_core::{
    Block, BlockError, BlockHash, CanvasError, Keypair, MinerNetSettings, Op, OpId, OpKind,
    PublicKey,
};
use blockart_store::{AppendOutcome, BlockStore, BlockStoreExt, ChainTree};
use blockart_sync::{
    limits, Gossip, MessageKey, NodeId, OrphanPool, PeerMessage, SyncError, PROTOCOL_VERSION,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::miner::{MineOutcome, MinerState, MiningEngine};
use crate::pool::PendingPool;

/// Something that happened to this node's chain or pool.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// A block joined the tree, on any branch.
    BlockAppended { hash: BlockHash, height: u64 },
    /// The canonical head moved.
    HeadChanged {
        head: BlockHash,
        height: u64,
        reorg: bool,
    },
    /// A pending op stopped validating after the head moved.
    OpRejected { op: OpId, error: CanvasError },
}

/// Where an op stands on this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// In a canonical block, buried `depth` blocks deep.
    Confirmed { block: BlockHash, depth: u64 },
    /// Pending, or only on a side branch.
    Waiting,
    /// Dropped from the pool because it stopped validating after the head
    /// moved.
    Rejected(CanvasError),
    /// Neither pending nor in any block.
    Unknown,
}

/// One ink miner.
pub struct Node {
    keypair: Keypair,
    config: NodeConfig,
    chain: RwLock<ChainTree>,
    pool: Mutex<PendingPool>,
    orphans: Mutex<OrphanPool>,
    gossip: Gossip,
    store: Option<Arc<dyn BlockStore>>,
    miner: MiningEngine,
    events: broadcast::Sender<NodeEvent>,
    head: watch::Sender<BlockHash>,
    pool_rev: watch::Sender<u64>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Build a node. With a store, the chain is restored from it and every
    /// new block is written to it.
    pub async fn new(
        keypair: Keypair,
        config: NodeConfig,
        gossip: Gossip,
        store: Option<Arc<dyn BlockStore>>,
    ) -> Result<Arc<Self>> {
        let tree = match &store {
            Some(store) => store.restore_tree(config.settings.clone()).await?,
            None => ChainTree::new(config.settings.clone()),
        };
        let pool = PendingPool::new(*tree.validator(), &tree.head_ledger());
        let (head, _) = watch::channel(tree.head_hash());
        let (pool_rev, _) = watch::channel(0);
        let (shutdown, _) = watch::channel(false);
        let (events, _) = broadcast::channel(1024);
        let miner = MiningEngine::new(
            keypair.clone(),
            config.settings.clone(),
            config.mining.clone(),
        );
        let orphans = OrphanPool::new(config.gossip.max_orphans);

        Ok(Arc::new(Self {
            keypair,
            chain: RwLock::new(tree),
            pool: Mutex::new(pool),
            orphans: Mutex::new(orphans),
            gossip,
            store,
            miner,
            events,
            head,
            pool_rev,
            shutdown,
            tasks: Mutex::new(Vec::new()),
            config,
        }))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Register with discovery, connect to peers and start the background
    /// tasks. A node that has been shut down cannot be restarted.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.is_shut_down() {
            return Err(NodeError::Shutdown);
        }
        self.gossip.join().await?;
        if let Err(err) = self.gossip.maintain_peers(&self.hello()).await {
            warn!(error = %err, "initial peer lookup failed");
        }

        let mut spawned = vec![
            tokio::spawn(self.clone().gossip_loop()),
            tokio::spawn(self.clone().maintenance_loop()),
        ];
        if self.config.mining.enabled {
            spawned.push(tokio::spawn(self.clone().mining_loop()));
        }
        self.tasks.lock().unwrap().extend(spawned);

        info!(
            node = %self.node_id(),
            miner = %self.public_key(),
            head = %self.head().hash,
            "miner started"
        );
        Ok(())
    }

    /// Stop every background task. Pending client calls fail with
    /// `Disconnected`.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "task ended abnormally");
            }
        }
        self.miner.set_state(MinerState::Idle);
        info!(node = %self.node_id(), "miner stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn node_id(&self) -> NodeId {
        self.gossip.local_id()
    }

    pub fn settings(&self) -> &MinerNetSettings {
        &self.config.settings
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn miner_state(&self) -> MinerState {
        self.miner.state()
    }

    /// Follow chain and pool events.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Run `f` against the chain under the read lock.
    pub fn read_chain<R>(&self, f: impl FnOnce(&ChainTree) -> R) -> R {
        let tree = self.chain.read().unwrap();
        f(&tree)
    }

    pub fn head(&self) -> Arc<Block> {
        self.read_chain(|tree| tree.head().clone())
    }

    /// Ink of `owner` at the canonical head.
    pub fn ink_of(&self, owner: &PublicKey) -> u64 {
        self.read_chain(|tree| tree.head_ledger().balance(owner))
    }

    /// This miner's own ink at the canonical head.
    pub fn ink(&self) -> u64 {
        self.ink_of(&self.public_key())
    }

    pub fn pending_ops(&self) -> Vec<Op> {
        self.pool.lock().unwrap().ops().to_vec()
    }

    pub async fn peers(&self) -> Vec<NodeId> {
        self.gossip.peers().await
    }

    /// Where `op` stands right now.
    pub fn confirmation(&self, op: &OpId) -> Confirmation {
        let tree = self.chain.read().unwrap();
        if let Some(block) = tree.locate_op(op) {
            if let Some(depth) = tree.confirmation_depth(&block) {
                return Confirmation::Confirmed { block, depth };
            }
        }
        let pool = self.pool.lock().unwrap();
        if pool.contains(op) {
            Confirmation::Waiting
        } else if let Some(error) = pool.rejection(op) {
            Confirmation::Rejected(error.clone())
        } else if tree.find_op(op).is_some() {
            Confirmation::Waiting
        } else {
            Confirmation::Unknown
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ops
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign an op with this miner's key.
    pub fn sign(&self, kind: OpKind) -> Op {
        Op::new(kind, &self.keypair)
    }

    /// Validate an op against the head plus pending ops, queue it and
    /// flood it.
    pub async fn submit_op(&self, op: Op) -> std::result::Result<OpId, CanvasError> {
        if self.is_shut_down() {
            return Err(CanvasError::Disconnected);
        }
        let id = op.id();
        if self.enqueue(op.clone())? {
            self.gossip.flood(&PeerMessage::Op(op)).await;
        }
        Ok(id)
    }

    /// Submit an op and wait until its block is `validate_num` deep.
    pub async fn submit_and_confirm(
        &self,
        op: Op,
        validate_num: u64,
    ) -> std::result::Result<BlockHash, CanvasError> {
        let events = self.events.subscribe();
        let id = self.submit_op(op).await?;
        self.await_depth(id, validate_num, events).await
    }

    /// Wait until `op`'s canonical block has `validate_num` blocks on top.
    ///
    /// Fails with the validation error if the op is dropped after a head
    /// change, and with `Disconnected` on shutdown.
    pub async fn wait_confirmed(
        &self,
        op: OpId,
        validate_num: u64,
    ) -> std::result::Result<BlockHash, CanvasError> {
        let events = self.events.subscribe();
        self.await_depth(op, validate_num, events).await
    }

    async fn await_depth(
        &self,
        op: OpId,
        validate_num: u64,
        mut events: broadcast::Receiver<NodeEvent>,
    ) -> std::result::Result<BlockHash, CanvasError> {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow() {
                return Err(CanvasError::Disconnected);
            }
            match self.confirmation(&op) {
                Confirmation::Confirmed { block, depth } if depth >= validate_num => {
                    return Ok(block);
                }
                Confirmation::Rejected(error) => return Err(error),
                Confirmation::Unknown => return Err(CanvasError::InvalidShapeHash(op.to_hex())),
                _ => {}
            }

            tokio::select! {
                event = events.recv() => match event {
                    Ok(NodeEvent::OpRejected { op: rejected, error }) if rejected == op => {
                        return Err(error);
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return Err(CanvasError::Disconnected),
                },
                _ = shutdown.changed() => return Err(CanvasError::Disconnected),
            }
        }
    }

    fn enqueue(&self, op: Op) -> std::result::Result<bool, CanvasError> {
        let queued = self.pool.lock().unwrap().submit(op)?;
        if queued {
            self.pool_rev.send_modify(|rev| *rev += 1);
        }
        Ok(queued)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Blocks
    // ─────────────────────────────────────────────────────────────────────────

    /// Feed a block in as if a peer had sent it, without a peer to ask for
    /// missing parents.
    pub async fn receive_block(&self, block: Block) {
        self.ingest_block(block, None).await;
    }

    /// Append a block and any orphans it unblocks, flooding each one that
    /// is new. Only blocks that joined the tree count as seen by gossip.
    async fn ingest_block(&self, block: Block, from: Option<NodeId>) {
        let origin = block.hash;
        let mut queue = VecDeque::from([block]);
        while let Some(block) = queue.pop_front() {
            let hash = block.hash;
            match self.append(block.clone()) {
                Ok(appended) => {
                    if let Some(peer) = from.filter(|_| hash == origin) {
                        self.gossip.accept(&peer, MessageKey::Block(hash));
                    }
                    if appended {
                        self.persist(&block).await;
                        self.gossip.flood(&PeerMessage::Block(block)).await;
                        let unblocked = self.orphans.lock().unwrap().take_children(&hash);
                        queue.extend(unblocked);
                    }
                }
                Err(BlockError::UnknownParent(parent)) => {
                    let parked = self.orphans.lock().unwrap().insert(block);
                    debug!(block = %hash, parent = %parent, "parked orphan");
                    if let (true, Some(peer)) = (parked, from) {
                        let request = PeerMessage::GetBlock { hash: parent };
                        if let Err(err) = self.gossip.send(&peer, &request).await {
                            debug!(peer = %peer, error = %err, "parent request failed");
                        }
                    }
                }
                Err(err) => warn!(block = %hash, error = %err, "dropping invalid block"),
            }
        }
    }

    /// Append under the chain lock and rebase the pool if the head moved.
    /// False if the block was already known.
    fn append(&self, block: Block) -> std::result::Result<bool, BlockError> {
        let height = block.height;
        let (hash, change, head_height, rejected) = {
            let mut tree = self.chain.write().unwrap();
            let AppendOutcome::Appended { hash, head_change } = tree.append(block)? else {
                return Ok(false);
            };
            let rejected = match &head_change {
                Some(change) => self
                    .pool
                    .lock()
                    .unwrap()
                    .rebase(&tree.head_ledger(), change.dropped.clone()),
                None => Vec::new(),
            };
            (hash, head_change, tree.head().height, rejected)
        };

        let _ = self.events.send(NodeEvent::BlockAppended { hash, height });
        if let Some(change) = change {
            self.head.send_replace(change.new_head);
            debug!(head = %change.new_head, height = head_height, reorg = change.reorg, "head moved");
            let _ = self.events.send(NodeEvent::HeadChanged {
                head: change.new_head,
                height: head_height,
                reorg: change.reorg,
            });
        }
        for (op, error) in rejected {
            warn!(op = %op, error = %error, "pending op rejected");
            let _ = self.events.send(NodeEvent::OpRejected { op, error });
        }
        Ok(true)
    }

    async fn persist(&self, block: &Block) {
        if let Some(store) = &self.store {
            if let Err(err) = store.insert_block(block).await {
                warn!(block = %block.hash, error = %err, "failed to persist block");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Peer messages
    // ─────────────────────────────────────────────────────────────────────────

    fn hello(&self) -> PeerMessage {
        let (head, head_height) = self.read_chain(|tree| (tree.head_hash(), tree.head().height));
        PeerMessage::Hello {
            node_id: self.node_id(),
            protocol_version: PROTOCOL_VERSION,
            head,
            head_height,
        }
    }

    async fn handle_message(&self, from: NodeId, message: PeerMessage) {
        if !self.gossip.observe(&from, &message) {
            return;
        }
        if let Err(reason) = message.validate_limits() {
            warn!(peer = %from, kind = message.kind(), reason, "dropping oversized message");
            return;
        }

        match message {
            PeerMessage::Hello {
                protocol_version,
                head,
                head_height,
                ..
            } => self.on_hello(from, protocol_version, head, head_height).await,
            PeerMessage::Op(op) => {
                let id = op.id();
                match self.enqueue(op.clone()) {
                    Ok(queued) => {
                        self.gossip.accept(&from, MessageKey::Op(id));
                        if queued {
                            self.gossip.flood(&PeerMessage::Op(op)).await;
                        }
                    }
                    Err(err) => debug!(peer = %from, op = %id, error = %err, "dropping invalid op"),
                }
            }
            PeerMessage::Block(block) => self.ingest_block(block, Some(from)).await,
            PeerMessage::GetBlock { hash } => {
                let block = self.read_chain(|tree| tree.get(&hash).map(|b| Block::clone(b)));
                match block {
                    Some(block) if !block.is_genesis() => {
                        self.reply(&from, PeerMessage::Block(block)).await;
                    }
                    _ => debug!(peer = %from, block = %hash, "cannot serve block"),
                }
            }
            PeerMessage::RequestPeers => {
                let mut peers = self.gossip.peers().await;
                peers.retain(|peer| *peer != from);
                peers.truncate(limits::MAX_PEER_LIST);
                self.reply(&from, PeerMessage::PeerList { peers }).await;
            }
            PeerMessage::PeerList { peers } => {
                let added = self.gossip.add_peers(&peers, &self.hello()).await;
                if !added.is_empty() {
                    debug!(added = added.len(), "connected through peer exchange");
                }
            }
            PeerMessage::Heartbeat { .. } => {}
        }
    }

    /// Share the head block and pending ops with a new neighbour, and ask
    /// for its head if we lack it.
    async fn on_hello(&self, from: NodeId, version: u8, head: BlockHash, head_height: u64) {
        if version != PROTOCOL_VERSION {
            let err = SyncError::VersionMismatch {
                local: PROTOCOL_VERSION,
                peer: version,
            };
            warn!(peer = %from, error = %err, "ignoring peer");
            return;
        }

        let (own_head, pending, have_theirs) = {
            let tree = self.chain.read().unwrap();
            let pending = self.pool.lock().unwrap().ops().to_vec();
            (tree.head().clone(), pending, tree.contains(&head))
        };

        if !own_head.is_genesis() {
            self.reply(&from, PeerMessage::Block(Block::clone(&own_head))).await;
        }
        for op in pending {
            self.reply(&from, PeerMessage::Op(op)).await;
        }
        if !have_theirs && head_height > 0 {
            self.reply(&from, PeerMessage::GetBlock { hash: head }).await;
        }
    }

    async fn reply(&self, peer: &NodeId, message: PeerMessage) {
        if let Err(err) = self.gossip.send(peer, &message).await {
            debug!(peer = %peer, kind = message.kind(), error = %err, "send failed");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Background tasks
    // ─────────────────────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self), fields(node = %self.node_id()))]
    async fn gossip_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow() {
                break;
            }
            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.gossip.recv() => received,
            };
            match received {
                Ok((from, message)) => self.handle_message(from, message).await,
                Err(SyncError::Codec(err)) | Err(SyncError::InvalidMessage(err)) => {
                    warn!(error = %err, "dropping malformed message");
                }
                Err(err) => {
                    warn!(error = %err, "transport closed");
                    break;
                }
            }
        }
    }

    #[tracing::instrument(skip(self), fields(node = %self.node_id()))]
    async fn mining_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let noop_wait = self.miner.config().noop_wait;
        loop {
            if *shutdown.borrow() {
                break;
            }

            // Give ops a chance to arrive before settling for a no-op block.
            let mut arrivals = self.pool_rev.subscribe();
            if self.pool_is_empty() {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = arrivals.changed() => {}
                    _ = tokio::time::sleep(noop_wait) => {}
                }
            }

            let mut head_moved = self.head.subscribe();
            let mut arrivals = self.pool_rev.subscribe();
            let mut stop = shutdown.clone();
            let template = self.assemble();
            let noop = template.is_noop();
            let preempt = async move {
                tokio::select! {
                    _ = head_moved.changed() => {}
                    _ = stop.changed() => {}
                    _ = arrivals.changed(), if noop => {}
                }
            };

            match self.miner.mine(template, preempt).await {
                Ok(MineOutcome::Found(block)) => {
                    self.ingest_block(block, None).await;
                    self.miner.set_state(MinerState::Idle);
                }
                Ok(MineOutcome::Preempted) => {}
                Err(err) => warn!(error = %err, "mining failed"),
            }
        }
        self.miner.set_state(MinerState::Idle);
    }

    fn pool_is_empty(&self) -> bool {
        self.pool.lock().unwrap().is_empty()
    }

    fn assemble(&self) -> blockart_core::BlockTemplate {
        let tree = self.chain.read().unwrap();
        let pool = self.pool.lock().unwrap();
        self.miner.assemble(&tree, &pool)
    }

    #[tracing::instrument(skip(self), fields(node = %self.node_id()))]
    async fn maintenance_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut peer_tick = tokio::time::interval(self.gossip.config().peer_poll_interval);
        let mut heartbeat_tick = tokio::time::interval(self.gossip.config().heartbeat_interval);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = peer_tick.tick() => {
                    match self.gossip.maintain_peers(&self.hello()).await {
                        Ok(added) if !added.is_empty() => {
                            info!(added = added.len(), "topped up neighbours");
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "peer maintenance failed"),
                    }
                }
                _ = heartbeat_tick.tick() => {
                    if let Err(err) = self.gossip.heartbeat().await {
                        warn!(error = %err, "heartbeat failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockart_core::{BlockTemplate, OpKind, ShapeSpec, ShapeType};
    use blockart_sync::{MemoryDiscovery, MemoryNetwork};
    use std::time::Duration;

    fn quick_config() -> NodeConfig {
        let mut config = NodeConfig::from_settings(MinerNetSettings {
            pow_difficulty_op_block: 1,
            pow_difficulty_noop_block: 1,
            ..MinerNetSettings::default()
        });
        config.mining.enabled = false;
        config
    }

    async fn idle_node(seed: u8) -> Arc<Node> {
        idle_node_with(seed, quick_config()).await
    }

    async fn idle_node_with(seed: u8, config: NodeConfig) -> Arc<Node> {
        let network = MemoryNetwork::new();
        let discovery = Arc::new(MemoryDiscovery::new(Duration::from_secs(60)));
        let kp = Keypair::from_seed(&[seed; 32]);
        let transport = network.create_transport(NodeId::from_public_key(&kp.public_key())).await;
        let gossip = Gossip::new(Arc::new(transport), discovery, config.gossip.clone());
        Node::new(kp, config, gossip, None).await.unwrap()
    }

    fn mine_on(parent: &Block, ops: Vec<Op>, kp: &Keypair) -> Block {
        let template = BlockTemplate::new(parent.hash, parent.height + 1, ops, kp.public_key());
        let cancel = std::sync::atomic::AtomicBool::new(false);
        let nonce = MiningEngine::search(&template, 1, 0, &cancel, u64::MAX).unwrap();
        template.seal(nonce, kp)
    }

    fn stroke(node: &Node, svg: &str) -> Op {
        node.sign(OpKind::Add(ShapeSpec {
            shape_type: ShapeType::Path,
            svg: svg.into(),
            fill: "transparent".into(),
            stroke: "black".into(),
            created_at: 0,
        }))
    }

    #[tokio::test]
    async fn test_op_confirms_at_requested_depth() {
        let node = idle_node(1).await;
        let kp = Keypair::from_seed(&[1; 32]);

        // Earn ink with a no-op block first.
        let b1 = mine_on(&node.head(), vec![], &kp);
        node.receive_block(b1.clone()).await;
        assert_eq!(node.ink(), 25);

        let op = stroke(&node, "M 0 0 L 10 0");
        let waiter = {
            let node = node.clone();
            let op = op.clone();
            tokio::spawn(async move { node.submit_and_confirm(op, 1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(node.confirmation(&op.id()), Confirmation::Waiting);

        let b2 = mine_on(&b1, node.pending_ops(), &kp);
        node.receive_block(b2.clone()).await;
        assert_eq!(
            node.confirmation(&op.id()),
            Confirmation::Confirmed {
                block: b2.hash,
                depth: 0
            }
        );
        assert!(node.pending_ops().is_empty());

        let b3 = mine_on(&b2, vec![], &kp);
        node.receive_block(b3).await;

        let confirmed = waiter.await.unwrap().unwrap();
        assert_eq!(confirmed, b2.hash);
        // 25 + 50 + 25 earned, 10 spent.
        assert_eq!(node.ink(), 90);
    }

    #[tokio::test]
    async fn test_rejected_op_fails_fast() {
        let node = idle_node(1).await;
        let op = stroke(&node, "M 0 0 L 10 0");
        assert_eq!(
            node.submit_and_confirm(op, 0).await,
            Err(CanvasError::InsufficientInk(0))
        );
    }

    #[tokio::test]
    async fn test_reorg_tells_waiter_why_op_was_dropped() {
        let node = idle_node(1).await;
        let own = Keypair::from_seed(&[1; 32]);
        let rival = Keypair::from_seed(&[2; 32]);
        let genesis = node.head();

        let b1 = mine_on(&genesis, vec![], &own);
        node.receive_block(b1).await;

        let op = stroke(&node, "M 0 0 L 10 0");
        let waiter = {
            let node = node.clone();
            let op = op.clone();
            tokio::spawn(async move { node.submit_and_confirm(op, 1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A longer branch where our key still has ink but the rival drew the
        // same stroke first.
        let c1 = mine_on(&genesis, vec![], &own);
        let c2 = mine_on(&c1, vec![], &rival);
        let same_stroke = Op::new(
            OpKind::Add(ShapeSpec {
                shape_type: ShapeType::Path,
                svg: "M 0 0 L 10 0".into(),
                fill: "transparent".into(),
                stroke: "black".into(),
                created_at: 0,
            }),
            &rival,
        );
        let c3 = mine_on(&c2, vec![same_stroke], &rival);
        for block in [c1, c2, c3.clone()] {
            node.receive_block(block).await;
        }
        assert_eq!(node.head().hash, c3.hash);

        assert!(matches!(
            waiter.await.unwrap(),
            Err(CanvasError::ShapeOverlap(_))
        ));
        assert!(matches!(
            node.confirmation(&op.id()),
            Confirmation::Rejected(CanvasError::ShapeOverlap(_))
        ));
        assert!(node.pending_ops().is_empty());
    }

    #[tokio::test]
    async fn test_orphan_is_adopted_when_parent_arrives() {
        let node = idle_node(1).await;
        let kp = Keypair::from_seed(&[2; 32]);
        let b1 = mine_on(&node.head(), vec![], &kp);
        let b2 = mine_on(&b1, vec![], &kp);

        node.receive_block(b2.clone()).await;
        assert_eq!(node.head().hash, node.read_chain(|tree| tree.genesis()));

        node.receive_block(b1).await;
        assert_eq!(node.head().hash, b2.hash);
    }

    #[tokio::test]
    async fn test_evicted_orphan_is_accepted_when_sent_again() {
        let mut config = quick_config();
        config.gossip.max_orphans = 1;
        let node = idle_node_with(1, config).await;
        let peer = NodeId::from_bytes([7; 32]);
        let kp = Keypair::from_seed(&[2; 32]);
        let genesis = node.head();

        let b1 = mine_on(&genesis, vec![], &kp);
        let b2 = mine_on(&b1, vec![], &kp);
        let c1 = mine_on(&genesis, vec![], &Keypair::from_seed(&[3; 32]));
        let c2 = mine_on(&c1, vec![], &kp);

        // b2 is parked, then pushed out by c2.
        node.handle_message(peer, PeerMessage::Block(b2.clone())).await;
        node.handle_message(peer, PeerMessage::Block(c2)).await;

        // A copy of b1 with a false hash must not block the real one.
        let mut forged = b1.clone();
        forged.nonce = forged.nonce.wrapping_add(1);
        node.handle_message(peer, PeerMessage::Block(forged)).await;
        assert!(!node.read_chain(|tree| tree.contains(&b1.hash)));

        node.handle_message(peer, PeerMessage::Block(b1.clone())).await;
        assert_eq!(node.head().hash, b1.hash);

        // The answer to the parent request brings b2 back.
        node.handle_message(peer, PeerMessage::Block(b2.clone())).await;
        assert_eq!(node.head().hash, b2.hash);
        assert!(node.gossip.has_seen(&MessageKey::Block(b2.hash)));
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_waiters() {
        let node = idle_node(1).await;
        let kp = Keypair::from_seed(&[1; 32]);
        node.receive_block(mine_on(&node.head(), vec![], &kp)).await;

        let op = stroke(&node, "M 0 0 L 10 0");
        let waiter = {
            let node = node.clone();
            tokio::spawn(async move { node.submit_and_confirm(op, 0).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        node.shutdown().await;

        assert_eq!(waiter.await.unwrap(), Err(CanvasError::Disconnected));
        assert!(matches!(
            node.submit_op(stroke(&node, "M 0 5 L 10 5")).await,
            Err(CanvasError::Disconnected)
        ));
        assert!(matches!(node.start().await, Err(NodeError::Shutdown)));
    }
}
