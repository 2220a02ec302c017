//! The canvas service: what a drawing client sees of its miner.
//!
//! Every call fails with `Disconnected` before `open_canvas`, after
//! `close_canvas` and once the miner has shut down. Application errors ride
//! in the reply's `error` field, separate from transport failure.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use blockart_core::{
    BlockHash, CanvasError, MinerNetSettings, OpKind, PublicKey, ShapeId, ShapeSpec, ShapeType,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::node::Node;

type CanvasResult<T> = std::result::Result<T, CanvasError>;

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanvasRequest {
    OpenCanvas {
        public_key: PublicKey,
    },
    AddShape {
        validate_num: u64,
        shape_type: ShapeType,
        svg: String,
        fill: String,
        stroke: String,
    },
    DeleteShape {
        validate_num: u64,
        shape: ShapeId,
    },
    GetInk,
    GetSvgString {
        shape: ShapeId,
    },
    GetShapes {
        block: BlockHash,
    },
    GetGenesisBlock,
    GetChildren {
        block: BlockHash,
    },
    CloseCanvas,
}

/// The successful part of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyBody {
    Empty,
    Settings(MinerNetSettings),
    Added {
        shape: ShapeId,
        block: BlockHash,
        ink_remaining: u64,
    },
    Ink(u64),
    Svg(String),
    Shapes(Vec<ShapeId>),
    Block(BlockHash),
    Blocks(Vec<BlockHash>),
}

/// A reply. `error` is set iff the call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasReply {
    pub body: ReplyBody,
    pub error: Option<CanvasError>,
}

impl CanvasReply {
    fn from_result<T>(result: CanvasResult<T>, body: impl FnOnce(T) -> ReplyBody) -> Self {
        match result {
            Ok(value) => Self {
                body: body(value),
                error: None,
            },
            Err(err) => Self {
                body: ReplyBody::Empty,
                error: Some(err),
            },
        }
    }
}

/// One client's canvas handle on a miner.
pub struct CanvasService {
    node: Arc<Node>,
    open: watch::Sender<bool>,
}

impl CanvasService {
    pub fn new(node: Arc<Node>) -> Self {
        let (open, _) = watch::channel(false);
        Self { node, open }
    }

    fn ensure_open(&self) -> CanvasResult<()> {
        if *self.open.borrow() && !self.node.is_shut_down() {
            Ok(())
        } else {
            Err(CanvasError::Disconnected)
        }
    }

    /// Handshake. Only the miner's own key may draw through it.
    pub fn open_canvas(&self, public_key: &PublicKey) -> CanvasResult<MinerNetSettings> {
        if self.node.is_shut_down() || *public_key != self.node.public_key() {
            return Err(CanvasError::Disconnected);
        }
        self.open.send_replace(true);
        info!(client = %public_key, "canvas opened");
        Ok(self.node.settings().clone())
    }

    /// Add a shape and wait for `validate_num` confirmations.
    ///
    /// Returns the shape id, the block holding it and the ink left.
    pub async fn add_shape(
        &self,
        validate_num: u64,
        shape_type: ShapeType,
        svg: &str,
        fill: &str,
        stroke: &str,
    ) -> CanvasResult<(ShapeId, BlockHash, u64)> {
        self.ensure_open()?;
        let op = self.node.sign(OpKind::Add(ShapeSpec {
            shape_type,
            svg: svg.to_owned(),
            fill: fill.to_owned(),
            stroke: stroke.to_owned(),
            created_at: now_millis(),
        }));
        let shape = op.id();
        debug!(shape = %shape, validate_num, "adding shape");
        let block = self.confirm(op, validate_num).await?;
        Ok((shape, block, self.node.ink()))
    }

    /// Delete one of this miner's live shapes. Returns the ink left.
    pub async fn delete_shape(&self, validate_num: u64, shape: ShapeId) -> CanvasResult<u64> {
        self.ensure_open()?;
        let op = self.node.sign(OpKind::Delete(shape));
        debug!(shape = %shape, validate_num, "deleting shape");
        self.confirm(op, validate_num).await?;
        Ok(self.node.ink())
    }

    async fn confirm(&self, op: blockart_core::Op, validate_num: u64) -> CanvasResult<BlockHash> {
        let mut open = self.open.subscribe();
        tokio::select! {
            confirmed = self.node.submit_and_confirm(op, validate_num) => confirmed,
            () = closed(&mut open) => Err(CanvasError::Disconnected),
        }
    }

    pub fn get_ink(&self) -> CanvasResult<u64> {
        self.ensure_open()?;
        Ok(self.node.ink())
    }

    /// The `<path>` element for an add op, or the erasing element for a
    /// delete op.
    pub fn get_svg_string(&self, shape: &ShapeId) -> CanvasResult<String> {
        self.ensure_open()?;
        let svg = self.node.read_chain(|tree| {
            let (block, op) = tree.find_op(shape)?;
            let ledger = tree.ledger_at(&block)?;
            match &op.kind {
                OpKind::Add(_) => ledger.shape(shape).map(|s| s.to_svg()),
                OpKind::Delete(target) => ledger.shape(target).map(|s| s.to_erased_svg()),
            }
        });
        svg.ok_or_else(|| CanvasError::InvalidShapeHash(shape.to_hex()))
    }

    /// Ids of the ops in `block`, in block order.
    pub fn get_shapes(&self, block: &BlockHash) -> CanvasResult<Vec<ShapeId>> {
        self.ensure_open()?;
        self.node
            .read_chain(|tree| tree.shape_ids(block))
            .ok_or_else(|| CanvasError::InvalidBlockHash(block.to_hex()))
    }

    pub fn get_genesis_block(&self) -> CanvasResult<BlockHash> {
        self.ensure_open()?;
        Ok(self.node.read_chain(|tree| tree.genesis()))
    }

    pub fn get_children(&self, block: &BlockHash) -> CanvasResult<Vec<BlockHash>> {
        self.ensure_open()?;
        self.node
            .read_chain(|tree| tree.children(block).map(<[BlockHash]>::to_vec))
            .ok_or_else(|| CanvasError::InvalidBlockHash(block.to_hex()))
    }

    /// Close the handle. Returns the ink left; later calls are `Disconnected`.
    pub fn close_canvas(&self) -> CanvasResult<u64> {
        self.ensure_open()?;
        let ink = self.node.ink();
        self.open.send_replace(false);
        info!(ink, "canvas closed");
        Ok(ink)
    }

    /// Dispatch a request.
    pub async fn handle(&self, request: CanvasRequest) -> CanvasReply {
        match request {
            CanvasRequest::OpenCanvas { public_key } => {
                CanvasReply::from_result(self.open_canvas(&public_key), ReplyBody::Settings)
            }
            CanvasRequest::AddShape {
                validate_num,
                shape_type,
                svg,
                fill,
                stroke,
            } => CanvasReply::from_result(
                self.add_shape(validate_num, shape_type, &svg, &fill, &stroke)
                    .await,
                |(shape, block, ink_remaining)| ReplyBody::Added {
                    shape,
                    block,
                    ink_remaining,
                },
            ),
            CanvasRequest::DeleteShape {
                validate_num,
                shape,
            } => CanvasReply::from_result(
                self.delete_shape(validate_num, shape).await,
                ReplyBody::Ink,
            ),
            CanvasRequest::GetInk => CanvasReply::from_result(self.get_ink(), ReplyBody::Ink),
            CanvasRequest::GetSvgString { shape } => {
                CanvasReply::from_result(self.get_svg_string(&shape), ReplyBody::Svg)
            }
            CanvasRequest::GetShapes { block } => {
                CanvasReply::from_result(self.get_shapes(&block), ReplyBody::Shapes)
            }
            CanvasRequest::GetGenesisBlock => {
                CanvasReply::from_result(self.get_genesis_block(), ReplyBody::Block)
            }
            CanvasRequest::GetChildren { block } => {
                CanvasReply::from_result(self.get_children(&block), ReplyBody::Blocks)
            }
            CanvasRequest::CloseCanvas => {
                CanvasReply::from_result(self.close_canvas(), ReplyBody::Ink)
            }
        }
    }
}

/// Resolves once the handle is closed.
async fn closed(open: &mut watch::Receiver<bool>) {
    let _ = open.wait_for(|open| !*open).await;
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
