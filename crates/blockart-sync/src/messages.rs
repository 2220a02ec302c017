//! Peer protocol message types.
//!
//! Messages travel between miners as CBOR. Ops and blocks are flooded; the
//! rest are point-to-point requests and replies.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use blockart_core::{Block, BlockHash, Op, OpId, PublicKey};

use crate::error::{Result, SyncError};

/// Unique identifier for a node in the miner network.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random node ID.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }

    /// A miner is addressed by its public key.
    pub fn from_public_key(key: &PublicKey) -> Self {
        Self(key.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Message size limits.
pub mod limits {
    /// Max encoded size of any message.
    pub const MAX_MESSAGE_BYTES: usize = 1 << 20;
    /// Max ops carried by one block.
    pub const MAX_OPS_PER_BLOCK: usize = 512;
    /// Max node ids in a PeerList.
    pub const MAX_PEER_LIST: usize = 64;
}

/// Peer protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerMessage {
    /// First message on a new link.
    Hello {
        node_id: NodeId,
        protocol_version: u8,
        head: BlockHash,
        head_height: u64,
    },

    /// A pending op, flooded.
    Op(Op),

    /// A block, flooded. Also the reply to `GetBlock`.
    Block(Block),

    /// Ask for a block whose hash we saw as a parent.
    GetBlock { hash: BlockHash },

    /// Ask for the sender's neighbours.
    RequestPeers,

    /// Reply to `RequestPeers`.
    PeerList { peers: Vec<NodeId> },

    /// Liveness ping between neighbours.
    Heartbeat { node_id: NodeId },
}

/// Key of a flooded message in the seen-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Op(OpId),
    Block(BlockHash),
}

impl PeerMessage {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::Hello { .. } => "hello",
            PeerMessage::Op(_) => "op",
            PeerMessage::Block(_) => "block",
            PeerMessage::GetBlock { .. } => "get_block",
            PeerMessage::RequestPeers => "request_peers",
            PeerMessage::PeerList { .. } => "peer_list",
            PeerMessage::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Seen-set key for flooded messages; `None` for point-to-point ones.
    pub fn key(&self) -> Option<MessageKey> {
        match self {
            PeerMessage::Op(op) => Some(MessageKey::Op(op.id())),
            PeerMessage::Block(block) => Some(MessageKey::Block(block.hash)),
            _ => None,
        }
    }

    /// Check if this message respects size limits.
    pub fn validate_limits(&self) -> std::result::Result<(), &'static str> {
        match self {
            PeerMessage::Block(block) if block.ops.len() > limits::MAX_OPS_PER_BLOCK => {
                Err("too many ops in block")
            }
            PeerMessage::PeerList { peers } if peers.len() > limits::MAX_PEER_LIST => {
                Err("too many peers in list")
            }
            _ => Ok(()),
        }
    }

    /// Encode for the wire.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| SyncError::Codec(e.to_string()))?;
        if buf.len() > limits::MAX_MESSAGE_BYTES {
            return Err(SyncError::InvalidMessage(format!(
                "{} message is {} bytes",
                self.kind(),
                buf.len()
            )));
        }
        Ok(Bytes::from(buf))
    }

    /// Decode from the wire, enforcing limits.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > limits::MAX_MESSAGE_BYTES {
            return Err(SyncError::InvalidMessage(format!(
                "message is {} bytes",
                bytes.len()
            )));
        }
        let message: Self =
            ciborium::from_reader(bytes).map_err(|e| SyncError::Codec(e.to_string()))?;
        message
            .validate_limits()
            .map_err(|reason| SyncError::InvalidMessage(reason.to_string()))?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockart_core::{BlockTemplate, Keypair};

    #[test]
    fn test_block_message_survives_the_wire() {
        let kp = Keypair::from_seed(&[1; 32]);
        let op = Op::add_path(&kp, "M 0 0 L 10 10", "transparent", "black", 7);
        let block = BlockTemplate::new(BlockHash([2; 32]), 1, vec![op], kp.public_key()).seal(3, &kp);

        let bytes = PeerMessage::Block(block.clone()).to_bytes().unwrap();
        let back = PeerMessage::from_bytes(&bytes).unwrap();
        match back {
            PeerMessage::Block(decoded) => {
                assert_eq!(decoded, block);
                assert!(decoded.verify_hash().is_ok());
                assert!(decoded.verify_signature().is_ok());
            }
            other => panic!("expected block, got {}", other.kind()),
        }
    }

    #[test]
    fn test_garbage_is_a_codec_error() {
        assert!(matches!(
            PeerMessage::from_bytes(&[0xff, 0x00, 0x13]),
            Err(SyncError::Codec(_))
        ));
    }

    #[test]
    fn test_peer_list_limit() {
        let msg = PeerMessage::PeerList {
            peers: vec![NodeId([0u8; 32]); limits::MAX_PEER_LIST + 1],
        };
        assert!(msg.validate_limits().is_err());
        let bytes = msg.to_bytes().unwrap();
        assert!(matches!(
            PeerMessage::from_bytes(&bytes),
            Err(SyncError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_only_floods_have_keys() {
        let kp = Keypair::from_seed(&[1; 32]);
        let op = Op::delete(&kp, OpId::from_bytes([5; 32]));
        assert_eq!(PeerMessage::Op(op.clone()).key(), Some(MessageKey::Op(op.id())));
        assert_eq!(PeerMessage::RequestPeers.key(), None);
    }
}
