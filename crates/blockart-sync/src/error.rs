//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur while talking to peers or discovery.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Protocol version mismatch with peer.
    #[error("protocol version mismatch: local={local}, peer={peer}")]
    VersionMismatch { local: u8, peer: u8 },

    /// Message violates protocol limits.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Peer is not connected.
    #[error("peer not connected: {0}")]
    PeerNotConnected(String),

    /// Discovery does not know this node.
    #[error("unknown node: {0}")]
    UnknownNode(String),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
