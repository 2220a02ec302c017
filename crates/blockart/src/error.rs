//! Error types for the ink miner.

use blockart_core::{BlockError, CanvasError};
use blockart_store::StoreError;
use blockart_sync::SyncError;
use thiserror::Error;

/// Errors that can occur while running a miner.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Peer or discovery error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// A block was rejected by the chain.
    #[error("block rejected: {0}")]
    Block(#[from] BlockError),

    /// An op was rejected.
    #[error(transparent)]
    Canvas(#[from] CanvasError),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),

    /// The node has been shut down.
    #[error("node is shut down")]
    Shutdown,
}

/// Result type for miner operations.
pub type Result<T> = std::result::Result<T, NodeError>;
