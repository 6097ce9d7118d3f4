//! Error types for the sync layer.

use objdist_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
///
/// None of these are fatal to a distributor or peer: transport failures are
/// logged and the affected message is dropped.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The state store rejected a mutation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A key that cannot be rendered as a keypath segment.
    #[error(transparent)]
    Key(#[from] objdist_types::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Send attempted on a channel that was torn down.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// Send attempted on a connection that is no longer open.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport-specific failure.
    #[error("transport error: {0}")]
    Transport(String),
}
