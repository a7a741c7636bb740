//! Sync error types.

use tallybook_crypto::DecryptionError;
use tallybook_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while reading, writing or syncing.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The remote call never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered but rejected the operation.
    #[error("remote rejected {operation}: {message}")]
    Remote { operation: String, message: String },

    #[error("decryption error: {0}")]
    Decryption(#[from] DecryptionError),

    #[error("malformed queue entry {seq}: {reason}")]
    MalformedQueueEntry { seq: i64, reason: String },

    #[error("authentication required")]
    AuthRequired,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("coordinator not running")]
    ChannelClosed,
}

impl SyncError {
    /// Whether the failure should turn an online write into a queued one.
    pub fn should_queue(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Remote { .. })
    }

    pub(crate) fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Remote {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl From<tallybook_crypto::CryptoError> for SyncError {
    fn from(e: tallybook_crypto::CryptoError) -> Self {
        match e {
            tallybook_crypto::CryptoError::Decryption(d) => SyncError::Decryption(d),
            other => SyncError::Storage(StorageError::Crypto(other)),
        }
    }
}
