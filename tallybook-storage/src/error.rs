//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in local persistence.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store connection lock poisoned")]
    LockPoisoned,

    #[error("corrupt {kind} record {id}: {reason}")]
    Corrupt {
        kind: &'static str,
        id: String,
        reason: String,
    },

    #[error("crypto error: {0}")]
    Crypto(#[from] tallybook_crypto::CryptoError),
}
