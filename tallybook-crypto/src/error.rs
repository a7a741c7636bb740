//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Reasons a stored blob could not be turned back into plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptionError {
    #[error("blob was sealed with a different key")]
    KeyMismatch,
    #[error("malformed {field}: {reason}")]
    Malformed { field: &'static str, reason: String },
    #[error("ciphertext failed to decrypt (wrong key or tampered data)")]
    BadPadding,
    #[error("decrypted payload is not a valid record: {0}")]
    Payload(String),
}

/// Errors that can occur in the encryption layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("decryption failed: {0}")]
    Decryption(#[from] DecryptionError),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
