//! Encryption-at-rest for data cached on the device.
//!
//! Provides:
//! - AES-128-CBC encrypt/decrypt primitives over JSON-serializable values
//! - Argon2id key derivation from a stable device or user secret
//! - [`EncryptionVault`], which holds the derived key and seals/opens blobs
//!
//! # Key policy
//!
//! The vault key is never random-per-write. It is derived from a stable
//! secret and a per-store salt, so every blob written by one store stays
//! readable by that store after restart. Each write still gets a fresh IV.
//! Blobs carry a short fingerprint of the key so a wrong key is detected
//! before any plaintext is produced.

mod cipher;
mod error;
mod key;
mod vault;

pub use cipher::{
    decrypt_value, encrypt_value, encrypt_with_key, CipherKey, SealedBlob, BLOCK_SIZE, IV_SIZE,
    KEY_SIZE,
};
pub use error::{CryptoError, CryptoResult, DecryptionError};
pub use key::{derive_key, KdfParams, Salt, SALT_SIZE};
pub use vault::EncryptionVault;
