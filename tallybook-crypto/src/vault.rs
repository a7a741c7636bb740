use crate::cipher::{decrypt_value, encrypt_with_key, CipherKey, SealedBlob};
use crate::error::{CryptoResult, DecryptionError};
use crate::key::{derive_key, KdfParams, Salt};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Holds the key protecting everything cached on this device.
///
/// Key material never leaves the vault; callers only see [`SealedBlob`]s.
pub struct EncryptionVault {
    key: CipherKey,
}

impl EncryptionVault {
    /// Derives the vault key from a stable secret and the store's salt.
    pub fn unlock(secret: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<Self> {
        Ok(Self {
            key: derive_key(secret, salt, params)?,
        })
    }

    /// Encrypts `value` with the vault key and a fresh IV.
    pub fn seal<T: Serialize>(&self, value: &T) -> CryptoResult<SealedBlob> {
        encrypt_with_key(&self.key, value)
    }

    /// Decrypts a blob sealed by this vault.
    pub fn open<T: DeserializeOwned>(&self, blob: &SealedBlob) -> Result<T, DecryptionError> {
        if blob.key_check != self.key.fingerprint() {
            return Err(DecryptionError::KeyMismatch);
        }
        decrypt_value(&blob.ciphertext, &self.key, &blob.iv)
    }

    /// Whether `blob` was sealed under this vault's key.
    pub fn can_open(&self, blob: &SealedBlob) -> bool {
        blob.key_check == self.key.fingerprint()
    }
}

impl std::fmt::Debug for EncryptionVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionVault")
            .field("key", &self.key)
            .finish()
    }
}
