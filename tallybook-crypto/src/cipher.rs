//! AES-128-CBC primitives over JSON values.

use crate::error::{CryptoError, CryptoResult, DecryptionError};
use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Key size in bytes (AES-128).
pub const KEY_SIZE: usize = 16;
/// IV size in bytes (one AES block).
pub const IV_SIZE: usize = 16;
/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

const KEY_CHECK_SIZE: usize = 8;

/// A 128-bit symmetric key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey([u8; KEY_SIZE]);

impl CipherKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Short public fingerprint used to detect a wrong key before decrypting.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..KEY_CHECK_SIZE])
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CipherKey").field(&self.fingerprint()).finish()
    }
}

/// Persisted form of an encrypted value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedBlob {
    /// Hex-encoded ciphertext.
    pub ciphertext: String,
    /// Hex-encoded initialization vector.
    pub iv: String,
    /// Fingerprint of the key the blob was sealed with.
    pub key_check: String,
}

/// Encrypts `value` under a freshly generated key and IV.
///
/// The caller must keep the returned key; nothing else can open the blob.
pub fn encrypt_value<T: Serialize>(value: &T) -> CryptoResult<(SealedBlob, CipherKey)> {
    let key = CipherKey::random();
    let blob = encrypt_with_key(&key, value)?;
    Ok((blob, key))
}

/// Encrypts `value` under `key` with a fresh random IV.
pub fn encrypt_with_key<T: Serialize>(key: &CipherKey, value: &T) -> CryptoResult<SealedBlob> {
    let mut plaintext = serde_json::to_vec(value)?;

    let mut iv = [0u8; IV_SIZE];
    rand::rng().fill_bytes(&mut iv);

    let cipher = Aes128CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(&plaintext);
    plaintext.zeroize();

    Ok(SealedBlob {
        ciphertext: hex::encode(ciphertext),
        iv: hex::encode(iv),
        key_check: key.fingerprint(),
    })
}

/// Decrypts a hex ciphertext with an explicit key and hex IV.
///
/// Fails with [`DecryptionError`] on bad encoding, bad padding, or a payload
/// that does not decode as `T`, so a wrong key never yields a value.
pub fn decrypt_value<T: DeserializeOwned>(
    ciphertext_hex: &str,
    key: &CipherKey,
    iv_hex: &str,
) -> Result<T, DecryptionError> {
    let ciphertext = hex::decode(ciphertext_hex).map_err(|e| DecryptionError::Malformed {
        field: "ciphertext",
        reason: e.to_string(),
    })?;
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(DecryptionError::Malformed {
            field: "ciphertext",
            reason: format!("length {} is not a positive multiple of {BLOCK_SIZE}", ciphertext.len()),
        });
    }

    let iv = hex::decode(iv_hex).map_err(|e| DecryptionError::Malformed {
        field: "iv",
        reason: e.to_string(),
    })?;
    let cipher = Aes128CbcDec::new_from_slices(key.as_bytes(), &iv).map_err(|_| {
        DecryptionError::Malformed {
            field: "iv",
            reason: format!("expected {IV_SIZE} bytes, got {}", iv.len()),
        }
    })?;

    let mut plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| DecryptionError::BadPadding)?;
    let value = serde_json::from_slice(&plaintext)
        .map_err(|e| DecryptionError::Payload(e.to_string()));
    plaintext.zeroize();
    value
}
