//! Authenticated Encryption with Associated Data
//!
//! Two suites, both with a 32-byte key, 12-byte nonce and 16-byte tag:
//!   - ChaCha20-Poly1305 (preferred)
//!   - AES-256-GCM (fallback)
//!
//! The nonce travels in its own message field, so ciphertexts here are
//! `ct || tag` with no prefix. No associated data is bound.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Algorithm declared by the sender. The receiver honours it verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    ChaCha20Poly1305,
    Aes256Gcm,
}

impl EncryptionAlgorithm {
    /// Preference order used when negotiating.
    pub const PREFERENCE: [EncryptionAlgorithm; 2] = [Self::ChaCha20Poly1305, Self::Aes256Gcm];

    /// HKDF `info` string for the message key of this suite.
    pub fn key_info(self) -> &'static [u8] {
        match self {
            Self::ChaCha20Poly1305 => b"dm-encryption-key",
            Self::Aes256Gcm => b"dm-encryption-key-aes",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChaCha20Poly1305 => "ChaCha20Poly1305",
            Self::Aes256Gcm => "Aes256Gcm",
        }
    }

    /// Pick the most preferred suite out of the locally available ones.
    pub fn negotiate(available: &[EncryptionAlgorithm]) -> Result<Self, CryptoError> {
        Self::PREFERENCE
            .into_iter()
            .find(|alg| available.contains(alg))
            .ok_or(CryptoError::NoCipherAvailable)
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ChaCha20Poly1305" => Ok(Self::ChaCha20Poly1305),
            "Aes256Gcm" => Ok(Self::Aes256Gcm),
            other => Err(CryptoError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Fresh random 12-byte nonce. One per message, never reused.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` under `key` and `nonce` with the given suite.
pub fn encrypt(
    algorithm: EncryptionAlgorithm,
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    match algorithm {
        EncryptionAlgorithm::ChaCha20Poly1305 => chacha::encrypt(key, nonce, plaintext),
        EncryptionAlgorithm::Aes256Gcm => aes::encrypt(key, nonce, plaintext),
    }
}

/// Decrypt `ct || tag`. Any tag mismatch is `CryptoError::AeadDecrypt`.
pub fn decrypt(
    algorithm: EncryptionAlgorithm,
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let plaintext = match algorithm {
        EncryptionAlgorithm::ChaCha20Poly1305 => chacha::decrypt(key, nonce, ciphertext)?,
        EncryptionAlgorithm::Aes256Gcm => aes::decrypt(key, nonce, ciphertext)?,
    };
    Ok(Zeroizing::new(plaintext))
}

mod chacha {
    use chacha20poly1305::{
        aead::{Aead, KeyInit},
        ChaCha20Poly1305, Nonce,
    };

    use crate::error::CryptoError;

    pub(super) fn encrypt(key: &[u8; 32], nonce: &[u8; 12], pt: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
        cipher
            .encrypt(Nonce::from_slice(nonce), pt)
            .map_err(|_| CryptoError::AeadEncrypt)
    }

    pub(super) fn decrypt(key: &[u8; 32], nonce: &[u8; 12], ct: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ct)
            .map_err(|_| CryptoError::AeadDecrypt)
    }
}

mod aes {
    use aes_gcm::{
        aead::{Aead, KeyInit},
        Aes256Gcm, Nonce,
    };

    use crate::error::CryptoError;

    pub(super) fn encrypt(key: &[u8; 32], nonce: &[u8; 12], pt: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
        cipher
            .encrypt(Nonce::from_slice(nonce), pt)
            .map_err(|_| CryptoError::AeadEncrypt)
    }

    pub(super) fn decrypt(key: &[u8; 32], nonce: &[u8; 12], ct: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ct)
            .map_err(|_| CryptoError::AeadDecrypt)
    }
}
