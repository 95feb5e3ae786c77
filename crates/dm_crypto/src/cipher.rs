//! Message encryption: X25519 key agreement + HKDF + AEAD.
//!
//! ```text
//! shared  = X25519(local_secret, remote_public)      (all-zero → fatal)
//! key     = HKDF-SHA256(shared, salt = ∅, info = algorithm.key_info())
//! ct||tag = AEAD(key, nonce = random 12 bytes, aad = ∅)
//! ```
//!
//! The sender publishes its *persistent* encryption public key as the
//! message's "ephemeral" key. Every message from one identity therefore
//! shares the same key agreement; only the nonce differs. The relay's stored
//! data depends on this, so it is kept as is.

use x25519_dalek::PublicKey as X25519Public;
use zeroize::Zeroizing;

use crate::{
    aead::{self, EncryptionAlgorithm, NONCE_LEN},
    error::CryptoError,
    kdf::{self, EncryptionKeyPair},
};

/// Output of [`CipherEngine::encrypt`].
#[derive(Debug, Clone)]
pub struct SealedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub algorithm: EncryptionAlgorithm,
    /// Value for the message's `ephemeral_public_key` field.
    pub sender_public_key: [u8; 32],
}

/// Which side of a stored message the local party is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// We sent it; the remote key is recomputed from the recipient identity.
    Sender,
    /// We received it; the remote key is the message's ephemeral key.
    Recipient,
}

/// Stateless apart from the set of suites this platform offers.
#[derive(Debug, Clone)]
pub struct CipherEngine {
    available: Vec<EncryptionAlgorithm>,
}

impl Default for CipherEngine {
    fn default() -> Self {
        Self::new(EncryptionAlgorithm::PREFERENCE.to_vec())
    }
}

impl CipherEngine {
    pub fn new(available: Vec<EncryptionAlgorithm>) -> Self {
        Self { available }
    }

    /// Suite used for outgoing messages.
    pub fn outgoing_algorithm(&self) -> Result<EncryptionAlgorithm, CryptoError> {
        EncryptionAlgorithm::negotiate(&self.available)
    }

    pub fn encrypt(
        &self,
        plaintext: &[u8],
        recipient_public_key: &[u8],
        local: &EncryptionKeyPair,
    ) -> Result<SealedPayload, CryptoError> {
        let algorithm = self.outgoing_algorithm()?;
        let remote = to_public(recipient_public_key)?;
        let key = message_key(local, &remote, algorithm)?;
        let nonce = aead::generate_nonce();
        let ciphertext = aead::encrypt(algorithm, &key, &nonce, plaintext)?;
        Ok(SealedPayload {
            ciphertext,
            nonce,
            algorithm,
            sender_public_key: *local.public_key(),
        })
    }

    /// Decrypt a stored message from the point of view of `role`.
    ///
    /// `ephemeral_public_key` is the message's sender key field and
    /// `recipient_identity_key` the raw key of the message's recipient
    /// identity. Only one of them is used, depending on `role`.
    pub fn decrypt(
        &self,
        role: Role,
        local: &EncryptionKeyPair,
        ephemeral_public_key: &[u8],
        recipient_identity_key: &[u8],
        algorithm: EncryptionAlgorithm,
        nonce: &[u8],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let remote = match role {
            Role::Sender => X25519Public::from(kdf::derive_counterpart_public_key(
                recipient_identity_key,
            )?),
            Role::Recipient => to_public(ephemeral_public_key)?,
        };
        let nonce: &[u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| CryptoError::AeadDecrypt)?;
        let key = message_key(local, &remote, algorithm)?;
        aead::decrypt(algorithm, &key, nonce, ciphertext)
    }
}

fn to_public(bytes: &[u8]) -> Result<X25519Public, CryptoError> {
    let arr: [u8; 32] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!("X25519 public key must be 32 bytes, got {}", bytes.len()))
    })?;
    Ok(X25519Public::from(arr))
}

/// ECDH + HKDF for one suite.
fn message_key(
    local: &EncryptionKeyPair,
    remote: &X25519Public,
    algorithm: EncryptionAlgorithm,
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let shared = local.static_secret().diffie_hellman(remote);
    if shared.as_bytes().iter().all(|b| *b == 0) {
        return Err(CryptoError::KeyAgreement(
            "X25519 produced an all-zero shared secret".into(),
        ));
    }
    let mut key = Zeroizing::new([0u8; 32]);
    kdf::hkdf_expand(shared.as_bytes(), None, algorithm.key_info(), &mut key[..])?;
    Ok(key)
}
