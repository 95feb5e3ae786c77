//! Encrypted message envelope - what the relay sees and stores.
//!
//! The relay sees sender, recipient, timestamps and opaque ciphertext. It
//! never sees the content type or the plaintext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use dm_crypto::{
    aead::NONCE_LEN, CipherEngine, CryptoError, EncryptionAlgorithm, EncryptionKeyPair, Role,
};

use crate::{codec::CodecError, identity::PublicIdentity};

/// Typed, validated encrypted message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub message_id: String,
    pub sender: PublicIdentity,
    pub recipient: PublicIdentity,
    /// The sender's persistent encryption public key (not single-use).
    pub ephemeral_public_key: [u8; 32],
    pub encrypted_content: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub encryption_algorithm: EncryptionAlgorithm,
    pub timestamp: DateTime<Utc>,
    pub reply_to: Option<String>,
}

impl EncryptedMessage {
    /// Our role relative to this message.
    pub fn role_of(&self, local: &PublicIdentity) -> Role {
        if &self.sender == local {
            Role::Sender
        } else {
            Role::Recipient
        }
    }

    /// Decrypt with the algorithm the sender declared.
    pub fn decrypt(
        &self,
        engine: &CipherEngine,
        keys: &EncryptionKeyPair,
        local: &PublicIdentity,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        engine.decrypt(
            self.role_of(local),
            keys,
            &self.ephemeral_public_key,
            &self.recipient.key,
            self.encryption_algorithm,
            &self.nonce,
            &self.encrypted_content,
        )
    }
}

/// JSON form of [`EncryptedMessage`] as served by `/history` and pushed over
/// the WebSocket. Byte fields are base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub message_id: String,
    pub sender: PublicIdentity,
    pub recipient: PublicIdentity,
    #[serde(with = "crate::b64")]
    pub ephemeral_public_key: Vec<u8>,
    #[serde(with = "crate::b64")]
    pub encrypted_content: Vec<u8>,
    #[serde(with = "crate::b64")]
    pub nonce: Vec<u8>,
    pub encryption_algorithm: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

fn fixed<const N: usize>(field: &'static str, bytes: Vec<u8>) -> Result<[u8; N], CodecError> {
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CodecError::InvalidLength { field, expected: N, actual })
}

impl TryFrom<WireMessage> for EncryptedMessage {
    type Error = CodecError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let encryption_algorithm = wire
            .encryption_algorithm
            .parse::<EncryptionAlgorithm>()
            .map_err(|_| CodecError::UnknownAlgorithm(wire.encryption_algorithm.clone()))?;
        Ok(Self {
            ephemeral_public_key: fixed("ephemeral_public_key", wire.ephemeral_public_key)?,
            nonce: fixed("nonce", wire.nonce)?,
            message_id: wire.message_id,
            sender: wire.sender,
            recipient: wire.recipient,
            encrypted_content: wire.encrypted_content,
            encryption_algorithm,
            timestamp: wire.timestamp,
            reply_to: wire.reply_to,
        })
    }
}

impl From<&EncryptedMessage> for WireMessage {
    fn from(msg: &EncryptedMessage) -> Self {
        Self {
            message_id: msg.message_id.clone(),
            sender: msg.sender.clone(),
            recipient: msg.recipient.clone(),
            ephemeral_public_key: msg.ephemeral_public_key.to_vec(),
            encrypted_content: msg.encrypted_content.clone(),
            nonce: msg.nonce.to_vec(),
            encryption_algorithm: msg.encryption_algorithm.as_str().to_string(),
            timestamp: msg.timestamp,
            reply_to: msg.reply_to.clone(),
        }
    }
}
