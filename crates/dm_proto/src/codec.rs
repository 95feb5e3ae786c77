//! Message codec - signing layout and parsing of relay payloads.
//!
//! # Signing payload
//! The sender signs this exact concatenation; the relay checks it without
//! decrypting anything. Field order and widths are a wire contract:
//!
//! ```text
//! message_id            utf8, variable
//! sender.key_type       u64 LE
//! sender.key            variable
//! recipient.key_type    u64 LE
//! recipient.key         variable
//! sender_enc_public_key 32 bytes
//! ciphertext            variable
//! nonce                 12 bytes
//! ```

use serde::{Deserialize, Serialize};

use dm_crypto::aead::NONCE_LEN;

use crate::{
    envelope::{EncryptedMessage, WireMessage},
    identity::PublicIdentity,
};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Field {field} must be {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Unknown encryption algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("Malformed frame: {0}")]
    MalformedFrame(&'static str),
}

/// Build the byte string the identity key signs for an outgoing message.
pub fn signing_payload(
    message_id: &str,
    sender: &PublicIdentity,
    recipient: &PublicIdentity,
    sender_encryption_public_key: &[u8; 32],
    ciphertext: &[u8],
    nonce: &[u8; NONCE_LEN],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        message_id.len() + 16 + sender.key.len() + recipient.key.len() + 32 + ciphertext.len() + NONCE_LEN,
    );
    out.extend_from_slice(message_id.as_bytes());
    out.extend_from_slice(&sender.key_type.to_le_bytes());
    out.extend_from_slice(&sender.key);
    out.extend_from_slice(&recipient.key_type.to_le_bytes());
    out.extend_from_slice(&recipient.key);
    out.extend_from_slice(sender_encryption_public_key);
    out.extend_from_slice(ciphertext);
    out.extend_from_slice(nonce);
    out
}

/// Parse one wire message (already-decoded JSON value).
pub fn parse_wire_message(value: serde_json::Value) -> Result<EncryptedMessage, CodecError> {
    let wire: WireMessage = serde_json::from_value(value)?;
    EncryptedMessage::try_from(wire)
}

// ── WebSocket frames ──────────────────────────────────────────────────────────

/// Frames the client sends over the real-time socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// First frame after the socket opens.
    Auth { token: String },
}

/// Frames pushed by the relay. Unknown types decode to `Other`.
#[derive(Debug)]
pub enum PushFrame {
    DmMessage(EncryptedMessage),
    Other(String),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

/// Decode a text frame from the relay socket.
pub fn parse_push_frame(text: &str) -> Result<PushFrame, CodecError> {
    let raw: RawFrame = serde_json::from_str(text)?;
    match (raw.kind.as_str(), raw.message) {
        ("dm_message", Some(message)) => Ok(PushFrame::DmMessage(parse_wire_message(message)?)),
        ("dm_message", None) => Err(CodecError::MalformedFrame("dm_message without message")),
        _ => Ok(PushFrame::Other(raw.kind)),
    }
}
