//! Relay request/response types. These map directly to JSON bodies on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{envelope::WireMessage, identity::PublicIdentity};

// ── Auth ─────────────────────────────────────────────────────────────────────

/// Server-issued challenge. Opaque to the client apart from the nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(with = "crate::b64")]
    pub body: Vec<u8>,
    #[serde(with = "crate::b64")]
    pub hmac: Vec<u8>,
}

/// Decoded form of [`Challenge::body`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeBody {
    #[serde(with = "crate::b64")]
    pub challenge: Vec<u8>,
    pub created_on: u64,
}

impl Challenge {
    /// The nonce the client must sign.
    pub fn nonce(&self) -> Result<Vec<u8>, serde_json::Error> {
        let body: ChallengeBody = serde_json::from_slice(&self.body)?;
        Ok(body.challenge)
    }
}

/// Signed response to a challenge. Good for exactly one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCredential {
    pub challenge_response: Challenge,
    pub identity: PublicIdentity,
    #[serde(with = "crate::b64")]
    pub signature: Vec<u8>,
}

impl AuthCredential {
    /// `Bearer <base64(json)>`
    pub fn to_bearer(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(format!("Bearer {}", crate::b64::encode(&json)))
    }
}

// ── Key directory ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterKeyRequest {
    #[serde(with = "crate::b64")]
    pub x25519_public_key: Vec<u8>,
    /// Identity signature over the raw public key bytes.
    #[serde(with = "crate::b64")]
    pub signature: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterKeyResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetKeyRequest {
    pub identity: PublicIdentity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetKeyResponse {
    pub found: bool,
    #[serde(default, with = "crate::b64::option")]
    pub x25519_public_key: Option<Vec<u8>>,
}

// ── Messages ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub message_id: String,
    pub recipient: PublicIdentity,
    #[serde(with = "crate::b64")]
    pub ephemeral_public_key: Vec<u8>,
    #[serde(with = "crate::b64")]
    pub encrypted_content: Vec<u8>,
    #[serde(with = "crate::b64")]
    pub nonce: Vec<u8>,
    pub encryption_algorithm: String,
    /// Identity signature over the codec signing payload.
    #[serde(with = "crate::b64")]
    pub signature: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub success: bool,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub other_party: PublicIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<serde_json::Value>,
    /// Absent on the last page.
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

impl HistoryResponse {
    /// Build a page from typed wire messages.
    pub fn from_wire(
        messages: &[WireMessage],
        next_cursor: Option<String>,
    ) -> Result<Self, serde_json::Error> {
        let has_more = next_cursor.is_some();
        Ok(Self {
            messages: messages
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<_, _>>()?,
            next_cursor,
            has_more,
        })
    }
}

// ── Conversations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessageMeta {
    pub message_id: String,
    pub sender: PublicIdentity,
    pub timestamp: DateTime<Utc>,
}

/// Server aggregate; metadata only, previews are never decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub other_party: PublicIdentity,
    #[serde(default)]
    pub last_message: Option<LastMessageMeta>,
    #[serde(default)]
    pub unread_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
}

// ── Common ───────────────────────────────────────────────────────────────────

/// Body the relay sends alongside non-2xx statuses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
