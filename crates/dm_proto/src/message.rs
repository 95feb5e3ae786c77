//! Plaintext message types (inside the encrypted payload).

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::identity::PublicIdentity;

/// Decrypted content, serialised as tagged JSON before encryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    /// Reference to a file uploaded out of band.
    File {
        file_id: String,
        file_name: String,
        mime_type: String,
        size: u64,
    },
    /// Typing indicator. Never kept in the message view.
    Typing {
        is_typing: bool,
    },
    /// Read receipt. Never kept in the message view.
    ReadReceipt {
        message_id: String,
    },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Whether this content belongs in the conversation history.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Text { .. } | Self::File { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::File { .. } => "file",
            Self::Typing { .. } => "typing",
            Self::ReadReceipt { .. } => "read_receipt",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A message that decrypted successfully. Only these are retained locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedMessage {
    pub message_id: String,
    pub sender: PublicIdentity,
    pub recipient: PublicIdentity,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl DecryptedMessage {
    /// The party on the other side of this message from `local`'s view.
    pub fn other_party(&self, local: &PublicIdentity) -> &PublicIdentity {
        if &self.sender == local {
            &self.recipient
        } else {
            &self.sender
        }
    }
}

const MESSAGE_ID_SUFFIX_LEN: usize = 9;

/// `dm_<unix millis>_<random suffix>`. Unique per sender by assumption only.
pub fn new_message_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(MESSAGE_ID_SUFFIX_LEN)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("dm_{}_{}", now.timestamp_millis(), suffix)
}
