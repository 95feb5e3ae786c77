use dm_crypto::CryptoError;
use dm_proto::CodecError;

use crate::session::SessionState;

#[derive(Debug, thiserror::Error)]
pub enum DmError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("No encryption key registered for {0}")]
    KeyNotFound(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Relay rejected request: {0}")]
    Rejected(String),

    #[error("Message is {size} bytes, limit is {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Cannot {operation} while session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

impl DmError {
    /// Whether the same call may succeed if simply repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DmError::Network(_))
    }
}

impl From<CryptoError> for DmError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::AeadDecrypt | CryptoError::SignatureVerification => {
                DmError::Decryption(e.to_string())
            }
            CryptoError::Signing(_) => DmError::Authentication(e.to_string()),
            CryptoError::InvalidKey(_)
            | CryptoError::KeyAgreement(_)
            | CryptoError::KeyDerivation(_)
            | CryptoError::NoCipherAvailable
            | CryptoError::HexDecode(_)
            | CryptoError::Base64Decode(_) => DmError::Configuration(e.to_string()),
            other => DmError::Encoding(other.to_string()),
        }
    }
}

impl From<CodecError> for DmError {
    fn from(e: CodecError) -> Self {
        DmError::Encoding(e.to_string())
    }
}

impl From<serde_json::Error> for DmError {
    fn from(e: serde_json::Error) -> Self {
        DmError::Encoding(e.to_string())
    }
}

impl From<reqwest::Error> for DmError {
    fn from(e: reqwest::Error) -> Self {
        DmError::Network(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DmError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        DmError::Network(e.to_string())
    }
}
