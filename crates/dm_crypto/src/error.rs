use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Key agreement failed: {0}")]
    KeyAgreement(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (authentication tag mismatch, possible tampering)")]
    AeadDecrypt,

    #[error("No supported cipher available")]
    NoCipherAvailable,

    #[error("Unknown encryption algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Signature verification failed")]
    SignatureVerification,

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
