//! Identity keys
//!
//! The long-term identity keypair belongs to the account system, not to this
//! crate. DM code only needs three things from it, captured by
//! [`IdentitySigner`]: sign bytes, expose the public key, and expose the raw
//! private key bytes (the IKM for the encryption keypair derivation).
//!
//! [`Ed25519Identity`] is the concrete signer used by the CLI and tests.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// Key type tag carried in every public identity for Ed25519 keys.
pub const KEY_TYPE_ED25519: u64 = 1;

/// Interface the DM client consumes from the identity system.
pub trait IdentitySigner: Send + Sync {
    /// Numeric key type of [`IdentitySigner::public_key_bytes`].
    fn key_type(&self) -> u64;

    /// Raw public key of the current identity.
    fn public_key_bytes(&self) -> Vec<u8>;

    /// Raw 32-byte private key. Stable for the lifetime of the identity.
    fn private_key_bytes(&self) -> Zeroizing<[u8; 32]>;

    /// Sign `data`, returning the raw signature bytes.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

// ── Ed25519 identity ──────────────────────────────────────────────────────────

/// Long-term Ed25519 identity. Drop clears memory via ZeroizeOnDrop.
#[derive(ZeroizeOnDrop)]
pub struct Ed25519Identity {
    #[zeroize(skip)]
    public: [u8; 32],
    secret_bytes: [u8; 32],
}

impl Ed25519Identity {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            public: signing_key.verifying_key().to_bytes(),
            secret_bytes: signing_key.to_bytes(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("Identity key must be 32 bytes, got {}", bytes.len()))
        })?;
        let signing_key = SigningKey::from_bytes(&arr);
        Ok(Self {
            public: signing_key.verifying_key().to_bytes(),
            secret_bytes: arr,
        })
    }

    /// Parse a hex-encoded 32-byte seed (whitespace tolerated).
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(hex::decode(s.trim())?);
        Self::from_bytes(&bytes)
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.secret_bytes)
    }

    /// Verify a signature made by any Ed25519 public key.
    pub fn verify(public_bytes: &[u8], msg: &[u8], sig_bytes: &[u8]) -> Result<(), CryptoError> {
        let vk = VerifyingKey::from_bytes(
            public_bytes.try_into().map_err(|_| CryptoError::InvalidKey("Bad pubkey len".into()))?,
        )
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let sig = Signature::from_bytes(
            sig_bytes.try_into().map_err(|_| CryptoError::InvalidKey("Bad sig len".into()))?,
        );
        vk.verify(msg, &sig).map_err(|_| CryptoError::SignatureVerification)
    }
}

impl IdentitySigner for Ed25519Identity {
    fn key_type(&self) -> u64 {
        KEY_TYPE_ED25519
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.public.to_vec()
    }

    fn private_key_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret_bytes)
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.signing_key().sign(data).to_bytes().to_vec())
    }
}

/// Human-readable fingerprint: first 16 bytes of the key, hex-encoded in
/// groups of 4 for display.
///
/// Example: "a1b2 c3d4 e5f6 7890 abcd ef01 2345 6789"
pub fn fingerprint(key: &[u8]) -> String {
    let hex = hex::encode(&key[..key.len().min(16)]);
    hex.as_bytes()
        .chunks(4)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
