//! Key derivation
//!
//! `derive_encryption_keypair`: HKDF-SHA256 over the identity private key,
//!   producing the X25519 keypair used for every DM this identity sends or
//!   receives. Deterministic: re-deriving after a restart yields the same
//!   pair, so stored history stays readable.
//!
//! `derive_counterpart_public_key`: the same HKDF keyed off an identity
//!   *public* key. Used only when re-reading our own sent messages. This is
//!   the relay's stored-data convention and must stay bit-for-bit as is.
//!
//! `hkdf_expand`: HKDF-SHA256, used for message key material.

use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

pub const ENCRYPTION_KEY_SALT: &[u8] = b"polycentric-ed25519-to-x25519";
pub const ENCRYPTION_KEY_INFO: &[u8] = b"dm-encryption-key";

// ── Encryption keypair ────────────────────────────────────────────────────────

/// X25519 keypair derived from the identity key. Drop clears the secret.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKeyPair {
    secret_bytes: [u8; 32],
    #[zeroize(skip)]
    public: [u8; 32],
}

impl EncryptionKeyPair {
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    pub(crate) fn static_secret(&self) -> StaticSecret {
        StaticSecret::from(self.secret_bytes)
    }

    /// Grouped hex fingerprint of the public half, safe to log.
    pub fn fingerprint(&self) -> String {
        crate::identity::fingerprint(&self.public)
    }
}

impl std::fmt::Debug for EncryptionKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKeyPair")
            .field("public", &hex::encode(self.public))
            .finish_non_exhaustive()
    }
}

fn to_32(bytes: &[u8], what: &str) -> Result<[u8; 32], CryptoError> {
    bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!("{what} must be 32 bytes, got {}", bytes.len()))
    })
}

fn derive_scalar(ikm: &[u8]) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let mut scalar = Zeroizing::new([0u8; 32]);
    hkdf_expand(ikm, Some(ENCRYPTION_KEY_SALT), ENCRYPTION_KEY_INFO, &mut scalar[..])?;
    Ok(scalar)
}

/// Derive the encryption keypair from a 32-byte identity private key.
pub fn derive_encryption_keypair(
    identity_private_key: &[u8],
) -> Result<EncryptionKeyPair, CryptoError> {
    let ikm = Zeroizing::new(to_32(identity_private_key, "Identity private key")?);
    let scalar = derive_scalar(&ikm[..])?;
    let secret = StaticSecret::from(*scalar);
    let public = X25519Public::from(&secret).to_bytes();
    Ok(EncryptionKeyPair {
        secret_bytes: *scalar,
        public,
    })
}

/// Recompute the encryption public key the relay associates with a remote
/// identity public key. Same HKDF parameters as
/// [`derive_encryption_keypair`], keyed off the public key bytes.
pub fn derive_counterpart_public_key(
    identity_public_key: &[u8],
) -> Result<[u8; 32], CryptoError> {
    let ikm = to_32(identity_public_key, "Identity public key")?;
    let scalar = derive_scalar(&ikm)?;
    let secret = StaticSecret::from(*scalar);
    Ok(X25519Public::from(&secret).to_bytes())
}

// ── HKDF-SHA256 ───────────────────────────────────────────────────────────────

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
///
/// `salt` may be `None` (HKDF will use a zeroed salt, identical to an empty one).
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}
