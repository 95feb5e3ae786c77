//! dm_crypto - Polycentric DM cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Derivation constants are part of the wire contract; never change them.
//!
//! # Module layout
//! - `identity` - identity signer interface + Ed25519 implementation
//! - `kdf`      - encryption keypair derivation, HKDF helpers
//! - `aead`     - ChaCha20-Poly1305 / AES-256-GCM with algorithm negotiation
//! - `cipher`   - X25519 key agreement + message encrypt/decrypt by role
//! - `error`    - unified error type

pub mod aead;
pub mod cipher;
pub mod error;
pub mod identity;
pub mod kdf;

pub use aead::EncryptionAlgorithm;
pub use cipher::{CipherEngine, Role, SealedPayload};
pub use error::CryptoError;
pub use identity::{Ed25519Identity, IdentitySigner, KEY_TYPE_ED25519};
pub use kdf::{derive_counterpart_public_key, derive_encryption_keypair, EncryptionKeyPair};
