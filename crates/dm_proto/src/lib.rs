//! dm_proto - Wire types, signing layout and codec for Polycentric DMs
//!
//! All on-wire types are JSON with base64 byte fields.
//!
//! # Modules
//! - `identity` - Public identities (key type + key bytes)
//! - `envelope` - Encrypted message (what the relay sees)
//! - `message`  - Plaintext content (inside the ciphertext)
//! - `codec`    - Signing payload, wire parsing, WebSocket frames
//! - `api`      - Relay request/response types

pub mod api;
pub mod b64;
pub mod codec;
pub mod envelope;
pub mod identity;
pub mod message;

pub use codec::{signing_payload, CodecError, PushFrame};
pub use envelope::{EncryptedMessage, WireMessage};
pub use identity::PublicIdentity;
pub use message::{new_message_id, DecryptedMessage, MessageContent};
