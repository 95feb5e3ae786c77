#![allow(dead_code)]

//! In-memory relay that checks credentials and signatures the way the real
//! one does, and records what it was asked to do.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;

use dm_client::{ClientConfig, DmError, DmSession, RelayApi, ServerConfig};
use dm_crypto::{derive_encryption_keypair, CipherEngine, Ed25519Identity, IdentitySigner};
use dm_proto::{
    api::{
        AuthCredential, Challenge, ConversationSummary, ConversationsResponse, GetKeyRequest,
        GetKeyResponse, HistoryRequest, HistoryResponse, LastMessageMeta, RegisterKeyRequest,
        RegisterKeyResponse, SendRequest, SendResponse,
    },
    b64, codec, EncryptedMessage, MessageContent, PublicIdentity, WireMessage,
};

#[derive(Default)]
struct Inner {
    keys: HashMap<PublicIdentity, Vec<u8>>,
    stored: Vec<WireMessage>,
    outstanding: HashSet<Vec<u8>>,
    challenges: usize,
    send_calls: usize,
    history_calls: usize,
    clock: i64,
}

#[derive(Default)]
pub struct FakeRelay {
    inner: Mutex<Inner>,
}

impl FakeRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn send_calls(&self) -> usize {
        self.inner.lock().send_calls
    }

    pub fn challenges(&self) -> usize {
        self.inner.lock().challenges
    }

    pub fn history_calls(&self) -> usize {
        self.inner.lock().history_calls
    }

    pub fn stored(&self) -> Vec<WireMessage> {
        self.inner.lock().stored.clone()
    }

    pub fn registered_key(&self, identity: &PublicIdentity) -> Option<Vec<u8>> {
        self.inner.lock().keys.get(identity).cloned()
    }

    /// Store a message as if some other client had sent it.
    pub fn inject(&self, message: WireMessage) {
        self.inner.lock().stored.push(message);
    }

    pub fn tamper(&self, message_id: &str, f: impl FnOnce(&mut WireMessage)) {
        let mut inner = self.inner.lock();
        let message = inner
            .stored
            .iter_mut()
            .find(|m| m.message_id == message_id)
            .expect("no such message");
        f(message);
    }

    fn authenticate(&self, header: &str) -> Result<PublicIdentity, DmError> {
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| DmError::Authentication("missing bearer prefix".into()))?;
        let json = b64::decode(token).map_err(|e| DmError::Authentication(e.to_string()))?;
        let credential: AuthCredential =
            serde_json::from_slice(&json).map_err(|e| DmError::Authentication(e.to_string()))?;
        let nonce = credential
            .challenge_response
            .nonce()
            .map_err(|e| DmError::Authentication(e.to_string()))?;
        if !self.inner.lock().outstanding.remove(&nonce) {
            return Err(DmError::Authentication("challenge reused or unknown".into()));
        }
        Ed25519Identity::verify(&credential.identity.key, &nonce, &credential.signature)
            .map_err(|_| DmError::Authentication("bad challenge signature".into()))?;
        Ok(credential.identity)
    }
}

fn between(m: &WireMessage, a: &PublicIdentity, b: &PublicIdentity) -> bool {
    (&m.sender == a && &m.recipient == b) || (&m.sender == b && &m.recipient == a)
}

#[async_trait]
impl RelayApi for FakeRelay {
    async fn health(&self) -> Result<bool, DmError> {
        Ok(true)
    }

    async fn challenge(&self) -> Result<Challenge, DmError> {
        let mut inner = self.inner.lock();
        inner.challenges += 1;
        let nonce = format!("nonce-{}", inner.challenges).into_bytes();
        inner.outstanding.insert(nonce.clone());
        let body = serde_json::to_vec(&json!({
            "challenge": b64::encode(&nonce),
            "created_on": 1_700_000_000_000u64,
        }))?;
        Ok(Challenge {
            body,
            hmac: vec![0xAB; 32],
        })
    }

    async fn register_key(
        &self,
        auth: &str,
        req: &RegisterKeyRequest,
    ) -> Result<RegisterKeyResponse, DmError> {
        let identity = self.authenticate(auth)?;
        if Ed25519Identity::verify(&identity.key, &req.x25519_public_key, &req.signature).is_err() {
            return Ok(RegisterKeyResponse {
                success: false,
                error: Some("bad key signature".into()),
            });
        }
        let mut inner = self.inner.lock();
        if inner.keys.get(&identity) == Some(&req.x25519_public_key) {
            return Ok(RegisterKeyResponse {
                success: false,
                error: Some("Key already registered".into()),
            });
        }
        inner.keys.insert(identity, req.x25519_public_key.clone());
        Ok(RegisterKeyResponse {
            success: true,
            error: None,
        })
    }

    async fn get_key(&self, req: &GetKeyRequest) -> Result<GetKeyResponse, DmError> {
        let key = self.inner.lock().keys.get(&req.identity).cloned();
        Ok(GetKeyResponse {
            found: key.is_some(),
            x25519_public_key: key,
        })
    }

    async fn send(&self, auth: &str, req: &SendRequest) -> Result<SendResponse, DmError> {
        let sender = self.authenticate(auth)?;
        let ephemeral: [u8; 32] = req.ephemeral_public_key.clone().try_into().expect("32-byte key");
        let nonce: [u8; 12] = req.nonce.clone().try_into().expect("12-byte nonce");
        let payload = codec::signing_payload(
            &req.message_id,
            &sender,
            &req.recipient,
            &ephemeral,
            &req.encrypted_content,
            &nonce,
        );
        let mut inner = self.inner.lock();
        inner.send_calls += 1;
        if Ed25519Identity::verify(&sender.key, &payload, &req.signature).is_err() {
            return Ok(SendResponse {
                success: false,
                message_id: None,
                timestamp: None,
                error: Some("bad message signature".into()),
            });
        }
        inner.clock += 1;
        let timestamp = at(1_700_000_000 + inner.clock);
        inner.stored.push(WireMessage {
            message_id: req.message_id.clone(),
            sender,
            recipient: req.recipient.clone(),
            ephemeral_public_key: req.ephemeral_public_key.clone(),
            encrypted_content: req.encrypted_content.clone(),
            nonce: req.nonce.clone(),
            encryption_algorithm: req.encryption_algorithm.clone(),
            timestamp,
            reply_to: req.reply_to.clone(),
        });
        Ok(SendResponse {
            success: true,
            message_id: Some(req.message_id.clone()),
            timestamp: Some(timestamp),
            error: None,
        })
    }

    async fn history(&self, auth: &str, req: &HistoryRequest) -> Result<HistoryResponse, DmError> {
        let caller = self.authenticate(auth)?;
        let mut inner = self.inner.lock();
        inner.history_calls += 1;
        let matching: Vec<WireMessage> = inner
            .stored
            .iter()
            .filter(|m| between(m, &caller, &req.other_party))
            .cloned()
            .collect();
        let start: usize = req.cursor.as_deref().map_or(0, |c| c.parse().expect("cursor"));
        let limit = req.limit.unwrap_or(50) as usize;
        let end = (start + limit).min(matching.len());
        let next_cursor = (end < matching.len()).then(|| end.to_string());
        Ok(HistoryResponse::from_wire(&matching[start..end], next_cursor)?)
    }

    async fn conversations(&self, auth: &str) -> Result<ConversationsResponse, DmError> {
        let caller = self.authenticate(auth)?;
        let inner = self.inner.lock();
        let mut latest: HashMap<PublicIdentity, &WireMessage> = HashMap::new();
        for m in inner.stored.iter().filter(|m| m.sender == caller || m.recipient == caller) {
            let other = if m.sender == caller { &m.recipient } else { &m.sender };
            latest.insert(other.clone(), m);
        }
        let conversations = latest
            .into_iter()
            .map(|(other_party, m)| ConversationSummary {
                other_party,
                last_message: Some(LastMessageMeta {
                    message_id: m.message_id.clone(),
                    sender: m.sender.clone(),
                    timestamp: m.timestamp,
                }),
                unread_count: 0,
            })
            .collect();
        Ok(ConversationsResponse { conversations })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
}

pub fn identity(seed: u8) -> Arc<Ed25519Identity> {
    Arc::new(Ed25519Identity::from_bytes(&[seed; 32]).unwrap())
}

pub fn public(identity: &Ed25519Identity) -> PublicIdentity {
    PublicIdentity::of(identity)
}

pub fn config() -> ClientConfig {
    ClientConfig::new(ServerConfig::from_base_url("http://127.0.0.1:1").unwrap())
}

pub fn session(relay: &Arc<FakeRelay>, identity: &Arc<Ed25519Identity>) -> DmSession {
    DmSession::new(config(), relay.clone(), identity.clone())
}

pub async fn ready_session(relay: &Arc<FakeRelay>, identity: &Arc<Ed25519Identity>) -> DmSession {
    let session = session(relay, identity);
    session.initialize().await.unwrap();
    session
}

/// Encrypt `content` from `from` to `to` the way a conforming client would.
pub fn seal(
    from: &Ed25519Identity,
    to: &Ed25519Identity,
    message_id: &str,
    timestamp: DateTime<Utc>,
    content: &MessageContent,
) -> WireMessage {
    let sender_keys = derive_encryption_keypair(&from.private_key_bytes()[..]).unwrap();
    let recipient_keys = derive_encryption_keypair(&to.private_key_bytes()[..]).unwrap();
    let plaintext = serde_json::to_vec(content).unwrap();
    let sealed = CipherEngine::default()
        .encrypt(&plaintext, recipient_keys.public_key(), &sender_keys)
        .unwrap();
    let message = EncryptedMessage {
        message_id: message_id.to_string(),
        sender: public(from),
        recipient: public(to),
        ephemeral_public_key: sealed.sender_public_key,
        encrypted_content: sealed.ciphertext,
        nonce: sealed.nonce,
        encryption_algorithm: sealed.algorithm,
        timestamp,
        reply_to: None,
    };
    WireMessage::from(&message)
}
