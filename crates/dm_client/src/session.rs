//! DM session - the orchestrator.
//!
//! ```text
//! Uninitialized ──initialize──▶ KeysPending ──register ok──▶ Ready ──connect──▶ Connected
//!        │                          │                          ▲                    │
//!        └──────────────────────────┴──── setup failure ──▶ Error    disconnect / hangup
//! ```
//!
//! The encryption keypair lives here and nowhere else. It is derived from the
//! identity key on [`DmSession::initialize`] and dropped with the session.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use dm_crypto::{derive_encryption_keypair, CipherEngine, EncryptionKeyPair, IdentitySigner};
use dm_proto::{
    api::{ConversationSummary, HistoryRequest, SendRequest},
    codec, new_message_id, DecryptedMessage, EncryptedMessage, MessageContent, PublicIdentity,
    PushFrame,
};

use crate::{
    auth::AuthClient,
    config::ClientConfig,
    directory::KeyDirectory,
    error::DmError,
    events::SessionEvent,
    realtime::{FrameHandler, RealtimeConnection},
    relay::{HttpRelay, RelayApi},
    view::MessageView,
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    KeysPending,
    Ready,
    Connected,
    Error,
}

/// One page of decrypted history.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    /// Messages from this page that decrypted, in server order.
    pub messages: Vec<DecryptedMessage>,
    /// Entries that failed to parse or decrypt and were skipped.
    pub skipped: usize,
    pub next_cursor: Option<String>,
}

/// State shared with the real-time read task.
struct Shared {
    local: PublicIdentity,
    engine: CipherEngine,
    keys: RwLock<Option<EncryptionKeyPair>>,
    view: Mutex<MessageView>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::debug!(target: "dm_client", event = "state_change", from = ?*state, to = ?next);
            *state = next;
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Decrypt and decode one message. Failures are logged and yield `None`.
    fn open(&self, message: &EncryptedMessage) -> Option<DecryptedMessage> {
        let plaintext = {
            let keys = self.keys.read();
            let keys = keys.as_ref()?;
            message.decrypt(&self.engine, keys, &self.local)
        };
        let plaintext = match plaintext {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(
                    target: "dm_client",
                    event = "decrypt_failed",
                    message_id = %message.message_id,
                    sender = %message.sender.fingerprint(),
                    algorithm = %message.encryption_algorithm,
                    error = %err
                );
                return None;
            }
        };
        let content: MessageContent = match serde_json::from_slice(&plaintext) {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(
                    target: "dm_client",
                    event = "content_invalid",
                    message_id = %message.message_id,
                    error = %err
                );
                return None;
            }
        };
        Some(DecryptedMessage {
            message_id: message.message_id.clone(),
            sender: message.sender.clone(),
            recipient: message.recipient.clone(),
            content,
            timestamp: message.timestamp,
            reply_to: message.reply_to.clone(),
        })
    }

    /// Route a real-time message: content goes into the view, signals become
    /// events.
    fn deliver(&self, message: DecryptedMessage) {
        match &message.content {
            MessageContent::Typing { is_typing } => {
                if message.sender != self.local {
                    self.publish(SessionEvent::Typing {
                        from: message.sender.clone(),
                        is_typing: *is_typing,
                    });
                }
            }
            MessageContent::ReadReceipt { message_id } => {
                if message.sender != self.local {
                    self.publish(SessionEvent::ReadReceipt {
                        from: message.sender.clone(),
                        message_id: message_id.clone(),
                    });
                }
            }
            MessageContent::Text { .. } | MessageContent::File { .. } => {
                let inserted = self.view.lock().insert(message.clone());
                if inserted {
                    tracing::info!(
                        target: "dm_client",
                        event = "message_received",
                        message_id = %message.message_id,
                        kind = message.content.kind()
                    );
                    self.publish(SessionEvent::MessageReceived(message));
                }
            }
        }
    }
}

/// Bridges the WebSocket read task into the session. One per connection.
struct IncomingPipeline {
    shared: Arc<Shared>,
    /// Set under the state lock, so `connect` sees a hangup that beat it.
    closed: AtomicBool,
}

impl FrameHandler for IncomingPipeline {
    fn on_frame(&self, frame: PushFrame) {
        if let PushFrame::DmMessage(message) = frame {
            if let Some(decrypted) = self.shared.open(&message) {
                self.shared.deliver(decrypted);
            }
        }
    }

    fn on_closed(&self) {
        let mut state = self.shared.state.lock();
        self.closed.store(true, Ordering::SeqCst);
        if *state == SessionState::Connected {
            *state = SessionState::Ready;
            self.shared.publish(SessionEvent::ConnectionChanged { connected: false });
        }
    }
}

pub struct DmSession {
    config: ClientConfig,
    relay: Arc<dyn RelayApi>,
    auth: AuthClient,
    directory: KeyDirectory,
    shared: Arc<Shared>,
    connection: Mutex<Option<RealtimeConnection>>,
}

impl DmSession {
    pub fn new(
        config: ClientConfig,
        relay: Arc<dyn RelayApi>,
        signer: Arc<dyn IdentitySigner>,
    ) -> Self {
        let auth = AuthClient::new(relay.clone(), signer.clone());
        let directory = KeyDirectory::new(relay.clone(), auth.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            local: PublicIdentity::of(signer.as_ref()),
            engine: CipherEngine::new(config.ciphers.clone()),
            keys: RwLock::new(None),
            view: Mutex::new(MessageView::new()),
            state: Mutex::new(SessionState::Uninitialized),
            events,
        });
        Self {
            config,
            relay,
            auth,
            directory,
            shared,
            connection: Mutex::new(None),
        }
    }

    /// Session talking to the relay over HTTP.
    pub fn over_http(config: ClientConfig, signer: Arc<dyn IdentitySigner>) -> Result<Self, DmError> {
        let relay = Arc::new(HttpRelay::new(&config.server)?);
        Ok(Self::new(config, relay, signer))
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn local_identity(&self) -> &PublicIdentity {
        &self.shared.local
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Our encryption public key, once derived.
    pub fn encryption_public_key(&self) -> Option<[u8; 32]> {
        self.shared.keys.read().as_ref().map(|k| *k.public_key())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Snapshot of every message in the view.
    pub fn messages(&self) -> Vec<DecryptedMessage> {
        self.shared.view.lock().all().to_vec()
    }

    /// Snapshot of one conversation.
    pub fn conversation(&self, other: &PublicIdentity) -> Vec<DecryptedMessage> {
        self.shared.view.lock().conversation(&self.shared.local, other)
    }

    fn require_ready(&self, operation: &'static str) -> Result<(), DmError> {
        match self.state() {
            SessionState::Ready | SessionState::Connected => Ok(()),
            state => Err(DmError::InvalidState { operation, state }),
        }
    }

    // ── Setup ────────────────────────────────────────────────────────────────

    /// Derive the encryption keypair and register it with the relay.
    /// Allowed from `Uninitialized`, and from `Error` to retry.
    pub async fn initialize(&self) -> Result<(), DmError> {
        match self.state() {
            SessionState::Uninitialized | SessionState::Error => {}
            state => {
                return Err(DmError::InvalidState {
                    operation: "initialize",
                    state,
                })
            }
        }
        self.shared.set_state(SessionState::KeysPending);

        let keys = match derive_encryption_keypair(&self.auth.signer().private_key_bytes()[..]) {
            Ok(k) => k,
            Err(err) => {
                self.shared.set_state(SessionState::Error);
                tracing::error!(target: "dm_client", event = "key_derivation_failed", error = %err);
                return Err(err.into());
            }
        };

        if let Err(err) = self.directory.register_keys(&keys).await {
            self.shared.set_state(SessionState::Error);
            tracing::error!(
                target: "dm_client",
                event = "initialize_failed",
                retryable = err.is_retryable(),
                error = %err
            );
            return Err(err);
        }

        tracing::info!(
            target: "dm_client",
            event = "session_ready",
            identity = %self.shared.local.fingerprint(),
            encryption_key = %keys.fingerprint()
        );
        *self.shared.keys.write() = Some(keys);
        self.shared.set_state(SessionState::Ready);
        Ok(())
    }

    /// Open the real-time connection. A no-op when already connected.
    pub async fn connect(&self) -> Result<(), DmError> {
        match self.state() {
            SessionState::Connected => return Ok(()),
            SessionState::Ready => {}
            state => {
                return Err(DmError::InvalidState {
                    operation: "connect",
                    state,
                })
            }
        }

        // A socket the relay already hung up on; its read task has finished.
        let previous = self.connection.lock().take();
        if let Some(previous) = previous {
            previous.close().await;
        }

        let header = self.auth.build_auth_header().await?;
        let pipeline = Arc::new(IncomingPipeline {
            shared: self.shared.clone(),
            closed: AtomicBool::new(false),
        });
        let connection = RealtimeConnection::connect(
            &self.config.server.websocket_url,
            header,
            pipeline.clone(),
        )
        .await?;

        let mut state = self.shared.state.lock();
        if pipeline.closed.load(Ordering::SeqCst) {
            drop(state);
            tracing::warn!(target: "dm_client", event = "ws_closed_during_connect");
            return Err(DmError::Network(
                "relay closed the connection during connect".into(),
            ));
        }
        *self.connection.lock() = Some(connection);
        tracing::debug!(target: "dm_client", event = "state_change", from = ?*state, to = ?SessionState::Connected);
        *state = SessionState::Connected;
        self.shared.publish(SessionEvent::ConnectionChanged { connected: true });
        Ok(())
    }

    pub async fn disconnect(&self) {
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            connection.close().await;
        }
        // The read task already moved us to Ready if the relay hung up first.
        if self.state() == SessionState::Connected {
            self.shared.set_state(SessionState::Ready);
            self.shared.publish(SessionEvent::ConnectionChanged { connected: false });
        }
    }

    // ── Sending ──────────────────────────────────────────────────────────────

    /// Encrypt, sign and post one message. Persistent content is inserted
    /// into the view once the relay accepts it.
    pub async fn send(
        &self,
        recipient: &PublicIdentity,
        content: MessageContent,
        reply_to: Option<String>,
    ) -> Result<DecryptedMessage, DmError> {
        self.require_ready("send")?;

        let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(&content)?);
        let max = self.config.server.max_message_size;
        if plaintext.len() > max {
            return Err(DmError::MessageTooLarge {
                size: plaintext.len(),
                max,
            });
        }

        let now = Utc::now();
        let message_id = new_message_id(now);
        tracing::info!(
            target: "dm_client",
            event = "send_message_start",
            kind = content.kind(),
            message_id = %message_id,
            recipient = %recipient.fingerprint(),
            plaintext_bytes = plaintext.len()
        );

        let Some(recipient_key) = self.directory.lookup_key(recipient).await? else {
            tracing::warn!(
                target: "dm_client",
                event = "send_message_no_key",
                message_id = %message_id,
                recipient = %recipient.fingerprint()
            );
            return Err(DmError::KeyNotFound(recipient.to_string()));
        };

        let sealed = {
            let keys = self.shared.keys.read();
            let keys = keys.as_ref().ok_or(DmError::InvalidState {
                operation: "send",
                state: SessionState::KeysPending,
            })?;
            self.shared.engine.encrypt(&plaintext, &recipient_key, keys)?
        };

        let payload = codec::signing_payload(
            &message_id,
            &self.shared.local,
            recipient,
            &sealed.sender_public_key,
            &sealed.ciphertext,
            &sealed.nonce,
        );
        let signature = self.auth.signer().sign(&payload)?;

        let request = SendRequest {
            message_id: message_id.clone(),
            recipient: recipient.clone(),
            ephemeral_public_key: sealed.sender_public_key.to_vec(),
            encrypted_content: sealed.ciphertext,
            nonce: sealed.nonce.to_vec(),
            encryption_algorithm: sealed.algorithm.as_str().to_string(),
            signature,
            reply_to: reply_to.clone(),
        };
        let header = self.auth.build_auth_header().await?;
        let response = self.relay.send(&header, &request).await?;
        if !response.success {
            let reason = response.error.unwrap_or_else(|| "no reason given".into());
            tracing::error!(
                target: "dm_client",
                event = "send_message_rejected",
                message_id = %message_id,
                reason = %reason
            );
            return Err(DmError::Rejected(reason));
        }

        let message = DecryptedMessage {
            message_id: response.message_id.unwrap_or(message_id),
            sender: self.shared.local.clone(),
            recipient: recipient.clone(),
            content,
            timestamp: response.timestamp.unwrap_or(now),
            reply_to,
        };
        if message.content.is_persistent() {
            self.shared.view.lock().insert(message.clone());
        }
        tracing::info!(
            target: "dm_client",
            event = "send_message_ok",
            message_id = %message.message_id,
            algorithm = %sealed.algorithm
        );
        Ok(message)
    }

    pub async fn send_text(
        &self,
        recipient: &PublicIdentity,
        text: impl Into<String>,
    ) -> Result<DecryptedMessage, DmError> {
        self.send(recipient, MessageContent::text(text), None).await
    }

    pub async fn send_typing(&self, recipient: &PublicIdentity, is_typing: bool) -> Result<(), DmError> {
        self.send(recipient, MessageContent::Typing { is_typing }, None)
            .await
            .map(|_| ())
    }

    pub async fn send_read_receipt(
        &self,
        recipient: &PublicIdentity,
        message_id: &str,
    ) -> Result<(), DmError> {
        let content = MessageContent::ReadReceipt {
            message_id: message_id.to_string(),
        };
        self.send(recipient, content, None).await.map(|_| ())
    }

    // ── History ──────────────────────────────────────────────────────────────

    /// Fetch and merge one page. Entries that fail to parse or decrypt are
    /// skipped; the rest of the page still lands in the view.
    pub async fn load_history(
        &self,
        other: &PublicIdentity,
        cursor: Option<String>,
    ) -> Result<HistoryPage, DmError> {
        self.require_ready("load history")?;

        let request = HistoryRequest {
            other_party: other.clone(),
            cursor,
            limit: Some(self.config.history_page_size),
        };
        let header = self.auth.build_auth_header().await?;
        let response = self.relay.history(&header, &request).await?;

        let mut page = HistoryPage {
            next_cursor: response.next_cursor,
            ..HistoryPage::default()
        };
        for entry in response.messages {
            let encrypted = match codec::parse_wire_message(entry) {
                Ok(m) => m,
                Err(err) => {
                    tracing::warn!(target: "dm_client", event = "history_entry_invalid", error = %err);
                    page.skipped += 1;
                    continue;
                }
            };
            match self.shared.open(&encrypted) {
                Some(m) if m.content.is_persistent() => page.messages.push(m),
                Some(_) => {}
                None => page.skipped += 1,
            }
        }

        let added = self.shared.view.lock().merge(page.messages.iter().cloned());
        tracing::info!(
            target: "dm_client",
            event = "history_page",
            other = %other.fingerprint(),
            decrypted = page.messages.len(),
            skipped = page.skipped,
            added,
            has_more = page.next_cursor.is_some()
        );
        Ok(page)
    }

    /// Page through the whole conversation, then return it from the view.
    pub async fn load_all_history(&self, other: &PublicIdentity) -> Result<Vec<DecryptedMessage>, DmError> {
        let mut cursor = None;
        loop {
            let page = self.load_history(other, cursor.clone()).await?;
            match page.next_cursor {
                Some(next) if Some(&next) == cursor.as_ref() => {
                    tracing::warn!(target: "dm_client", event = "history_cursor_stuck", cursor = %next);
                    break;
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(self.conversation(other))
    }

    // ── Misc ─────────────────────────────────────────────────────────────────

    /// Server-side conversation aggregate. Previews stay encrypted.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, DmError> {
        self.require_ready("list conversations")?;
        let header = self.auth.build_auth_header().await?;
        Ok(self.relay.conversations(&header).await?.conversations)
    }

    pub async fn health(&self) -> Result<bool, DmError> {
        self.relay.health().await
    }
}
