use dm_proto::{DecryptedMessage, PublicIdentity};

/// Published on the session's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new message entered the view from the real-time connection.
    MessageReceived(DecryptedMessage),
    Typing {
        from: PublicIdentity,
        is_typing: bool,
    },
    ReadReceipt {
        from: PublicIdentity,
        message_id: String,
    },
    ConnectionChanged {
        connected: bool,
    },
}
