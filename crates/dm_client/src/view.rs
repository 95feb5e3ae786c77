//! The local, ordered message view.
//!
//! One list for every conversation. Inserts are deduplicated by message id
//! (first seen wins) and the list is kept sorted by timestamp; the sort is
//! stable, so equal timestamps keep arrival order.

use std::collections::HashSet;

use dm_proto::{DecryptedMessage, PublicIdentity};

#[derive(Debug, Default)]
pub struct MessageView {
    messages: Vec<DecryptedMessage>,
    seen: HashSet<String>,
}

impl MessageView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the id was already present.
    pub fn insert(&mut self, message: DecryptedMessage) -> bool {
        if !self.push(message) {
            return false;
        }
        self.sort();
        true
    }

    /// Insert a batch and re-sort once. Returns how many were new.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = DecryptedMessage>) -> usize {
        let mut added = 0;
        for message in batch {
            if self.push(message) {
                added += 1;
            }
        }
        if added > 0 {
            self.sort();
        }
        added
    }

    fn push(&mut self, message: DecryptedMessage) -> bool {
        if !self.seen.insert(message.message_id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    fn sort(&mut self) {
        self.messages.sort_by_key(|m| m.timestamp);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn all(&self) -> &[DecryptedMessage] {
        &self.messages
    }

    /// Messages exchanged between `local` and `other`, in view order.
    pub fn conversation(&self, local: &PublicIdentity, other: &PublicIdentity) -> Vec<DecryptedMessage> {
        self.messages
            .iter()
            .filter(|m| m.other_party(local) == other)
            .cloned()
            .collect()
    }
}
