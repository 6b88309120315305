//! Append-only message log.

use std::sync::Mutex;

use tonechat_core::types::{Message, MessageId};

use crate::lock;

/// Ordered log of chat messages.
///
/// Messages are never edited or removed; order is append order, which is
/// send order for user messages and arrival order for replies.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Mutex<Vec<Message>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its id.
    pub fn append(&self, message: Message) -> MessageId {
        let id = message.id;
        tracing::debug!(
            message_id = %id,
            sender = message.sender.display_name(),
            "Message appended"
        );
        lock(&self.messages, "messages").push(message);
        id
    }

    /// Copy of the whole log.
    pub fn snapshot(&self) -> Vec<Message> {
        lock(&self.messages, "messages").clone()
    }
}

// =============================================================================
// Tests
// =============================================================================
