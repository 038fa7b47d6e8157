use crate::domain::{ChatId, MessageId, MessageRef, UserId};

/// Author of an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub id: UserId,
    /// Display name ("First Last"); may be empty.
    pub full_name: String,
    /// Public handle without the leading `@`.
    pub username: Option<String>,
}

/// Cross-messenger inbound message model.
///
/// Telegram-specific conversion lives in the Telegram adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub is_private: bool,
    /// `None` for anonymous channel posts.
    pub sender: Option<Sender>,
    pub text: Option<String>,
    /// Public handle of the originating chat, needed for permalinks.
    pub chat_username: Option<String>,
}

impl InboundMessage {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }

    pub fn sender_id(&self) -> Option<UserId> {
        self.sender.as_ref().map(|s| s.id)
    }

    /// Text that looks like a bot command (`/name ...`).
    pub fn command_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| t.trim_start().starts_with('/'))
    }
}
