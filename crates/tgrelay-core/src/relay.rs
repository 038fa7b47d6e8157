use std::{collections::HashSet, sync::Arc};

use tracing::{debug, warn};

use crate::{
    annotate::build_sender_info,
    domain::{ChatId, MessageRef, RecipientId},
    errors::TransportError,
    filter::KeywordFilter,
    messaging::{port::MessagingPort, types::InboundMessage},
    registry::RecipientRegistry,
};

/// What happened to one source message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Not from a source chat, or no text.
    Ignored,
    /// Dropped by the keyword filter.
    Filtered,
    Delivered {
        delivered: usize,
        failed: Vec<(RecipientId, TransportError)>,
    },
}

/// Fans qualifying source-chat messages out to every registered recipient.
pub struct RelayDispatcher {
    source_chats: HashSet<i64>,
    filter: KeywordFilter,
    registry: Arc<RecipientRegistry>,
    messenger: Arc<dyn MessagingPort>,
}

impl RelayDispatcher {
    pub fn new(
        source_chats: impl IntoIterator<Item = i64>,
        filter: KeywordFilter,
        registry: Arc<RecipientRegistry>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            source_chats: source_chats.into_iter().collect(),
            filter,
            registry,
            messenger,
        }
    }

    pub fn is_source_chat(&self, chat_id: ChatId) -> bool {
        self.source_chats.contains(&chat_id.0)
    }

    /// Relay one source message.
    ///
    /// Each recipient gets the forwarded original followed by the sender note.
    /// A failure for one recipient is logged and never stops the others.
    pub async fn on_source_message(&self, message: &InboundMessage) -> RelayOutcome {
        if !self.is_source_chat(message.chat_id) || message.text.is_none() {
            return RelayOutcome::Ignored;
        }
        if !self.filter.passes(message.text.as_deref()) {
            return RelayOutcome::Filtered;
        }

        let recipients = self.registry.list().await;
        let info = build_sender_info(message);
        let original = message.message_ref();

        let mut delivered = 0usize;
        let mut failed = Vec::new();
        for recipient in recipients {
            match self.deliver(recipient, original, &info).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(recipient, error = %e, "failed to relay message to recipient");
                    failed.push((recipient, e));
                }
            }
        }

        debug!(
            chat_id = message.chat_id.0,
            message_id = message.message_id.0,
            delivered,
            failed = failed.len(),
            "relayed source message"
        );
        RelayOutcome::Delivered { delivered, failed }
    }

    async fn deliver(
        &self,
        recipient: RecipientId,
        original: MessageRef,
        info: &str,
    ) -> Result<(), TransportError> {
        let to = ChatId(recipient);
        self.messenger.forward_message(to, original).await?;
        self.messenger.send_html(to, info, true).await
    }
}
