use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    errors::TransportResult,
    messaging::types::InboundMessage,
};

/// Outbound half of the chat transport.
///
/// Every call blocks until the platform acknowledges it and reports failures as a
/// tagged [`TransportError`](crate::errors::TransportError).
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Forward `message` to `to`, preserving its origin.
    async fn forward_message(&self, to: ChatId, message: MessageRef) -> TransportResult<()>;

    /// Send an HTML-formatted text message.
    async fn send_html(&self, to: ChatId, html: &str, disable_preview: bool)
        -> TransportResult<()>;
}

/// Inbound half of the chat transport.
///
/// Each successful `connect()` yields a fresh, non-restartable stream.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self) -> TransportResult<Box<dyn EventStream>>;
}

#[async_trait]
pub trait EventStream: Send {
    /// Next inbound message; `Ok(None)` means the stream ended.
    async fn next_event(&mut self) -> TransportResult<Option<InboundMessage>>;
}
