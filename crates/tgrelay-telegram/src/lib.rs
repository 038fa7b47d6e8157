//! Telegram adapter (teloxide).
//!
//! Implements the `tgrelay-core` messaging ports over the Telegram Bot API.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode, RequestError};

use tokio::time::sleep;
use tracing::warn;

pub mod polling;
pub mod router;

use tgrelay_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::{TransportError, TransportResult},
    messaging::port::MessagingPort,
};

/// Classify a teloxide failure for the supervisor and the relay.
pub fn map_request_error(e: RequestError) -> TransportError {
    match e {
        RequestError::RetryAfter(wait) => TransportError::RateLimited {
            wait_secs: wait.as_secs(),
        },
        RequestError::Network(e) => TransportError::Network(e.to_string()),
        RequestError::Io(e) => TransportError::Network(e.to_string()),
        other => TransportError::Other(format!("telegram error: {other}")),
    }
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    /// Run `op`, retrying once after a flood-wait answer.
    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> TransportResult<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    RequestError::RetryAfter(wait) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        warn!(wait_secs = wait.as_secs(), "flood wait on send, retrying once");
                        sleep(wait).await;
                        continue;
                    }
                    other => return Err(map_request_error(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn forward_message(&self, to: ChatId, message: MessageRef) -> TransportResult<()> {
        self.with_retry(|| {
            self.bot.forward_message(
                Self::tg_chat(to),
                Self::tg_chat(message.chat_id),
                Self::tg_msg_id(message.message_id),
            )
        })
        .await?;
        Ok(())
    }

    async fn send_html(
        &self,
        to: ChatId,
        html: &str,
        disable_preview: bool,
    ) -> TransportResult<()> {
        self.with_retry(|| {
            self.bot
                .send_message(Self::tg_chat(to), html.to_string())
                .parse_mode(ParseMode::Html)
                .disable_web_page_preview(disable_preview)
        })
        .await?;
        Ok(())
    }
}
