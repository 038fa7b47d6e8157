//! Long-polling event source.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{AllowedUpdate, Message, Update, UpdateKind},
};
use tracing::{debug, info};

use tgrelay_core::{
    domain::{ChatId, MessageId, UserId},
    errors::TransportResult,
    messaging::{
        port::{EventSource, EventStream},
        types::{InboundMessage, Sender},
    },
};

use crate::map_request_error;

/// `getUpdates` source.
///
/// The acknowledged offset is shared by every stream this source hands out.
/// It only moves past an update once that update has been handed out, so a
/// reconnect fetches again whatever the previous stream had buffered.
pub struct PollingSource {
    bot: Bot,
    timeout: Duration,
    offset: Arc<AtomicI32>,
}

impl PollingSource {
    pub fn new(bot: Bot, timeout: Duration) -> Self {
        Self {
            bot,
            timeout,
            offset: Arc::new(AtomicI32::new(0)),
        }
    }
}

#[async_trait]
impl EventSource for PollingSource {
    async fn connect(&self) -> TransportResult<Box<dyn EventStream>> {
        let me = self.bot.get_me().await.map_err(map_request_error)?;
        info!(username = %me.username(), "connected to Telegram");

        Ok(Box::new(PollingStream {
            bot: self.bot.clone(),
            timeout: self.timeout,
            pending: Pending::new(self.offset.clone()),
        }))
    }
}

/// Fetched updates not yet handed out, with the offset they acknowledge.
struct Pending {
    offset: Arc<AtomicI32>,
    queue: VecDeque<(i32, Option<InboundMessage>)>,
}

impl Pending {
    fn new(offset: Arc<AtomicI32>) -> Self {
        Self {
            offset,
            queue: VecDeque::new(),
        }
    }

    fn offset(&self) -> i32 {
        self.offset.load(Ordering::SeqCst)
    }

    fn extend(&mut self, updates: impl IntoIterator<Item = Update>) {
        for update in updates {
            self.queue.push_back((update.id, inbound_from_update(&update)));
        }
    }

    /// Next message, acknowledging it and any unsupported updates before it.
    fn pop(&mut self) -> Option<InboundMessage> {
        while let Some((id, message)) = self.queue.pop_front() {
            self.offset.store(id + 1, Ordering::SeqCst);
            match message {
                Some(message) => return Some(message),
                None => debug!(update_id = id, "skipping unsupported update"),
            }
        }
        None
    }
}

struct PollingStream {
    bot: Bot,
    timeout: Duration,
    pending: Pending,
}

#[async_trait]
impl EventStream for PollingStream {
    async fn next_event(&mut self) -> TransportResult<Option<InboundMessage>> {
        loop {
            if let Some(message) = self.pending.pop() {
                return Ok(Some(message));
            }

            let timeout = u32::try_from(self.timeout.as_secs()).unwrap_or(u32::MAX);
            let updates = self
                .bot
                .get_updates()
                .offset(self.pending.offset())
                .timeout(timeout)
                .allowed_updates([AllowedUpdate::Message, AllowedUpdate::ChannelPost])
                .await
                .map_err(map_request_error)?;
            self.pending.extend(updates);
        }
    }
}

/// Message or channel post carried by `update`, if any.
pub fn inbound_from_update(update: &Update) -> Option<InboundMessage> {
    match &update.kind {
        UpdateKind::Message(msg) | UpdateKind::ChannelPost(msg) => Some(inbound_from_message(msg)),
        _ => None,
    }
}

pub fn inbound_from_message(msg: &Message) -> InboundMessage {
    InboundMessage {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
        is_private: msg.chat.is_private(),
        sender: msg.from().map(|u| Sender {
            id: UserId(u.id.0 as i64),
            full_name: u.full_name(),
            username: u.username.clone(),
        }),
        text: msg.text().map(str::to_string),
        chat_username: msg.chat.username().map(str::to_string),
    }
}
