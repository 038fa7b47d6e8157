use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    commands::CommandHandler,
    messaging::{port::MessagingPort, types::InboundMessage},
    relay::{RelayDispatcher, RelayOutcome},
    supervisor::EventHandler,
    Result,
};

/// Routes inbound messages to the command handler or the relay dispatcher.
pub struct Router {
    pub relay: RelayDispatcher,
    pub commands: CommandHandler,
    pub messenger: Arc<dyn MessagingPort>,
}

impl Router {
    pub fn new(
        relay: RelayDispatcher,
        commands: CommandHandler,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            relay,
            commands,
            messenger,
        }
    }

    /// Handle one inbound message.
    ///
    /// Relay failures are isolated per recipient and never surface here; an
    /// error means a command reply could not be delivered.
    pub async fn route(&self, message: InboundMessage) -> Result<()> {
        if message.is_private && message.command_text().is_some() {
            for reply in self.commands.handle(&message).await {
                self.messenger
                    .send_html(message.chat_id, &reply, false)
                    .await?;
            }
            return Ok(());
        }

        if self.relay.is_source_chat(message.chat_id) && message.text.is_some() {
            if let RelayOutcome::Filtered = self.relay.on_source_message(&message).await {
                debug!(
                    chat_id = message.chat_id.0,
                    message_id = message.message_id.0,
                    "source message filtered"
                );
            }
            return Ok(());
        }

        debug!(chat_id = message.chat_id.0, "ignoring message");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for Router {
    async fn handle(&self, message: InboundMessage) -> Result<()> {
        self.route(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, MessageId, UserId};
    use crate::filter::KeywordFilter;
    use crate::messaging::types::Sender;
    use crate::registry::RecipientRegistry;
    use crate::relay::tests::{tmp_registry, Call, RecordingMessenger};

    const SOURCE: i64 = -1001327239978;
    const ADMIN: i64 = 1602393068;

    struct Fixture {
        router: Router,
        messenger: Arc<RecordingMessenger>,
        registry: Arc<RecipientRegistry>,
        path: std::path::PathBuf,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn fixture(prefix: &str, ids: &[i64]) -> Fixture {
        let (registry, path) = tmp_registry(prefix, ids);
        let messenger = Arc::new(RecordingMessenger::default());
        let relay = RelayDispatcher::new(
            [SOURCE],
            KeywordFilter::new(["http"]),
            registry.clone(),
            messenger.clone(),
        );
        let commands = CommandHandler::new(vec![ADMIN], registry.clone(), None);
        Fixture {
            router: Router::new(relay, commands, messenger.clone()),
            messenger,
            registry,
            path,
        }
    }

    fn message(chat_id: i64, is_private: bool, text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: ChatId(chat_id),
            message_id: MessageId(3),
            is_private,
            sender: Some(Sender {
                id: UserId(ADMIN),
                full_name: "Admin".to_string(),
                username: None,
            }),
            text: Some(text.to_string()),
            chat_username: None,
        }
    }

    #[tokio::test]
    async fn private_commands_get_replies_in_the_same_chat() {
        let f = fixture("tgrelay-router-cmd", &[]);
        f.router.route(message(ADMIN, true, "/add 10")).await.unwrap();

        assert_eq!(
            f.messenger.calls(),
            vec![Call::Html(
                ADMIN,
                "✅ Қўшилди: <code>10</code>".to_string(),
                false
            )]
        );
        assert_eq!(f.registry.list().await, vec![10]);
    }

    #[tokio::test]
    async fn commands_posted_in_groups_are_not_executed() {
        let f = fixture("tgrelay-router-group", &[]);
        f.router.route(message(-5, false, "/add 10")).await.unwrap();
        assert!(f.messenger.calls().is_empty());
        assert!(f.registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn source_chat_text_is_relayed_unless_filtered() {
        let f = fixture("tgrelay-router-relay", &[7]);
        f.router
            .route(message(SOURCE, false, "Toshkentga yuk bor"))
            .await
            .unwrap();
        assert_eq!(f.messenger.calls().len(), 2);

        f.router
            .route(message(SOURCE, false, "see http://spam"))
            .await
            .unwrap();
        assert_eq!(f.messenger.calls().len(), 2);
    }

    #[tokio::test]
    async fn private_plain_text_is_ignored() {
        let f = fixture("tgrelay-router-plain", &[7]);
        f.router.route(message(ADMIN, true, "salom")).await.unwrap();
        assert!(f.messenger.calls().is_empty());
    }
}
