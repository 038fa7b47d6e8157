use std::sync::Arc;

use anyhow::Context;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tgrelay_core::{
    audit::AuditLogger,
    commands::CommandHandler,
    config::Config,
    filter::KeywordFilter,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    registry::RecipientRegistry,
    relay::RelayDispatcher,
    router::Router,
    supervisor::{BackoffPolicy, Supervisor},
};

use crate::{polling::PollingSource, TelegramMessenger};

/// Wire the relay together and run it until `shutdown` fires.
pub async fn run_polling(cfg: Arc<Config>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Some(dir) = cfg.audit_log_path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create audit log dir {}", dir.display()))?;
        }
    }

    let registry = Arc::new(RecipientRegistry::open(&cfg.recipients_file));
    info!(
        sources = cfg.source_chat_ids.len(),
        admins = cfg.admin_ids.len(),
        keywords = cfg.keywords.len(),
        recipients = registry.list().await.len(),
        recipients_file = %cfg.recipients_file.display(),
        "starting relay"
    );

    let raw: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> =
        Arc::new(ThrottledMessenger::new(raw, ThrottleConfig::default()));

    let relay = RelayDispatcher::new(
        cfg.source_chat_ids.iter().copied(),
        KeywordFilter::new(&cfg.keywords),
        registry.clone(),
        messenger.clone(),
    );
    let audit = Arc::new(AuditLogger::new(
        cfg.audit_log_path.clone(),
        cfg.audit_log_json,
    ));
    let commands = CommandHandler::new(cfg.admin_ids.clone(), registry, Some(audit));
    let router = Arc::new(Router::new(relay, commands, messenger));

    let source = Arc::new(PollingSource::new(bot, cfg.poll_timeout));
    let supervisor = Supervisor::new(
        source,
        router,
        BackoffPolicy::from_config(&cfg),
        shutdown,
    );
    supervisor.run().await;
    Ok(())
}
