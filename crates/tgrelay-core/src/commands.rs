use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    audit::{AuditEvent, AuditLogger},
    domain::RecipientId,
    messaging::types::{InboundMessage, Sender},
    registry::{AddOutcome, RecipientRegistry, RemoveOutcome},
    security::is_authorized,
};

const DENIED: &str = "⛔️ Сизда етарли ҳуқуқ йўқ.";
const ADMIN_HELP: &str = "Сиз бот администраторисиз. Қабул қилувчиларни бошқариш учун /add, /remove ва /list буйруқларидан фойдаланишингиз мумкин.\n\nМисол: <code>/add 123456789</code>";
const ALREADY_PRESENT: &str = "Бу id рўйхатда аллақачон мавжуд.";
const NOT_FOUND: &str = "Бу id рўйхатда йўқ.";
const EMPTY_LIST: &str = "Рўйхат бўш.";
const SAVE_FAILED: &str = "⚠️ Рўйхатни сақлашда хатолик юз берди.";

/// Split `/cmd@botname args` into a lowercase command name and the trimmed rest.
pub fn parse_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// An optionally negative decimal integer and nothing else.
pub fn parse_recipient_id(arg: &str) -> Option<RecipientId> {
    let arg = arg.trim();
    let digits = arg.strip_prefix('-').unwrap_or(arg);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    arg.parse().ok()
}

/// Handles `/start`, `/add`, `/remove` and `/list` from private chats.
///
/// Returns the HTML replies to send back, in order; the caller owns delivery.
pub struct CommandHandler {
    admins: Vec<i64>,
    registry: Arc<RecipientRegistry>,
    audit: Option<Arc<AuditLogger>>,
}

impl CommandHandler {
    pub fn new(
        admins: Vec<i64>,
        registry: Arc<RecipientRegistry>,
        audit: Option<Arc<AuditLogger>>,
    ) -> Self {
        Self {
            admins,
            registry,
            audit,
        }
    }

    pub async fn handle(&self, message: &InboundMessage) -> Vec<String> {
        let (Some(sender), Some(text)) = (message.sender.as_ref(), message.command_text()) else {
            return Vec::new();
        };
        let (cmd, args) = parse_command(text);

        match cmd.as_str() {
            "start" => self.start(sender),
            "add" | "remove" | "list" => {
                if !is_authorized(Some(sender.id), &self.admins) {
                    warn!(user_id = sender.id.0, command = %cmd, "non-admin tried an admin command");
                    self.audit(AuditEvent::denied(
                        sender.id.0,
                        sender.username.as_deref(),
                        &cmd,
                    ));
                    return vec![DENIED.to_string()];
                }
                match cmd.as_str() {
                    "add" => vec![self.add(sender, &args).await],
                    "remove" => vec![self.remove(sender, &args).await],
                    _ => vec![self.list(sender).await],
                }
            }
            _ => Vec::new(),
        }
    }

    fn start(&self, sender: &Sender) -> Vec<String> {
        let mut replies = vec![format!(
            "👋 Ассалому алейкум!\nID: <code>{}</code>",
            sender.id.0
        )];
        if is_authorized(Some(sender.id), &self.admins) {
            replies.push(ADMIN_HELP.to_string());
        }
        replies
    }

    async fn add(&self, sender: &Sender, args: &str) -> String {
        let Some(id) = parse_recipient_id(args) else {
            return "Фойдаланиш: /add [user_id]".to_string();
        };

        match self.registry.add(id).await {
            Ok(AddOutcome::Added) => {
                info!(admin = sender.id.0, recipient = id, "recipient added");
                self.audit_command(sender, "add", Some(id), "added");
                format!("✅ Қўшилди: <code>{id}</code>")
            }
            Ok(AddOutcome::AlreadyPresent) => {
                self.audit_command(sender, "add", Some(id), "already_present");
                ALREADY_PRESENT.to_string()
            }
            Err(e) => {
                error!(recipient = id, error = %e, "failed to persist added recipient");
                self.audit_command(sender, "add", Some(id), "save_failed");
                SAVE_FAILED.to_string()
            }
        }
    }

    async fn remove(&self, sender: &Sender, args: &str) -> String {
        let Some(id) = parse_recipient_id(args) else {
            return "Фойдаланиш: /remove [user_id]".to_string();
        };

        match self.registry.remove(id).await {
            Ok(RemoveOutcome::Removed) => {
                info!(admin = sender.id.0, recipient = id, "recipient removed");
                self.audit_command(sender, "remove", Some(id), "removed");
                format!("🗑 Ўчирилди: <code>{id}</code>")
            }
            Ok(RemoveOutcome::NotFound) => {
                self.audit_command(sender, "remove", Some(id), "not_found");
                NOT_FOUND.to_string()
            }
            Err(e) => {
                error!(recipient = id, error = %e, "failed to persist removed recipient");
                self.audit_command(sender, "remove", Some(id), "save_failed");
                SAVE_FAILED.to_string()
            }
        }
    }

    async fn list(&self, sender: &Sender) -> String {
        let recipients = self.registry.list().await;
        self.audit_command(sender, "list", None, &recipients.len().to_string());
        if recipients.is_empty() {
            return EMPTY_LIST.to_string();
        }

        let rows = recipients
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        format!("Жорий қабул қилувчилар рўйхати:\n<code>{rows}</code>")
    }

    fn audit_command(
        &self,
        sender: &Sender,
        command: &str,
        recipient: Option<i64>,
        outcome: &str,
    ) {
        self.audit(AuditEvent::command(
            sender.id.0,
            sender.username.as_deref(),
            command,
            recipient,
            outcome,
        ));
    }

    fn audit(&self, event: AuditEvent) {
        let Some(audit) = &self.audit else {
            return;
        };
        if let Err(e) = audit.write(&event) {
            warn!(path = %audit.path().display(), error = %e, "failed to write audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, MessageId, UserId};
    use crate::relay::tests::tmp_registry;

    const ADMIN: i64 = 1189419672;

    fn private_message(from: i64, text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: ChatId(from),
            message_id: MessageId(1),
            is_private: true,
            sender: Some(Sender {
                id: UserId(from),
                full_name: "Someone".to_string(),
                username: Some("someone".to_string()),
            }),
            text: Some(text.to_string()),
            chat_username: None,
        }
    }

    fn handler(prefix: &str, ids: &[i64]) -> (CommandHandler, std::path::PathBuf) {
        let (registry, path) = tmp_registry(prefix, ids);
        (CommandHandler::new(vec![ADMIN], registry, None), path)
    }

    #[test]
    fn parses_command_with_bot_suffix() {
        assert_eq!(
            parse_command("/Add@relay_bot  42 "),
            ("add".to_string(), "42".to_string())
        );
        assert_eq!(parse_command("/list"), ("list".to_string(), String::new()));
    }

    #[test]
    fn recipient_ids_are_plain_integers() {
        assert_eq!(parse_recipient_id("42"), Some(42));
        assert_eq!(parse_recipient_id("-1001433669620"), Some(-1001433669620));
        assert_eq!(parse_recipient_id(""), None);
        assert_eq!(parse_recipient_id("-"), None);
        assert_eq!(parse_recipient_id("--5"), None);
        assert_eq!(parse_recipient_id("+5"), None);
        assert_eq!(parse_recipient_id("1 2"), None);
        assert_eq!(parse_recipient_id("abc"), None);
        assert_eq!(parse_recipient_id("99999999999999999999"), None);
    }

    #[tokio::test]
    async fn add_remove_walkthrough() {
        let (h, path) = handler("tgrelay-cmd-walk", &[]);

        let r = h.handle(&private_message(ADMIN, "/add 42")).await;
        assert_eq!(r, vec!["✅ Қўшилди: <code>42</code>".to_string()]);
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc, serde_json::json!({ "recipients": [42] }));

        let r = h.handle(&private_message(ADMIN, "/add 42")).await;
        assert_eq!(r, vec![ALREADY_PRESENT.to_string()]);

        let r = h.handle(&private_message(ADMIN, "/remove 42")).await;
        assert_eq!(r, vec!["🗑 Ўчирилди: <code>42</code>".to_string()]);

        let r = h.handle(&private_message(ADMIN, "/remove 42")).await;
        assert_eq!(r, vec![NOT_FOUND.to_string()]);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn malformed_arguments_get_usage() {
        let (h, path) = handler("tgrelay-cmd-usage", &[]);
        assert_eq!(
            h.handle(&private_message(ADMIN, "/add")).await,
            vec!["Фойдаланиш: /add [user_id]".to_string()]
        );
        assert_eq!(
            h.handle(&private_message(ADMIN, "/remove abc")).await,
            vec!["Фойдаланиш: /remove [user_id]".to_string()]
        );
        assert_eq!(
            h.handle(&private_message(ADMIN, "/list")).await,
            vec![EMPTY_LIST.to_string()]
        );
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn non_admins_are_denied_without_mutation() {
        let (h, path) = handler("tgrelay-cmd-denied", &[5]);
        for cmd in ["/add 6", "/remove 5", "/list"] {
            assert_eq!(
                h.handle(&private_message(77, cmd)).await,
                vec![DENIED.to_string()]
            );
        }
        assert_eq!(h.registry.list().await, vec![5]);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn list_shows_ids_in_registry_order() {
        let (h, path) = handler("tgrelay-cmd-list", &[300, -100, 200]);
        assert_eq!(
            h.handle(&private_message(ADMIN, "/list")).await,
            vec!["Жорий қабул қилувчилар рўйхати:\n<code>300\n-100\n200</code>".to_string()]
        );
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn start_echoes_id_and_helps_admins() {
        let (h, path) = handler("tgrelay-cmd-start", &[]);

        let r = h.handle(&private_message(77, "/start")).await;
        assert_eq!(r, vec!["👋 Ассалому алейкум!\nID: <code>77</code>".to_string()]);

        let r = h.handle(&private_message(ADMIN, "/start")).await;
        assert_eq!(r.len(), 2);
        assert!(r[0].contains(&format!("<code>{ADMIN}</code>")));
        assert_eq!(r[1], ADMIN_HELP);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn unknown_commands_and_plain_text_are_ignored() {
        let (h, path) = handler("tgrelay-cmd-unknown", &[]);
        assert!(h.handle(&private_message(ADMIN, "/help")).await.is_empty());
        assert!(h.handle(&private_message(ADMIN, "add 5")).await.is_empty());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn admin_actions_are_audited() {
        let (registry, path) = tmp_registry("tgrelay-cmd-audit", &[]);
        let audit_path = path.with_extension("log");
        let audit = Arc::new(AuditLogger::new(&audit_path, true));
        let h = CommandHandler::new(vec![ADMIN], registry, Some(audit));

        h.handle(&private_message(ADMIN, "/add 9")).await;
        h.handle(&private_message(77, "/list")).await;

        let written = std::fs::read_to_string(&audit_path).unwrap();
        let events: Vec<serde_json::Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["outcome"], "added");
        assert_eq!(events[0]["recipient"], 9);
        assert_eq!(events[1]["event"], "denied");
        assert_eq!(events[1]["user_id"], 77);

        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(audit_path);
    }
}
