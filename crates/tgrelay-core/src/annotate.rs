use crate::messaging::types::InboundMessage;

const NAME_PLACEHOLDER: &str = "—";
const NO_USERNAME: &str = "Йоқ";
const NO_LINK: &str = "Ссылка недоступна";

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Public permalink to a message in a chat with a public handle.
pub fn permalink(message: &InboundMessage) -> Option<String> {
    let handle = message.chat_username.as_deref().filter(|h| !h.is_empty())?;
    Some(format!("https://t.me/{handle}/{}", message.message_id.0))
}

/// Build the "sender info" note sent after every forwarded message.
pub fn build_sender_info(message: &InboundMessage) -> String {
    let name_line = match &message.sender {
        Some(sender) => {
            let name = if sender.full_name.trim().is_empty() {
                NAME_PLACEHOLDER.to_string()
            } else {
                escape_html(&sender.full_name)
            };
            format!("<a href=\"tg://user?id={}\">{name}</a>", sender.id.0)
        }
        None => NAME_PLACEHOLDER.to_string(),
    };

    let username = message
        .sender
        .as_ref()
        .and_then(|s| s.username.as_deref())
        .filter(|u| !u.is_empty())
        .map(|u| format!("@{u}"))
        .unwrap_or_else(|| NO_USERNAME.to_string());

    let link = permalink(message).unwrap_or_else(|| NO_LINK.to_string());

    format!(
        "✅ Мижоз ҳақида маълумот:\n\
         👤 Исм — {name_line}\n\
         💬 Username — {username}\n\n\
         🔗 {link}"
    )
}
