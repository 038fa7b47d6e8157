use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Keywords that block a source message from being relayed.
///
/// Matching is a plain substring test against the lowercased text, so short
/// fragments such as "на" or "тел" also hit ordinary words. Override with
/// `RELAY_KEYWORDS` rather than changing the matching rules.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "http://",
    "https://",
    "t.me/",
    "оламиз",
    "olamiz",
    "ketamiz",
    "💸",
    "⚡️",
    "🔥",
    "₽",
    "$",
    "деньги",
    "О Л А М И З",
    "руб",
    "тыс",
    "заработ",
    "на",
    "одам оламиз",
    "почта оламиз",
    "юрамиз",
    "машина",
    "жентра",
    "кобалт",
    "без заправка",
    "тел",
    "телефон",
    "🏖",
    "👨‍🦱",
    "👩‍🦰",
    "💌",
    "🚔",
];

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub source_chat_ids: Vec<i64>,
    pub admin_ids: Vec<i64>,
    pub keywords: Vec<String>,
    pub recipients_file: PathBuf,

    // Connection supervision
    pub reconnect_delay: Duration,
    pub error_delay: Duration,
    pub rate_limit_padding: Duration,
    pub poll_timeout: Duration,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(env_str)
    }

    /// Build the config from `get`, which maps a variable name to its value.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Required env vars
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        let source_chat_ids = parse_csv_i64(get("RELAY_SOURCE_CHATS"));
        let admin_ids = parse_csv_i64(get("RELAY_ADMINS"));

        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        if source_chat_ids.is_empty() {
            return Err(Error::Config(
                "RELAY_SOURCE_CHATS environment variable is required".to_string(),
            ));
        }
        if admin_ids.is_empty() {
            return Err(Error::Config(
                "RELAY_ADMINS environment variable is required".to_string(),
            ));
        }

        let keywords = match get("RELAY_KEYWORDS").and_then(non_empty) {
            Some(raw) => parse_csv_lower(Some(raw)),
            None => default_keywords(),
        };

        let recipients_file = get("RECIPIENTS_FILE")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("recipients.json"));

        let secs =
            |key: &str, default: u64| Duration::from_secs(parse_u64(get(key)).unwrap_or(default));
        let reconnect_delay = secs("RECONNECT_DELAY_SECS", 5);
        let error_delay = secs("ERROR_DELAY_SECS", 5);
        let rate_limit_padding = secs("RATE_LIMIT_PADDING_SECS", 1);
        let poll_timeout = secs("POLL_TIMEOUT_SECS", 10);

        let audit_log_path = PathBuf::from(
            get("AUDIT_LOG_PATH").unwrap_or("/tmp/tgrelay-audit.log".to_string()),
        );
        let audit_log_json = parse_bool(get("AUDIT_LOG_JSON")).unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            source_chat_ids,
            admin_ids,
            keywords,
            recipients_file,
            reconnect_delay,
            error_delay,
            rate_limit_padding,
            poll_timeout,
            audit_log_path,
            audit_log_json,
        })
    }
}

/// Built-in keyword list, normalized the same way as `RELAY_KEYWORDS`.
pub fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|k| k.to_lowercase()).collect()
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn parse_csv_lower(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_ids_skip_garbage() {
        let ids = parse_csv_i64(Some("-1001433669620, 42,,abc, 7 ".to_string()));
        assert_eq!(ids, vec![-1001433669620, 42, 7]);
        assert!(parse_csv_i64(None).is_empty());
    }

    #[test]
    fn csv_keywords_are_trimmed_and_lowercased() {
        let kws = parse_csv_lower(Some(" HTTP:// ,Руб,, ".to_string()));
        assert_eq!(kws, vec!["http://".to_string(), "руб".to_string()]);
    }

    #[test]
    fn default_keywords_keep_short_fragments() {
        let kws = default_keywords();
        assert_eq!(kws.len(), DEFAULT_KEYWORDS.len());
        assert!(kws.contains(&"на".to_string()));
        assert!(kws.contains(&"тел".to_string()));
        assert!(kws.contains(&"о л а м и з".to_string()));
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| {
            vars.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        }
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ("RELAY_SOURCE_CHATS", "-1001433669620,-1001327239978"),
        ("RELAY_ADMINS", "1189419672"),
    ];

    #[test]
    fn missing_required_values_are_config_errors() {
        for missing in ["TELEGRAM_BOT_TOKEN", "RELAY_SOURCE_CHATS", "RELAY_ADMINS"] {
            let vars: Vec<(&str, &str)> = REQUIRED
                .iter()
                .copied()
                .filter(|(k, _)| *k != missing)
                .collect();
            match Config::from_lookup(lookup(&vars)) {
                Err(Error::Config(msg)) => assert!(msg.contains(missing), "{msg}"),
                other => panic!("expected config error for {missing}, got {other:?}"),
            }
        }

        // Present but unusable counts as missing.
        let mut vars = REQUIRED.to_vec();
        vars[1] = ("RELAY_SOURCE_CHATS", "abc, ,");
        assert!(matches!(
            Config::from_lookup(lookup(&vars)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn optional_values_fall_back_to_defaults() {
        let cfg = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(cfg.source_chat_ids, vec![-1001433669620, -1001327239978]);
        assert_eq!(cfg.admin_ids, vec![1189419672]);
        assert_eq!(cfg.keywords, default_keywords());
        assert_eq!(cfg.recipients_file, PathBuf::from("recipients.json"));
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(5));
        assert_eq!(cfg.error_delay, Duration::from_secs(5));
        assert_eq!(cfg.rate_limit_padding, Duration::from_secs(1));
        assert_eq!(cfg.poll_timeout, Duration::from_secs(10));
        assert!(!cfg.audit_log_json);

        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("RELAY_KEYWORDS", "Spam, T.ME/"),
            ("POLL_TIMEOUT_SECS", "5"),
            ("AUDIT_LOG_JSON", "yes"),
        ]);
        let cfg = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(cfg.keywords, vec!["spam".to_string(), "t.me/".to_string()]);
        assert_eq!(cfg.poll_timeout, Duration::from_secs(5));
        assert!(cfg.audit_log_json);
    }

    #[test]
    fn dotenv_lines_strip_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# comment\nTELEGRAM_BOT_TOKEN=\"123:abc\"\n\nRELAY_ADMINS = 1,2\nbroken line\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TELEGRAM_BOT_TOKEN".to_string(), "123:abc".to_string()),
                ("RELAY_ADMINS".to_string(), "1,2".to_string()),
            ]
        );
    }
}
