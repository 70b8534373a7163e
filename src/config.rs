use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_PROCESSED_LABEL: &str = "ProcessedByKindleBot";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub mailbox: MailboxConfig,
    pub telegram: TelegramConfig,
    pub smtp: SmtpConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8092,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    pub owner: Option<String>,
    pub trusted_sender: Option<String>,
    pub processed_label: String,
    pub api_base: String,
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            owner: None,
            trusted_sender: None,
            processed_label: DEFAULT_PROCESSED_LABEL.to_string(),
            api_base: "https://gmail.googleapis.com".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            client_id: None,
            client_secret: None,
            refresh_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub webhook_secret: Option<String>,
    pub owner_chat_id: Option<String>,
    pub api_base: String,
    pub webhook_path: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            webhook_secret: None,
            owner_chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
            webhook_path: "/api/telegram".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub secure: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 465,
            user: None,
            pass: None,
            secure: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub kindle_email: Option<String>,
    pub from_email: Option<String>,
    pub notes_inbox: Option<String>,
}

/// Settings the mail scan cannot run without.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub owner: String,
    pub trusted_sender: String,
    pub owner_chat_id: String,
    pub processed_label: String,
}

impl ScanSettings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let owner = non_empty(&cfg.mailbox.owner);
        let trusted = non_empty(&cfg.mailbox.trusted_sender);
        let chat = non_empty(&cfg.telegram.owner_chat_id);
        match (owner, trusted, chat) {
            (Some(owner), Some(trusted_sender), Some(owner_chat_id)) => Ok(Self {
                owner,
                trusted_sender,
                owner_chat_id,
                processed_label: cfg.mailbox.processed_label.clone(),
            }),
            _ => Err(BridgeError::Configuration(
                "BOT_INBOX_EMAIL, TRUSTED_SENDER_EMAIL, or OWNER_CHAT_ID".to_string(),
            )),
        }
    }
}

/// Addresses used when forwarding chat content to the Kindle.
#[derive(Debug, Clone)]
pub struct IntakeSettings {
    pub kindle_email: String,
    pub from_email: String,
}

impl IntakeSettings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        match (
            non_empty(&cfg.delivery.kindle_email),
            non_empty(&cfg.delivery.from_email),
        ) {
            (Some(kindle_email), Some(from_email)) => Ok(Self {
                kindle_email,
                from_email,
            }),
            _ => Err(BridgeError::Configuration(
                "KINDLE_EMAIL or FROM_EMAIL".to_string(),
            )),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn resolve_config_path() -> PathBuf {
    env::var("KINDLE_BRIDGE_CONFIG")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| expand_tilde("~/.kindle-bridge/kindle-bridge.json"))
}

pub fn load_config() -> Config {
    let config_path = resolve_config_path();

    let mut cfg = Config::default();

    if config_path.exists() {
        if let Ok(raw) = fs::read_to_string(&config_path) {
            match serde_json::from_str::<Config>(&raw) {
                Ok(file_cfg) => cfg = file_cfg,
                Err(err) => {
                    tracing::warn!(path = %config_path.display(), "ignoring config file: {err}")
                }
            }
        }
    }

    apply_env_overrides(&mut cfg, |key| env::var(key).ok());
    cfg
}

/// Layers environment values over `cfg`; blank values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(host) = get("KINDLE_BRIDGE_HOST") {
        cfg.server.host = host;
    }
    if let Some(port) = get("KINDLE_BRIDGE_PORT").and_then(|p| p.trim().parse().ok()) {
        cfg.server.port = port;
    }

    if let Some(owner) = get("BOT_INBOX_EMAIL") {
        cfg.mailbox.owner = Some(owner);
    }
    if let Some(sender) = get("TRUSTED_SENDER_EMAIL") {
        cfg.mailbox.trusted_sender = Some(sender);
    }
    if let Some(label) = get("PROCESSED_LABEL_NAME") {
        cfg.mailbox.processed_label = label;
    }
    if let Some(id) = get("GMAIL_CLIENT_ID") {
        cfg.mailbox.client_id = Some(id);
    }
    if let Some(secret) = get("GMAIL_CLIENT_SECRET") {
        cfg.mailbox.client_secret = Some(secret);
    }
    if let Some(token) = get("GMAIL_REFRESH_TOKEN") {
        cfg.mailbox.refresh_token = Some(token);
    }

    if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
        cfg.telegram.bot_token = Some(token);
    }
    if let Some(secret) = get("TELEGRAM_WEBHOOK_SECRET") {
        cfg.telegram.webhook_secret = Some(secret);
    }
    if let Some(chat) = get("OWNER_CHAT_ID") {
        cfg.telegram.owner_chat_id = Some(chat);
    }

    if let Some(host) = get("SMTP_HOST") {
        cfg.smtp.host = Some(host);
    }
    if let Some(port) = get("SMTP_PORT").and_then(|p| p.trim().parse().ok()) {
        cfg.smtp.port = port;
    }
    if let Some(user) = get("SMTP_USER") {
        cfg.smtp.user = Some(user);
    }
    if let Some(pass) = get("SMTP_PASS") {
        cfg.smtp.pass = Some(pass);
    }
    if let Some(secure) = get("SMTP_SECURE") {
        cfg.smtp.secure = secure.trim().eq_ignore_ascii_case("true");
    }

    if let Some(kindle) = get("KINDLE_EMAIL") {
        cfg.delivery.kindle_email = Some(kindle);
    }
    if let Some(from) = get("FROM_EMAIL") {
        cfg.delivery.from_email = Some(from);
    }
    if let Some(inbox) = get("OBSIDIAN_INBOX_EMAIL") {
        cfg.delivery.notes_inbox = Some(inbox);
    }
}
