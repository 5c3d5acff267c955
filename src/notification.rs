// 🔔 Notifications - best-effort delivery over several channels
//
// Delivery never fails the caller: every channel reports a DeliveryReport and
// a broken channel is logged and skipped.

use crate::config::TelegramConfig;
use crate::db::{timestamp_now, RecordStore};
use crate::records::RecordKind;
use crate::roles::ApprovalTier;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// NOTIFICATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    User(String),
    /// Everyone holding an approver tier
    Tier(ApprovalTier),
}

impl Recipient {
    pub fn key(&self) -> String {
        match self {
            Recipient::User(id) => format!("user:{}", id),
            Recipient::Tier(tier) => format!("tier:{}", tier),
        }
    }

    pub fn parse_key(key: &str) -> Option<Self> {
        if let Some(id) = key.strip_prefix("user:") {
            return Some(Recipient::User(id.to_string()));
        }
        key.strip_prefix("tier:")
            .and_then(ApprovalTier::parse)
            .map(Recipient::Tier)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub model_type: Option<RecordKind>,
    pub model_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn new(recipient: Recipient, title: &str, message: &str) -> Self {
        Notification {
            id: uuid::Uuid::new_v4().to_string(),
            recipient,
            title: title.to_string(),
            message: message.to_string(),
            model_type: None,
            model_id: None,
            created_at: timestamp_now(),
            read_at: None,
        }
    }

    /// Attach the record this notification is about
    pub fn about(mut self, kind: RecordKind, id: i64) -> Self {
        self.model_type = Some(kind);
        self.model_id = Some(id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub channel: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn delivered(channel: &str) -> Self {
        DeliveryReport {
            channel: channel.to_string(),
            success: true,
            error: None,
        }
    }

    pub fn failed(channel: &str, error: impl Into<String>) -> Self {
        DeliveryReport {
            channel: channel.to_string(),
            success: false,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// CHANNELS
// ============================================================================

pub trait Notifier: Send + Sync {
    fn channel(&self) -> &str;

    /// Must not panic and must not propagate failures
    fn deliver(&self, notification: &Notification) -> DeliveryReport;
}

/// Writes notifications to the log only
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn channel(&self) -> &str {
        "log"
    }

    fn deliver(&self, notification: &Notification) -> DeliveryReport {
        info!(
            recipient = %notification.recipient.key(),
            title = %notification.title,
            "{}",
            notification.message
        );
        DeliveryReport::delivered(self.channel())
    }
}

/// In-app notifications persisted in the record store
pub struct DatabaseNotifier {
    store: Arc<dyn RecordStore>,
}

impl DatabaseNotifier {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        DatabaseNotifier { store }
    }
}

impl Notifier for DatabaseNotifier {
    fn channel(&self) -> &str {
        "database"
    }

    fn deliver(&self, notification: &Notification) -> DeliveryReport {
        match self.store.insert_notification(notification) {
            Ok(()) => DeliveryReport::delivered(self.channel()),
            Err(e) => {
                warn!("database notification failed: {:#}", e);
                DeliveryReport::failed(self.channel(), e.to_string())
            }
        }
    }
}

/// Telegram Bot API `sendMessage` to a fixed chat
pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(TelegramNotifier { client, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.enabled && self.config.bot_token.is_some() && self.config.chat_id.is_some()
    }

    fn endpoint(&self, token: &str) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            token
        )
    }

    /// Body for `parse_mode: HTML`; free text (reasons, comments) is escaped
    pub fn format_message(notification: &Notification) -> String {
        let mut text = format!(
            "<b>{}</b>\n{}",
            escape_html(&notification.title),
            escape_html(&notification.message)
        );
        if let (Some(kind), Some(id)) = (notification.model_type, notification.model_id) {
            text.push_str(&format!("\n\n{} #{}", kind.label(), id));
        }
        text
    }
}

/// Telegram's HTML mode only needs these three escaped
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

impl Notifier for TelegramNotifier {
    fn channel(&self) -> &str {
        "telegram"
    }

    fn deliver(&self, notification: &Notification) -> DeliveryReport {
        let (token, chat_id) = match (&self.config.bot_token, &self.config.chat_id) {
            (Some(token), Some(chat_id)) if self.config.enabled => (token, chat_id),
            _ => {
                debug!("telegram not configured, skipping");
                return DeliveryReport::failed(self.channel(), "telegram not configured");
            }
        };

        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": TelegramNotifier::format_message(notification),
            "parse_mode": "HTML",
        });

        let response = self.client.post(self.endpoint(token)).json(&payload).send();

        match response {
            Ok(resp) if resp.status().is_success() => DeliveryReport::delivered(self.channel()),
            Ok(resp) => {
                let status = resp.status();
                warn!("telegram rejected message: HTTP {}", status);
                DeliveryReport::failed(self.channel(), format!("HTTP {}", status))
            }
            Err(e) => {
                warn!("telegram unreachable: {}", e);
                DeliveryReport::failed(self.channel(), e.to_string())
            }
        }
    }
}

// ============================================================================
// NOTIFICATION SERVICE (fan-out)
// ============================================================================

#[derive(Default)]
pub struct NotificationService {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotificationService {
    pub fn new() -> Self {
        NotificationService {
            channels: Vec::new(),
        }
    }

    pub fn with_channel(mut self, channel: Box<dyn Notifier>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Log + database always, Telegram when enabled. A Telegram client that
    /// cannot be built degrades to the remaining channels.
    pub fn from_config(telegram: &TelegramConfig, store: Arc<dyn RecordStore>) -> Self {
        let mut service = NotificationService::new()
            .with_channel(Box::new(LogNotifier))
            .with_channel(Box::new(DatabaseNotifier::new(store)));

        if telegram.enabled {
            match TelegramNotifier::new(telegram.clone()) {
                Ok(notifier) => service = service.with_channel(Box::new(notifier)),
                Err(e) => warn!("telegram channel disabled: {:#}", e),
            }
        }

        service
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.channel()).collect()
    }

    pub fn notify(&self, notification: &Notification) -> Vec<DeliveryReport> {
        self.channels
            .iter()
            .map(|channel| channel.deliver(notification))
            .collect()
    }
}
