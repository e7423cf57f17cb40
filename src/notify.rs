//! Notification sink
//!
//! Scheduled executions report through a single output sink. The concrete
//! sink is a chat bot; command parsing and keyboards live outside the core.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

use crate::config::NotifyConfig;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> AppResult<()>;
}

/// Chat-bot sink posting into the configured chat
pub struct ChatNotifier {
    config: NotifyConfig,
    client: Arc<Client>,
}

impl ChatNotifier {
    pub fn new(config: NotifyConfig, client: Arc<Client>) -> Self {
        Self { config, client }
    }

    /// Chat-id allowlist check
    #[allow(dead_code)]
    pub fn is_allowed(&self, user_id: i64) -> bool {
        self.config.allowed_ids.contains(&user_id) || self.is_admin(user_id)
    }

    #[allow(dead_code)]
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.config.admin_ids.contains(&user_id)
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    async fn send(&self, text: &str) -> AppResult<()> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.config.bot_token
        );

        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.config.chat_id,
                "text": escape_html(text),
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .map_err(|e| AppError::unavailable("chat", e))?;

        if !resp.status().is_success() {
            return Err(AppError::unavailable(
                "chat",
                format!("sendMessage returned {}", resp.status()),
            ));
        }
        Ok(())
    }
}

/// Sink used when notifications are disabled; messages land in the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> AppResult<()> {
        tracing::info!("notification: {}", text);
        Ok(())
    }
}

/// Escape angle brackets (and the ampersand they ride on) for chat markup
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Human-readable byte count for summary messages
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b > c"), "a &lt; b &gt; c");
        assert_eq!(escape_html("x & y"), "x &amp; y");
        assert_eq!(escape_html("<b>&</b>"), "&lt;b&gt;&amp;&lt;/b&gt;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_allowlist() {
        let config = NotifyConfig {
            enabled: true,
            bot_token: String::new(),
            chat_id: 1,
            allowed_ids: vec![10],
            admin_ids: vec![20],
        };
        let notifier = ChatNotifier::new(config, Arc::new(Client::new()));
        assert!(notifier.is_allowed(10));
        assert!(notifier.is_allowed(20)); // admins are implicitly allowed
        assert!(notifier.is_admin(20));
        assert!(!notifier.is_allowed(30));
        assert!(!notifier.is_admin(10));
    }
}
