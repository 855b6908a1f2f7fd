//! Best-effort notifications

use crate::config::TelegramConfig;
use crate::error::NotifyError;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const TELEGRAM_API: &str = "https://api.telegram.org";
/// Pause between messages to different recipients
const SEND_INTERVAL: Duration = Duration::from_secs(1);

/// Sink for human-readable messages
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Send and swallow any error
pub async fn notify_best_effort(notifier: &dyn Notifier, message: &str) {
    if let Err(e) = notifier.notify(message).await {
        tracing::warn!(error = %e, "Notification failed");
    }
}

/// Does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Telegram Bot API `sendMessage` to every configured user
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    user_ids: Vec<i64>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: TELEGRAM_API.to_string(),
            bot_token: config.bot_token.clone(),
            user_ids: config.user_ids.clone(),
        }
    }

    /// Point at a different Bot API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        for (i, user_id) in self.user_ids.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(SEND_INTERVAL).await;
            }
            let response = self
                .client
                .post(&url)
                .json(&json!({
                    "chat_id": user_id,
                    "text": message,
                    "parse_mode": "HTML",
                }))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(NotifyError::Rejected {
                    status: response.status().as_u16(),
                });
            }
        }
        Ok(())
    }
}

/// Pick the notifier the configuration asks for
pub fn from_config(config: &TelegramConfig) -> Box<dyn Notifier> {
    if config.enabled {
        Box::new(TelegramNotifier::new(config))
    } else {
        Box::new(NoopNotifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl Notifier for Failing {
        async fn notify(&self, _message: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Rejected { status: 403 })
        }
    }

    #[tokio::test]
    async fn test_best_effort_swallows_errors() {
        notify_best_effort(&Failing, "hello").await;
        notify_best_effort(&NoopNotifier, "hello").await;
    }

    #[tokio::test]
    async fn test_unreachable_telegram_is_an_error() {
        let config = TelegramConfig {
            enabled: true,
            bot_token: "123:abc".into(),
            user_ids: vec![1],
        };
        let notifier = TelegramNotifier::new(&config).with_api_base("http://127.0.0.1:9");
        assert!(notifier.notify("hi").await.is_err());
    }
}
