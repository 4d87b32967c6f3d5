use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::models::ChannelConfig;
use crate::db::enums::ChannelType;

pub mod bot_webhook;
pub mod telegram;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Delivers one rendered message through one channel.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// `config` is the decrypted configuration of the recipient's channel.
    async fn send(&self, config: &ChannelConfig, message: &str) -> Result<(), SenderError>;
}

pub type SenderRegistry = HashMap<ChannelType, Arc<dyn NotificationSender>>;

/// One sender per supported channel, sharing an HTTP client with `timeout`.
pub fn default_senders(timeout: Duration) -> Result<SenderRegistry, SenderError> {
    let client = Client::builder().timeout(timeout).build()?;
    let mut senders: SenderRegistry = HashMap::new();
    senders.insert(
        ChannelType::Telegram,
        Arc::new(telegram::TelegramSender::with_client(client.clone())),
    );
    senders.insert(
        ChannelType::Lark,
        Arc::new(bot_webhook::BotWebhookSender::lark(client.clone())),
    );
    senders.insert(
        ChannelType::Feishu,
        Arc::new(bot_webhook::BotWebhookSender::feishu(client)),
    );
    Ok(senders)
}
