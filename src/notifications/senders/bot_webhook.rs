//! Custom-bot webhooks of Lark and Feishu. Both speak the same JSON dialect
//! and differ only in which config variant they accept.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::{NotificationSender, SenderError};
use crate::db::enums::ChannelType;
use crate::notifications::models::ChannelConfig;

type HmacSha256 = Hmac<Sha256>;

pub struct BotWebhookSender {
    client: Client,
    channel: ChannelType,
}

#[derive(Serialize)]
struct TextContent<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BotMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sign: Option<String>,
    msg_type: &'a str,
    content: TextContent<'a>,
}

#[derive(Deserialize)]
struct BotResponse {
    code: Option<i64>,
    msg: Option<String>,
}

/// `base64(HMAC-SHA256(key = "{timestamp}\n{secret}", message = ""))`.
pub fn sign(timestamp: i64, secret: &str) -> Result<String, SenderError> {
    let string_to_sign = format!("{timestamp}\n{secret}");
    let mac = HmacSha256::new_from_slice(string_to_sign.as_bytes())
        .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid signing secret: {e}")))?;
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

impl BotWebhookSender {
    pub fn lark(client: Client) -> Self {
        Self {
            client,
            channel: ChannelType::Lark,
        }
    }

    pub fn feishu(client: Client) -> Self {
        Self {
            client,
            channel: ChannelType::Feishu,
        }
    }

    fn endpoint<'a>(&self, config: &'a ChannelConfig) -> Option<(&'a str, Option<&'a str>)> {
        match (self.channel, config) {
            (ChannelType::Lark, ChannelConfig::Lark { webhook_url, secret })
            | (ChannelType::Feishu, ChannelConfig::Feishu { webhook_url, secret }) => {
                Some((webhook_url.as_str(), secret.as_deref()))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl NotificationSender for BotWebhookSender {
    async fn send(&self, config: &ChannelConfig, message: &str) -> Result<(), SenderError> {
        let (webhook_url, secret) = self.endpoint(config).ok_or_else(|| {
            SenderError::InvalidConfiguration(format!(
                "Expected {} config, but found a different type.",
                self.channel
            ))
        })?;

        let (timestamp, signature) = match secret.filter(|s| !s.is_empty()) {
            Some(secret) => {
                let now = Utc::now().timestamp();
                (Some(now.to_string()), Some(sign(now, secret)?))
            }
            None => (None, None),
        };

        let payload = BotMessage {
            timestamp,
            sign: signature,
            msg_type: "text",
            content: TextContent { text: message },
        };

        let response = self.client.post(webhook_url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "{} webhook returned non-success status: {status}. Body: {error_body}",
                self.channel
            )));
        }

        // The bot API reports rejected messages with HTTP 200 and a non-zero code.
        if let Ok(body) = response.json::<BotResponse>().await {
            if let Some(code) = body.code.filter(|code| *code != 0) {
                return Err(SenderError::SendFailed(format!(
                    "{} webhook rejected message: code {code}, {}",
                    self.channel,
                    body.msg.unwrap_or_default()
                )));
            }
        }

        Ok(())
    }
}
