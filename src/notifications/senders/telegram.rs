use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{NotificationSender, SenderError};
use crate::notifications::models::ChannelConfig;

/// A sender for pushing notifications via the Telegram Bot API.
pub struct TelegramSender {
    client: Client,
    api_base: String,
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::with_client(Client::new())
    }
}

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

impl TelegramSender {
    pub fn with_client(client: Client) -> Self {
        Self::with_base(client, TELEGRAM_API_BASE)
    }

    /// Sender against another Bot API server, such as a self-hosted one.
    pub fn with_base(client: Client, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Escapes text for Telegram MarkdownV2.
    /// Characters to escape: _ * [ ] ( ) ~ ` > # + - = | { } . !
    fn escape_markdown_v2(text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            if matches!(
                c,
                '_' | '*'
                    | '['
                    | ']'
                    | '('
                    | ')'
                    | '~'
                    | '`'
                    | '>'
                    | '#'
                    | '+'
                    | '-'
                    | '='
                    | '|'
                    | '{'
                    | '}'
                    | '.'
                    | '!'
            ) {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, config: &ChannelConfig, message: &str) -> Result<(), SenderError> {
        let ChannelConfig::Telegram { bot_token, chat_id } = config else {
            return Err(SenderError::InvalidConfiguration(
                "Expected Telegram config, but found a different type.".to_string(),
            ));
        };

        let api_url = format!("{}/bot{bot_token}/sendMessage", self.api_base);
        let escaped_message = Self::escape_markdown_v2(message);
        let payload = TelegramMessage {
            chat_id,
            text: &escaped_message,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&api_url).json(&payload).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Telegram API returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_special_characters_are_escaped() {
        assert_eq!(
            TelegramSender::escape_markdown_v2("queued -> ready (eta 1.5h)!"),
            "queued \\-\\> ready \\(eta 1\\.5h\\)\\!"
        );
    }

    #[test]
    fn custom_base_drops_trailing_slash() {
        let sender = TelegramSender::with_base(Client::new(), "http://127.0.0.1:8081/");
        assert_eq!(sender.api_base, "http://127.0.0.1:8081");
        assert_eq!(
            TelegramSender::default().api_base,
            "https://api.telegram.org"
        );
    }

    #[tokio::test]
    async fn unreachable_api_is_a_send_error() {
        // Nothing listens on the discard port.
        let sender = TelegramSender::with_base(Client::new(), "http://127.0.0.1:9");
        let config = ChannelConfig::Telegram {
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
        };
        assert!(sender.send(&config, "hi").await.is_err());
    }

    #[tokio::test]
    async fn rejects_foreign_config() {
        let sender = TelegramSender::default();
        let config = ChannelConfig::Lark {
            webhook_url: "https://example.com/hook".to_string(),
            secret: None,
        };
        assert!(matches!(
            sender.send(&config, "hi").await,
            Err(SenderError::InvalidConfiguration(_))
        ));
    }
}
