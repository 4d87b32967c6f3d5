use serde::{Deserialize, Serialize};

use crate::db::enums::ChannelType;
use crate::error::AppError;

/// Credentials of one notification channel.
/// Serialized to JSON and then encrypted before being stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChannelConfig {
    Telegram {
        bot_token: String,
        chat_id: String,
    },
    Lark {
        webhook_url: String,
        secret: Option<String>,
    },
    Feishu {
        webhook_url: String,
        secret: Option<String>,
    },
}

const MASK: &str = "******";

impl ChannelConfig {
    pub fn channel_type(&self) -> ChannelType {
        match self {
            ChannelConfig::Telegram { .. } => ChannelType::Telegram,
            ChannelConfig::Lark { .. } => ChannelType::Lark,
            ChannelConfig::Feishu { .. } => ChannelType::Feishu,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            ChannelConfig::Telegram { bot_token, chat_id } => {
                if bot_token.trim().is_empty() || chat_id.trim().is_empty() {
                    return Err(AppError::InvalidInput(
                        "Telegram config requires bot_token and chat_id".to_string(),
                    ));
                }
            }
            ChannelConfig::Lark { webhook_url, .. } | ChannelConfig::Feishu { webhook_url, .. } => {
                if !(webhook_url.starts_with("https://") || webhook_url.starts_with("http://")) {
                    return Err(AppError::InvalidInput(format!(
                        "Webhook url must be http(s): {webhook_url}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Copy safe to return to the owner in listings.
    pub fn masked(&self) -> Self {
        match self {
            ChannelConfig::Telegram { chat_id, .. } => ChannelConfig::Telegram {
                bot_token: MASK.to_string(),
                chat_id: chat_id.clone(),
            },
            ChannelConfig::Lark {
                webhook_url,
                secret,
            } => ChannelConfig::Lark {
                webhook_url: mask_url(webhook_url),
                secret: secret.as_ref().map(|_| MASK.to_string()),
            },
            ChannelConfig::Feishu {
                webhook_url,
                secret,
            } => ChannelConfig::Feishu {
                webhook_url: mask_url(webhook_url),
                secret: secret.as_ref().map(|_| MASK.to_string()),
            },
        }
    }
}

/// Keeps scheme and host; the hook token lives in the path.
fn mask_url(url: &str) -> String {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            let host_end = rest.find('/').unwrap_or(rest.len());
            format!("{}{}/{MASK}", &url[..scheme_end + 3], &rest[..host_end])
        }
        None => MASK.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationConfigRequest {
    pub channel: ChannelType,
    pub name: String,
    pub config: serde_json::Value,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotificationConfigRequest {
    pub name: Option<String>,
    pub config: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

/// A notification config as shown to its owner; credentials are masked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfigResponse {
    pub id: i32,
    pub channel: ChannelType,
    pub name: String,
    pub is_active: bool,
    pub config_params: ChannelConfig,
}

/// Display data for one chain, used when rendering notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub chain_id: i32,
    pub display_name: String,
    pub explorer_url: Option<String>,
}

impl ChainInfo {
    pub fn tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_deref()
            .map(|base| format!("{}/tx/{tx_hash}", base.trim_end_matches('/')))
    }
}
