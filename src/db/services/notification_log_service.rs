use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;

use crate::db::entities::notification_log;
use crate::db::enums::{ChannelType, TransactionStatus};
use crate::error::AppError;

/// Dedup key of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryKey {
    pub channel: ChannelType,
    pub user_address: String,
    pub config_id: i32,
    pub flow_id: String,
    pub status_to: TransactionStatus,
}

#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub status_from: Option<TransactionStatus>,
    pub tx_hash: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Clone)]
pub struct NotificationLogService {
    db: Arc<DatabaseConnection>,
}

impl NotificationLogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn exists(&self, key: &DeliveryKey) -> Result<bool, AppError> {
        let count = notification_log::Entity::find()
            .filter(notification_log::Column::Channel.eq(key.channel))
            .filter(notification_log::Column::UserAddress.eq(key.user_address.as_str()))
            .filter(notification_log::Column::ConfigId.eq(key.config_id))
            .filter(notification_log::Column::FlowId.eq(key.flow_id.as_str()))
            .filter(notification_log::Column::StatusTo.eq(key.status_to))
            .count(&*self.db)
            .await?;
        Ok(count > 0)
    }

    pub async fn record(
        &self,
        key: &DeliveryKey,
        outcome: DeliveryOutcome,
        now: DateTime<Utc>,
    ) -> Result<notification_log::Model, AppError> {
        let model = notification_log::ActiveModel {
            channel: Set(key.channel),
            user_address: Set(key.user_address.clone()),
            config_id: Set(key.config_id),
            flow_id: Set(key.flow_id.clone()),
            status_from: Set(outcome.status_from),
            status_to: Set(key.status_to),
            tx_hash: Set(outcome.tx_hash),
            success: Set(outcome.error_message.is_none()),
            error_message: Set(outcome.error_message),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        Ok(model)
    }

    pub async fn logs_for_flow(&self, flow_id: &str) -> Result<Vec<notification_log::Model>, AppError> {
        Ok(notification_log::Entity::find()
            .filter(notification_log::Column::FlowId.eq(flow_id))
            .order_by_asc(notification_log::Column::Id)
            .all(&*self.db)
            .await?)
    }
}
