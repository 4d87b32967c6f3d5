use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::error;

use crate::db::entities::notification_config;
use crate::db::enums::ChannelType;
use crate::error::AppError;
use crate::notifications::encryption::EncryptionService;
use crate::notifications::models::{
    ChannelConfig, CreateNotificationConfigRequest, NotificationConfigResponse,
    UpdateNotificationConfigRequest,
};
use crate::services::validation::normalize_address;

/// Per-user channel credentials. Configs are encrypted at rest.
#[derive(Clone)]
pub struct NotificationConfigService {
    db: Arc<DatabaseConnection>,
    encryption_service: Arc<EncryptionService>,
}

impl NotificationConfigService {
    pub fn new(db: Arc<DatabaseConnection>, encryption_service: Arc<EncryptionService>) -> Self {
        Self {
            db,
            encryption_service,
        }
    }

    fn parse_config(
        channel: ChannelType,
        raw: serde_json::Value,
    ) -> Result<ChannelConfig, AppError> {
        let config: ChannelConfig = serde_json::from_value(raw)
            .map_err(|e| AppError::InvalidInput(format!("Invalid channel config: {e}")))?;
        if config.channel_type() != channel {
            return Err(AppError::InvalidInput(format!(
                "Config of type {} does not match channel {channel}",
                config.channel_type()
            )));
        }
        config.validate()?;
        Ok(config)
    }

    fn seal(&self, config: &ChannelConfig) -> Result<Vec<u8>, AppError> {
        Ok(self.encryption_service.encrypt(&serde_json::to_vec(config)?)?)
    }

    fn open(&self, model: &notification_config::Model) -> Result<ChannelConfig, AppError> {
        let plaintext = self.encryption_service.decrypt(&model.config)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn to_response(
        &self,
        model: notification_config::Model,
    ) -> Result<NotificationConfigResponse, AppError> {
        let config = self.open(&model)?;
        Ok(NotificationConfigResponse {
            id: model.id,
            channel: model.channel,
            name: model.name,
            is_active: model.is_active,
            config_params: config.masked(),
        })
    }

    async fn ensure_name_free(
        &self,
        user: &str,
        channel: ChannelType,
        name: &str,
        except_id: Option<i32>,
    ) -> Result<(), AppError> {
        let mut query = notification_config::Entity::find()
            .filter(notification_config::Column::UserAddress.eq(user))
            .filter(notification_config::Column::Channel.eq(channel))
            .filter(notification_config::Column::Name.eq(name));
        if let Some(id) = except_id {
            query = query.filter(notification_config::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(AppError::AlreadyExists(format!(
                "A {channel} config named '{name}' already exists"
            )));
        }
        Ok(())
    }

    async fn find_owned(
        &self,
        user: &str,
        config_id: i32,
    ) -> Result<notification_config::Model, AppError> {
        notification_config::Entity::find_by_id(config_id)
            .filter(notification_config::Column::UserAddress.eq(user))
            .one(&*self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification config {config_id} not found")))
    }

    pub async fn create_config(
        &self,
        user: &str,
        payload: CreateNotificationConfigRequest,
    ) -> Result<NotificationConfigResponse, AppError> {
        let user = normalize_address(user)?;
        let name = payload.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidInput("Config name must not be empty".to_string()));
        }
        let config = Self::parse_config(payload.channel, payload.config)?;
        self.ensure_name_free(&user, payload.channel, &name, None).await?;

        let now = Utc::now();
        let model = notification_config::ActiveModel {
            user_address: Set(user),
            channel: Set(payload.channel),
            name: Set(name),
            config: Set(self.seal(&config)?),
            is_active: Set(payload.is_active.unwrap_or(true)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        self.to_response(model)
    }

    pub async fn get_configs_for_user(
        &self,
        user: &str,
    ) -> Result<Vec<NotificationConfigResponse>, AppError> {
        let user = normalize_address(user)?;
        let models = notification_config::Entity::find()
            .filter(notification_config::Column::UserAddress.eq(user))
            .order_by_asc(notification_config::Column::Channel)
            .order_by_asc(notification_config::Column::Name)
            .all(&*self.db)
            .await?;
        models.into_iter().map(|m| self.to_response(m)).collect()
    }

    pub async fn get_config(
        &self,
        user: &str,
        config_id: i32,
    ) -> Result<NotificationConfigResponse, AppError> {
        let user = normalize_address(user)?;
        let model = self.find_owned(&user, config_id).await?;
        self.to_response(model)
    }

    pub async fn update_config(
        &self,
        user: &str,
        config_id: i32,
        payload: UpdateNotificationConfigRequest,
    ) -> Result<NotificationConfigResponse, AppError> {
        let user = normalize_address(user)?;
        let current = self.find_owned(&user, config_id).await?;
        let channel = current.channel;
        let mut active = current.into_active_model();

        if let Some(name) = payload.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::InvalidInput("Config name must not be empty".to_string()));
            }
            self.ensure_name_free(&user, channel, &name, Some(config_id))
                .await?;
            active.name = Set(name);
        }
        if let Some(raw) = payload.config {
            let config = Self::parse_config(channel, raw)?;
            active.config = Set(self.seal(&config)?);
        }
        if let Some(is_active) = payload.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let model = active.update(&*self.db).await?;
        self.to_response(model)
    }

    pub async fn delete_config(&self, user: &str, config_id: i32) -> Result<(), AppError> {
        let user = normalize_address(user)?;
        let result = notification_config::Entity::delete_many()
            .filter(notification_config::Column::Id.eq(config_id))
            .filter(notification_config::Column::UserAddress.eq(user))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "Notification config {config_id} not found or not owned by user"
            )));
        }
        Ok(())
    }

    /// Active configs of `user` across all channels, decrypted.
    ///
    /// A config that fails to decrypt is logged and left out.
    pub async fn active_configs_for_user(
        &self,
        user: &str,
    ) -> Result<Vec<(notification_config::Model, ChannelConfig)>, AppError> {
        let models = notification_config::Entity::find()
            .filter(notification_config::Column::UserAddress.eq(user))
            .filter(notification_config::Column::IsActive.eq(true))
            .order_by_asc(notification_config::Column::Id)
            .all(&*self.db)
            .await?;

        let mut configs = Vec::with_capacity(models.len());
        for model in models {
            match self.open(&model) {
                Ok(config) => configs.push((model, config)),
                Err(e) => {
                    error!(config_id = model.id, user = %user, error = %e, "Failed to open notification config.")
                }
            }
        }
        Ok(configs)
    }
}
