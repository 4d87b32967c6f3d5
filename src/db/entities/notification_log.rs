use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{ChannelType, TransactionStatus};

/// One delivery attempt. Rows are never updated; the
/// (channel, user_address, config_id, flow_id, status_to) tuple is the dedup key.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub channel: ChannelType,
    pub user_address: String,
    pub config_id: i32,
    pub flow_id: String,
    pub status_from: Option<TransactionStatus>,
    pub status_to: TransactionStatus,
    pub tx_hash: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
