use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{TimelockStandard, TransactionStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "timelock_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub tx_hash: String,
    pub chain_id: i32,
    pub contract_address: String,
    pub standard: TimelockStandard,
    pub creator_address: String,
    pub target: String,
    pub value: String, // wei, decimal string
    pub call_data: String,
    pub function_signature: Option<String>,
    pub description: String,
    pub operation_id: Option<String>, // role-based timelocks only
    pub eta: i64,                    // unix seconds, write-once
    pub status: TransactionStatus,
    pub error_message: Option<String>,
    pub execution_tx_hash: Option<String>,
    pub queued_at: Option<ChronoDateTimeUtc>,
    pub execution_attempted_at: Option<ChronoDateTimeUtc>,
    pub executed_at: Option<ChronoDateTimeUtc>,
    pub canceled_at: Option<ChronoDateTimeUtc>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
