use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::entities::timelock_transaction;
use crate::db::enums::{TimelockStandard, TransactionStatus};
use crate::services::permission_service::PermissionLabel;

/// Request body for proposing a new timelocked call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    pub chain_id: i32,
    pub contract_address: String,
    pub standard: TimelockStandard,
    pub tx_hash: String,
    pub target: String,
    pub value: String,
    pub call_data: String,
    pub function_signature: Option<String>,
    #[serde(default)]
    pub description: String,
    pub eta: i64,
    pub operation_id: Option<String>,
}

/// A validated transaction ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub tx_hash: String,
    pub chain_id: i32,
    pub contract_address: String,
    pub standard: TimelockStandard,
    pub creator_address: String,
    pub target: String,
    pub value: String,
    pub call_data: String,
    pub function_signature: Option<String>,
    pub description: String,
    pub operation_id: Option<String>,
    pub eta: i64,
}

/// Fields a status write may carry besides the status itself.
///
/// ETA and creator are write-once and have no field here.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub tx_hash: Option<String>,
    pub status: Option<TransactionStatus>,
    pub error_message: Option<Option<String>>,
    pub execution_tx_hash: Option<String>,
}

impl TransactionPatch {
    pub fn status(status: TransactionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    pub chain_id: Option<i32>,
    pub standard: Option<TimelockStandard>,
    pub status: Option<TransactionStatus>,
}

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    20
}

impl Default for TransactionListQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
            chain_id: None,
            standard: None,
            status: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedTransactions {
    pub items: Vec<timelock_transaction::Model>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// Transaction detail together with what the caller may do with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    pub transaction: timelock_transaction::Model,
    pub permissions: Vec<PermissionLabel>,
    pub can_execute: bool,
    pub can_cancel: bool,
    pub can_retry_submit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStats {
    pub total: u64,
    pub by_status: BTreeMap<TransactionStatus, u64>,
}

impl TransactionStats {
    pub fn from_counts(counts: Vec<(TransactionStatus, i64)>) -> Self {
        let mut stats = TransactionStats::default();
        for (status, count) in counts {
            let count = count.max(0) as u64;
            stats.total += count;
            *stats.by_status.entry(status).or_insert(0) += count;
        }
        stats
    }

    pub fn count(&self, status: TransactionStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// The (contract, chain, standard) triple a user holds some role on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedContract {
    pub chain_id: i32,
    pub contract_address: String,
    pub standard: TimelockStandard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_sum_counts_per_status() {
        let stats = TransactionStats::from_counts(vec![
            (TransactionStatus::Queued, 3),
            (TransactionStatus::Executed, 2),
        ]);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.count(TransactionStatus::Queued), 3);
        assert_eq!(stats.count(TransactionStatus::Canceled), 0);
    }
}
