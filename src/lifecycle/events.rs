use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::db::entities::timelock_transaction;
use crate::db::enums::{TimelockStandard, TransactionStatus};

/// A completed status transition, as seen by the notification dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeEvent {
    pub transaction_id: i32,
    pub standard: TimelockStandard,
    pub chain_id: i32,
    pub contract_address: String,
    pub flow_id: String,
    pub from_status: Option<TransactionStatus>,
    pub to_status: TransactionStatus,
    pub tx_hash: Option<String>,
}

/// `{standard}:{chain_id}:{tx_hash}`; a new submission hash starts a new flow.
pub fn flow_id(standard: TimelockStandard, chain_id: i32, tx_hash: &str) -> String {
    format!("{standard}:{chain_id}:{tx_hash}")
}

impl StatusChangeEvent {
    /// Event for `tx` having moved from `from` to its current status.
    ///
    /// `chain_tx_hash` is the hash reported by the listener for this step; the
    /// submission hash is used when none is given.
    pub fn for_transaction(
        tx: &timelock_transaction::Model,
        from: Option<TransactionStatus>,
        to: TransactionStatus,
        chain_tx_hash: Option<String>,
    ) -> Self {
        Self {
            transaction_id: tx.id,
            standard: tx.standard,
            chain_id: tx.chain_id,
            contract_address: tx.contract_address.clone(),
            flow_id: flow_id(tx.standard, tx.chain_id, &tx.tx_hash),
            from_status: from,
            to_status: to,
            tx_hash: chain_tx_hash.or_else(|| Some(tx.tx_hash.clone())),
        }
    }
}

/// Sending half of the transition feed. Publishing never blocks and never
/// fails the caller.
#[derive(Clone)]
pub struct EventPublisher {
    sender: mpsc::UnboundedSender<StatusChangeEvent>,
}

impl EventPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusChangeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: tx }, rx)
    }

    pub fn publish(&self, event: StatusChangeEvent) {
        if let Err(e) = self.sender.send(event) {
            warn!(
                flow_id = %e.0.flow_id,
                to_status = %e.0.to_status,
                "Notification dispatcher is gone, status change not published."
            );
        }
    }
}
