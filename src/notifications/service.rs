use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{debug, error, info, warn};

use super::models::ChainInfo;
use super::senders::SenderRegistry;
use crate::db::services::{NotificationConfigService, NotificationLogService};
use crate::db::services::notification_log_service::{DeliveryKey, DeliveryOutcome};
use crate::lifecycle::events::StatusChangeEvent;
use crate::services::contract_mirror::RecipientResolver;

/// Counts of one dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
    pub skipped_duplicate: usize,
}

/// Message body shared by every recipient and channel of one event.
pub fn render_message(event: &StatusChangeEvent, chain: Option<&ChainInfo>) -> String {
    let chain_name = chain
        .map(|c| c.display_name.clone())
        .unwrap_or_else(|| format!("Chain {}", event.chain_id));
    let from = event
        .from_status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "none".to_string());

    let mut lines = vec![
        "Timelock transaction status changed".to_string(),
        format!("Chain: {chain_name}"),
        format!("Contract: {}", event.contract_address),
        format!("Standard: {}", event.standard),
        format!("Status: {from} -> {}", event.to_status),
    ];
    if let Some(tx_hash) = &event.tx_hash {
        lines.push(format!("Tx: {tx_hash}"));
        if let Some(url) = chain.and_then(|c| c.tx_url(tx_hash)) {
            lines.push(format!("Explorer: {url}"));
        }
    }
    lines.join("\n")
}

/// Fans status changes out to every interested user's active channels.
///
/// Each (channel, user, config, flow, target status) is attempted at most
/// once; the delivery log is the dedup record and gets a row for failures too.
/// Dispatches of the same flow run one at a time, so a later event always
/// sees the log rows of an earlier one.
pub struct NotificationService {
    recipients: Arc<dyn RecipientResolver>,
    configs: NotificationConfigService,
    logs: NotificationLogService,
    senders: SenderRegistry,
    chains: HashMap<i32, ChainInfo>,
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NotificationService {
    pub fn new(
        recipients: Arc<dyn RecipientResolver>,
        configs: NotificationConfigService,
        logs: NotificationLogService,
        senders: SenderRegistry,
        chains: Vec<ChainInfo>,
    ) -> Self {
        Self {
            recipients,
            configs,
            logs,
            senders,
            chains: chains.into_iter().map(|c| (c.chain_id, c)).collect(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn render_message(&self, event: &StatusChangeEvent) -> String {
        render_message(event, self.chains.get(&event.chain_id))
    }

    pub async fn dispatch(&self, event: &StatusChangeEvent) -> DispatchReport {
        let flow_lock = self.flow_lock(&event.flow_id);
        let report = {
            let _guard = flow_lock.lock().await;
            self.dispatch_locked(event).await
        };
        self.release_flow_lock(&event.flow_id, flow_lock);
        report
    }

    fn flow_lock(&self, flow_id: &str) -> Arc<AsyncMutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            in_flight
                .entry(flow_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    // Drops the map entry once no other dispatch of the flow holds or waits on it.
    fn release_flow_lock(&self, flow_id: &str, flow_lock: Arc<AsyncMutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(&flow_lock) == 2 {
            in_flight.remove(flow_id);
        }
    }

    async fn dispatch_locked(&self, event: &StatusChangeEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        let recipients = match self
            .recipients
            .recipients_for(event.standard, event.chain_id, &event.contract_address)
            .await
        {
            Ok(set) => set,
            Err(e) => {
                error!(flow_id = %event.flow_id, error = %e, "Failed to resolve notification recipients.");
                return report;
            }
        };
        if recipients.is_empty() {
            info!(
                flow_id = %event.flow_id,
                contract = %event.contract_address,
                "No recipients for status change."
            );
            return report;
        }

        let mut recipients: Vec<String> = recipients.into_iter().collect();
        recipients.sort();
        report.recipients = recipients.len();
        let message = self.render_message(event);

        for user in &recipients {
            let configs = match self.configs.active_configs_for_user(user).await {
                Ok(configs) => configs,
                Err(e) => {
                    error!(user = %user, flow_id = %event.flow_id, error = %e, "Failed to load notification configs.");
                    continue;
                }
            };
            if configs.is_empty() {
                debug!(user = %user, "Recipient has no active channels.");
                continue;
            }

            for (model, config) in configs {
                let key = DeliveryKey {
                    channel: model.channel,
                    user_address: user.clone(),
                    config_id: model.id,
                    flow_id: event.flow_id.clone(),
                    status_to: event.to_status,
                };

                match self.logs.exists(&key).await {
                    Ok(true) => {
                        debug!(user = %user, config_id = model.id, flow_id = %event.flow_id, "Already notified, skipping.");
                        report.skipped_duplicate += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!(user = %user, config_id = model.id, error = %e, "Failed to check delivery log.");
                        report.failed += 1;
                        continue;
                    }
                }

                let result = match self.senders.get(&model.channel) {
                    Some(sender) => sender
                        .send(&config, &message)
                        .await
                        .map_err(|e| e.to_string()),
                    None => Err(format!("No sender registered for channel {}", model.channel)),
                };

                let error_message = match result {
                    Ok(()) => {
                        info!(user = %user, channel = %model.channel, flow_id = %event.flow_id, "Notification delivered.");
                        report.delivered += 1;
                        None
                    }
                    Err(e) => {
                        warn!(user = %user, channel = %model.channel, flow_id = %event.flow_id, error = %e, "Notification delivery failed.");
                        report.failed += 1;
                        Some(e)
                    }
                };

                let outcome = DeliveryOutcome {
                    status_from: event.from_status,
                    tx_hash: event.tx_hash.clone(),
                    error_message,
                };
                if let Err(e) = self.logs.record(&key, outcome, Utc::now()).await {
                    error!(user = %user, config_id = model.id, error = %e, "Failed to write delivery log.");
                }
            }
        }

        report
    }

    /// Consumes the transition feed until every publisher is dropped.
    /// Each event is dispatched in its own task; tasks of one flow queue on its lock.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<StatusChangeEvent>) {
        info!("Notification dispatcher started.");
        while let Some(event) = rx.recv().await {
            let service = Arc::clone(&self);
            tokio::spawn(async move {
                let report = service.dispatch(&event).await;
                debug!(flow_id = %event.flow_id, ?report, "Dispatch finished.");
            });
        }
        info!("Notification dispatcher stopped.");
    }
}
