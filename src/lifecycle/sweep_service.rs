use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::events::{EventPublisher, StatusChangeEvent};
use super::state_machine::can_transition;
use crate::db::entities::timelock_transaction::Model;
use crate::db::enums::{COMPOUND_GRACE_PERIOD_SECONDS, TransactionStatus};
use crate::db::models::TransactionPatch;
use crate::db::services::TransactionStore;
use crate::error::AppError;
use crate::services::clock::Clock;

/// Per-run counts of a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

async fn sweep_transition(
    store: &TransactionStore,
    events: &EventPublisher,
    mut tx: Model,
    to: TransactionStatus,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let from = tx.status;
    if !store
        .transition(tx.id, from, TransactionPatch::status(to), now)
        .await?
    {
        return Ok(false);
    }
    tx.status = to;
    tx.updated_at = now;
    events.publish(StatusChangeEvent::for_transaction(&tx, Some(from), to, None));
    Ok(true)
}

/// Promotes every queued transaction whose ETA has arrived to `ready`.
pub async fn ready_sweep(
    store: &TransactionStore,
    events: &EventPublisher,
    now: DateTime<Utc>,
) -> Result<SweepReport, AppError> {
    let candidates = store.find_ready_candidates(now).await?;
    let mut report = SweepReport {
        examined: candidates.len(),
        ..Default::default()
    };

    for tx in candidates {
        let tx_id = tx.id;
        if tx.status != TransactionStatus::Queued || tx.eta > now.timestamp() {
            warn!(tx_id, status = %tx.status, eta = tx.eta, "Ready candidate no longer due, skipping.");
            report.skipped += 1;
            continue;
        }
        match sweep_transition(store, events, tx, TransactionStatus::Ready, now).await {
            Ok(true) => report.applied += 1,
            Ok(false) => {
                info!(tx_id, "Transaction left queued before the ready sweep wrote it, skipping.");
                report.skipped += 1;
            }
            Err(e) => {
                error!(tx_id, error = %e, "Ready sweep failed for transaction.");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Moves admin-based transactions left waiting past `ETA + grace period` to
/// `expired`. Each candidate is re-read and re-checked before the write.
pub async fn expiry_sweep(
    store: &TransactionStore,
    events: &EventPublisher,
    now: DateTime<Utc>,
) -> Result<SweepReport, AppError> {
    let candidates = store.find_expiry_candidates(now).await?;
    let mut report = SweepReport {
        examined: candidates.len(),
        ..Default::default()
    };

    for candidate in candidates {
        let tx_id = candidate.id;
        let current = match store.find_by_id(tx_id).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                warn!(tx_id, "Expiry candidate disappeared, skipping.");
                report.skipped += 1;
                continue;
            }
            Err(e) => {
                error!(tx_id, error = %e, "Failed to re-read expiry candidate.");
                report.failed += 1;
                continue;
            }
        };

        let Some(grace) = current.standard.grace_period_seconds() else {
            warn!(tx_id, standard = %current.standard, "Expiry candidate is not admin-based, skipping.");
            report.skipped += 1;
            continue;
        };
        if !can_transition(current.status, TransactionStatus::Expired, current.standard)
            || current.eta + grace >= now.timestamp()
        {
            warn!(tx_id, status = %current.status, eta = current.eta, "Expiry candidate failed re-validation, skipping.");
            report.skipped += 1;
            continue;
        }

        match sweep_transition(store, events, current, TransactionStatus::Expired, now).await {
            Ok(true) => report.applied += 1,
            Ok(false) => {
                info!(tx_id, "Transaction changed before the expiry sweep wrote it, skipping.");
                report.skipped += 1;
            }
            Err(e) => {
                error!(tx_id, error = %e, "Expiry sweep failed for transaction.");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Periodic driver for the two sweeps.
pub struct SweepService {
    store: TransactionStore,
    events: EventPublisher,
    clock: Arc<dyn Clock>,
}

impl SweepService {
    pub fn new(store: TransactionStore, events: EventPublisher, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            events,
            clock,
        }
    }

    pub async fn run_ready_sweep(&self) -> Result<SweepReport, AppError> {
        ready_sweep(&self.store, &self.events, self.clock.now()).await
    }

    pub async fn run_expiry_sweep(&self) -> Result<SweepReport, AppError> {
        expiry_sweep(&self.store, &self.events, self.clock.now()).await
    }

    pub async fn start_ready_sweeps(self: Arc<Self>, period_seconds: u64) {
        info!(period_seconds, "Ready sweep started.");
        let mut ticker = interval(Duration::from_secs(period_seconds.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.run_ready_sweep().await {
                Ok(report) if report.examined > 0 => info!(?report, "Ready sweep finished."),
                Ok(_) => debug!("Ready sweep found nothing due."),
                Err(e) => error!(error = %e, "Ready sweep failed."),
            }
        }
    }

    pub async fn start_expiry_sweeps(self: Arc<Self>, period_seconds: u64) {
        info!(
            period_seconds,
            grace_period_seconds = COMPOUND_GRACE_PERIOD_SECONDS,
            "Expiry sweep started."
        );
        let mut ticker = interval(Duration::from_secs(period_seconds.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.run_expiry_sweep().await {
                Ok(report) if report.examined > 0 => info!(?report, "Expiry sweep finished."),
                Ok(_) => debug!("Expiry sweep found nothing to expire."),
                Err(e) => error!(error = %e, "Expiry sweep failed."),
            }
        }
    }
}
