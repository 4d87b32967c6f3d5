use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::events::{EventPublisher, StatusChangeEvent};
use super::state_machine::{can_transition, is_cancelable};
use crate::db::entities::timelock_transaction::Model;
use crate::db::enums::{TimelockStandard, TransactionStatus};
use crate::db::models::{
    CreateTransactionRequest, NewTransaction, PaginatedTransactions, TransactionDetail,
    TransactionListQuery, TransactionPatch, TransactionStats,
};
use crate::db::services::TransactionStore;
use crate::error::AppError;
use crate::services::clock::Clock;
use crate::services::contract_mirror::ContractMirror;
use crate::services::permission_service::PermissionService;
use crate::services::validation::{
    normalize_address, normalize_call_data, normalize_operation_id, normalize_tx_hash,
    validate_value,
};

const MAX_PAGE_SIZE: u64 = 100;

/// Guards and applies every status change of a timelock transaction.
///
/// Each write is conditional on the status the guard observed, so a writer
/// racing another one on the same row loses with `InvalidStateTransition`
/// instead of overwriting it.
#[derive(Clone)]
pub struct TimelockService {
    store: TransactionStore,
    permissions: PermissionService,
    mirror: Arc<dyn ContractMirror>,
    events: EventPublisher,
    clock: Arc<dyn Clock>,
}

impl TimelockService {
    pub fn new(
        store: TransactionStore,
        mirror: Arc<dyn ContractMirror>,
        events: EventPublisher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            permissions: PermissionService::new(mirror.clone()),
            mirror,
            events,
            clock,
        }
    }

    async fn load(&self, id: i32) -> Result<Model, AppError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {id} not found")))
    }

    async fn load_by_hash(&self, tx_hash: &str) -> Result<Model, AppError> {
        let tx_hash = normalize_tx_hash(tx_hash)?;
        self.store
            .find_by_hash(&tx_hash)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {tx_hash} not found")))
    }

    /// Conditional write of `tx.status -> to`; publishes the change on success.
    async fn apply(
        &self,
        mut tx: Model,
        to: TransactionStatus,
        mut patch: TransactionPatch,
        chain_tx_hash: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Model, AppError> {
        let from = tx.status;
        patch.status = Some(to);
        let new_hash = patch.tx_hash.clone();
        let error_message = patch.error_message.clone();
        let execution_tx_hash = patch.execution_tx_hash.clone();

        if !self.store.transition(tx.id, from, patch, now).await? {
            return Err(AppError::invalid_transition(
                from,
                to,
                "transaction status changed concurrently",
            ));
        }

        tx.status = to;
        tx.updated_at = now;
        if let Some(hash) = new_hash {
            tx.tx_hash = hash;
        }
        if let Some(message) = error_message {
            tx.error_message = message;
        }
        if execution_tx_hash.is_some() {
            tx.execution_tx_hash = execution_tx_hash;
        }
        match to {
            TransactionStatus::Queued => tx.queued_at = Some(now),
            TransactionStatus::Executing => tx.execution_attempted_at = Some(now),
            TransactionStatus::Executed => tx.executed_at = Some(now),
            TransactionStatus::Canceled => tx.canceled_at = Some(now),
            _ => {}
        }

        info!(tx_id = tx.id, tx_hash = %tx.tx_hash, from = %from, to = %to, "Transaction status changed.");
        self.events.publish(StatusChangeEvent::for_transaction(
            &tx,
            Some(from),
            to,
            chain_tx_hash,
        ));
        Ok(tx)
    }

    pub async fn create_transaction(
        &self,
        user: &str,
        request: CreateTransactionRequest,
    ) -> Result<Model, AppError> {
        let creator = normalize_address(user)?;
        let contract_address = normalize_address(&request.contract_address)?;
        let target = normalize_address(&request.target)?;
        let tx_hash = normalize_tx_hash(&request.tx_hash)?;
        let call_data = normalize_call_data(&request.call_data)?;
        let value = validate_value(&request.value)?;
        let operation_id = request
            .operation_id
            .as_deref()
            .map(normalize_operation_id)
            .transpose()?;
        let function_signature = request
            .function_signature
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let now = self.clock.now();
        if request.eta <= now.timestamp() {
            return Err(AppError::InvalidInput(format!(
                "ETA {} must be in the future (now {})",
                request.eta,
                now.timestamp()
            )));
        }

        if !self
            .permissions
            .can_propose(&creator, &contract_address, request.chain_id, request.standard)
            .await?
        {
            return Err(AppError::InsufficientPermissions(format!(
                "{creator} may not propose on {contract_address}"
            )));
        }

        let tx = self
            .store
            .create(
                NewTransaction {
                    tx_hash,
                    chain_id: request.chain_id,
                    contract_address,
                    standard: request.standard,
                    creator_address: creator,
                    target,
                    value,
                    call_data,
                    function_signature,
                    description: request.description,
                    operation_id,
                    eta: request.eta,
                },
                now,
            )
            .await?;

        info!(tx_id = tx.id, tx_hash = %tx.tx_hash, standard = %tx.standard, eta = tx.eta, "Transaction created.");
        self.events.publish(StatusChangeEvent::for_transaction(
            &tx,
            None,
            TransactionStatus::Submitting,
            None,
        ));
        Ok(tx)
    }

    pub async fn execute_transaction(&self, user: &str, id: i32) -> Result<Model, AppError> {
        let user = normalize_address(user)?;
        let tx = self.load(id).await?;
        let now = self.clock.now();
        let to = TransactionStatus::Executing;

        match tx.status {
            TransactionStatus::Ready => {
                if tx.eta > now.timestamp() {
                    return Err(AppError::invalid_transition(tx.status, to, "ETA not reached"));
                }
                if tx
                    .standard
                    .grace_period_seconds()
                    .is_some_and(|grace| now.timestamp() > tx.eta + grace)
                {
                    return Err(AppError::invalid_transition(
                        tx.status,
                        to,
                        "grace period elapsed",
                    ));
                }
            }
            TransactionStatus::Failed => {}
            from => {
                return Err(AppError::invalid_transition(
                    from,
                    to,
                    "only ready or failed transactions can be executed",
                ));
            }
        }

        let permissions = self
            .permissions
            .resolve(
                &user,
                &tx.contract_address,
                tx.chain_id,
                tx.standard,
                Some(tx.creator_address.as_str()),
            )
            .await?;
        if !permissions.can_execute {
            return Err(AppError::InsufficientPermissions(format!(
                "{user} may not execute transaction {id}"
            )));
        }

        self.apply(tx, to, TransactionPatch::default(), None, now)
            .await
    }

    pub async fn cancel_transaction(&self, user: &str, id: i32) -> Result<Model, AppError> {
        let user = normalize_address(user)?;
        let tx = self.load(id).await?;
        let to = TransactionStatus::Canceled;

        if !is_cancelable(tx.status) {
            return Err(AppError::invalid_transition(
                tx.status,
                to,
                "transaction can no longer be canceled",
            ));
        }

        let permissions = self
            .permissions
            .resolve(
                &user,
                &tx.contract_address,
                tx.chain_id,
                tx.standard,
                Some(tx.creator_address.as_str()),
            )
            .await?;
        if !permissions.can_cancel {
            return Err(AppError::InsufficientPermissions(format!(
                "{user} may not cancel transaction {id}"
            )));
        }

        let now = self.clock.now();
        self.apply(tx, to, TransactionPatch::default(), None, now)
            .await
    }

    /// Resubmits a transaction whose submission failed under a new hash.
    /// The ETA is kept.
    pub async fn retry_submit(
        &self,
        user: &str,
        id: i32,
        new_tx_hash: &str,
    ) -> Result<Model, AppError> {
        let user = normalize_address(user)?;
        let new_tx_hash = normalize_tx_hash(new_tx_hash)?;
        let tx = self.load(id).await?;
        let to = TransactionStatus::Submitting;

        if tx.status != TransactionStatus::SubmitFailed {
            return Err(AppError::invalid_transition(
                tx.status,
                to,
                "only submit_failed transactions can be resubmitted",
            ));
        }

        let permissions = self
            .permissions
            .resolve(
                &user,
                &tx.contract_address,
                tx.chain_id,
                tx.standard,
                Some(tx.creator_address.as_str()),
            )
            .await?;
        if !permissions.can_retry_submit {
            return Err(AppError::InsufficientPermissions(format!(
                "{user} may not resubmit transaction {id}"
            )));
        }

        if self.store.find_by_hash(&new_tx_hash).await?.is_some() {
            return Err(AppError::AlreadyExists(format!(
                "Transaction hash {new_tx_hash} already exists"
            )));
        }

        let patch = TransactionPatch {
            tx_hash: Some(new_tx_hash),
            error_message: Some(None),
            ..Default::default()
        };
        let now = self.clock.now();
        self.apply(tx, to, patch, None, now).await
    }

    /// Listener callback: the execute call reverted or was dropped.
    pub async fn mark_failed(
        &self,
        tx_hash: &str,
        error_message: &str,
        chain_tx_hash: Option<String>,
    ) -> Result<Model, AppError> {
        let chain_tx_hash = chain_tx_hash
            .as_deref()
            .map(normalize_tx_hash)
            .transpose()?;
        let tx = self.load_by_hash(tx_hash).await?;
        let to = TransactionStatus::Failed;
        if tx.status != TransactionStatus::Executing {
            return Err(AppError::invalid_transition(
                tx.status,
                to,
                "only executing transactions can fail",
            ));
        }
        let patch = TransactionPatch {
            error_message: Some(Some(error_message.to_string())),
            execution_tx_hash: chain_tx_hash.clone(),
            ..Default::default()
        };
        let now = self.clock.now();
        self.apply(tx, to, patch, chain_tx_hash, now).await
    }

    /// Listener callback: the queue call never landed on chain.
    pub async fn mark_submit_failed(
        &self,
        tx_hash: &str,
        error_message: &str,
    ) -> Result<Model, AppError> {
        let tx = self.load_by_hash(tx_hash).await?;
        let to = TransactionStatus::SubmitFailed;
        if tx.status != TransactionStatus::Submitting {
            return Err(AppError::invalid_transition(
                tx.status,
                to,
                "only submitting transactions can fail submission",
            ));
        }
        let patch = TransactionPatch {
            error_message: Some(Some(error_message.to_string())),
            ..Default::default()
        };
        let now = self.clock.now();
        self.apply(tx, to, patch, None, now).await
    }

    /// Listener callback: applies a chain-confirmed status.
    ///
    /// `chain_tx_hash` is the hash of the confirming chain transaction; for
    /// `executed` it is stored as the execution hash.
    pub async fn update_status_by_hash(
        &self,
        tx_hash: &str,
        status: TransactionStatus,
        chain_tx_hash: Option<String>,
    ) -> Result<Model, AppError> {
        let tx = self.load_by_hash(tx_hash).await?;
        if !can_transition(tx.status, status, tx.standard) {
            return Err(AppError::invalid_transition(
                tx.status,
                status,
                format!("not a valid {} transition", tx.standard),
            ));
        }

        let chain_tx_hash = chain_tx_hash
            .as_deref()
            .map(normalize_tx_hash)
            .transpose()?;
        let patch = TransactionPatch {
            execution_tx_hash: chain_tx_hash
                .clone()
                .filter(|_| status == TransactionStatus::Executed),
            ..Default::default()
        };
        let now = self.clock.now();
        self.apply(tx, status, patch, chain_tx_hash, now).await
    }

    pub async fn find_by_operation_id(
        &self,
        chain_id: i32,
        contract_address: &str,
        operation_id: &str,
    ) -> Result<Option<Model>, AppError> {
        let contract_address = normalize_address(contract_address)?;
        let operation_id = normalize_operation_id(operation_id)?;
        self.store
            .find_by_operation_id(chain_id, &contract_address, &operation_id)
            .await
    }

    pub async fn find_by_call(
        &self,
        chain_id: i32,
        contract_address: &str,
        target: &str,
        value: &str,
        function_signature: Option<&str>,
        eta: i64,
    ) -> Result<Option<Model>, AppError> {
        let contract_address = normalize_address(contract_address)?;
        let target = normalize_address(target)?;
        let value = validate_value(value)?;
        let function_signature = function_signature
            .map(str::trim)
            .filter(|s| !s.is_empty());
        self.store
            .find_by_call(
                chain_id,
                &contract_address,
                &target,
                &value,
                function_signature,
                eta,
            )
            .await
    }

    pub async fn list_transactions(
        &self,
        user: &str,
        query: TransactionListQuery,
    ) -> Result<PaginatedTransactions, AppError> {
        let user = normalize_address(user)?;
        let query = TransactionListQuery {
            page: query.page.max(1),
            page_size: query.page_size.clamp(1, MAX_PAGE_SIZE),
            ..query
        };
        let authorized = self.mirror.authorized_contracts(&user).await?;
        let (items, total) = self.store.list_visible(&user, &authorized, &query).await?;
        Ok(PaginatedTransactions {
            items,
            total,
            page: query.page,
            page_size: query.page_size,
        })
    }

    pub async fn get_transaction_detail(
        &self,
        user: &str,
        id: i32,
    ) -> Result<TransactionDetail, AppError> {
        let user = normalize_address(user)?;
        let tx = self.load(id).await?;
        let (_, permissions) = self
            .permissions
            .resolve_with_contract(
                &user,
                &tx.contract_address,
                tx.chain_id,
                tx.standard,
                Some(tx.creator_address.as_str()),
            )
            .await?;
        if permissions.labels.is_empty() {
            return Err(AppError::Unauthorized(format!(
                "{user} has no role on transaction {id}"
            )));
        }
        Ok(TransactionDetail {
            transaction: tx,
            can_execute: permissions.can_execute,
            can_cancel: permissions.can_cancel,
            can_retry_submit: permissions.can_retry_submit,
            permissions: permissions.labels,
        })
    }

    /// Unfinished transactions visible to `user`, soonest ETA first.
    ///
    /// With `executable_only`, keeps those the user could execute right now:
    /// ready with the ETA reached, or failed.
    pub async fn list_pending(
        &self,
        user: &str,
        executable_only: bool,
    ) -> Result<Vec<Model>, AppError> {
        let user = normalize_address(user)?;
        let authorized = self.mirror.authorized_contracts(&user).await?;
        let pending = self.store.list_pending(&user, &authorized).await?;
        if !executable_only {
            return Ok(pending);
        }

        let now = self.clock.now().timestamp();
        let mut can_execute: HashMap<(i32, String, TimelockStandard), bool> = HashMap::new();
        let mut executable = Vec::new();
        for tx in pending {
            let due = match tx.status {
                TransactionStatus::Ready => tx.eta <= now,
                TransactionStatus::Failed => true,
                _ => false,
            };
            if !due {
                continue;
            }
            let key = (tx.chain_id, tx.contract_address.clone(), tx.standard);
            let allowed = match can_execute.get(&key) {
                Some(allowed) => *allowed,
                None => {
                    let allowed = self
                        .permissions
                        .resolve(&user, &tx.contract_address, tx.chain_id, tx.standard, None)
                        .await?
                        .can_execute;
                    can_execute.insert(key, allowed);
                    allowed
                }
            };
            if allowed {
                executable.push(tx);
            }
        }
        Ok(executable)
    }

    /// Status counts of the transactions `user` created.
    pub async fn get_user_stats(&self, user: &str) -> Result<TransactionStats, AppError> {
        let user = normalize_address(user)?;
        self.store.stats_for_creator(&user).await
    }

    pub async fn get_contract_stats(
        &self,
        chain_id: i32,
        contract_address: &str,
        standard: TimelockStandard,
    ) -> Result<TransactionStats, AppError> {
        let contract_address = normalize_address(contract_address)?;
        if self
            .mirror
            .find(standard, chain_id, &contract_address)
            .await?
            .is_none()
        {
            warn!(contract = %contract_address, chain_id, "Stats requested for unknown timelock.");
            return Err(AppError::TimelockNotFound(format!(
                "{standard} timelock {contract_address} on chain {chain_id}"
            )));
        }
        self.store
            .stats_for_contract(chain_id, &contract_address, standard)
            .await
    }
}
