use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, sea_query::Expr,
};
use std::sync::Arc;

use crate::db::entities::timelock_transaction::{self, Column, Entity, Model};
use crate::db::enums::{COMPOUND_GRACE_PERIOD_SECONDS, TimelockStandard, TransactionStatus};
use crate::db::models::{
    AuthorizedContract, NewTransaction, TransactionListQuery, TransactionPatch, TransactionStats,
};
use crate::error::AppError;

/// Durable record of timelock transactions.
///
/// Writes overwrite the targeted columns without business validation; callers
/// that need compare-and-set semantics pass an expected status to
/// [`update_fields`](Self::update_fields).
#[derive(Clone)]
pub struct TransactionStore {
    db: Arc<DatabaseConnection>,
}

/// Timing column stamped when a transaction enters `status`.
fn timestamp_column(status: TransactionStatus) -> Option<Column> {
    match status {
        TransactionStatus::Queued => Some(Column::QueuedAt),
        TransactionStatus::Executing => Some(Column::ExecutionAttemptedAt),
        TransactionStatus::Executed => Some(Column::ExecutedAt),
        TransactionStatus::Canceled => Some(Column::CanceledAt),
        _ => None,
    }
}

fn map_write_error(err: DbErr, tx_hash: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::AlreadyExists(format!("Transaction hash {tx_hash} already exists"))
        }
        _ => err.into(),
    }
}

/// Transactions created by `user` or living on a contract where `user` holds a role.
pub fn ownership_condition(user: &str, authorized: &[AuthorizedContract]) -> Condition {
    authorized.iter().fold(
        Condition::any().add(Column::CreatorAddress.eq(user)),
        |cond, contract| {
            cond.add(
                Condition::all()
                    .add(Column::ContractAddress.eq(contract.contract_address.as_str()))
                    .add(Column::ChainId.eq(contract.chain_id))
                    .add(Column::Standard.eq(contract.standard)),
            )
        },
    )
}

impl TransactionStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        new: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Model, AppError> {
        if self.find_by_hash(&new.tx_hash).await?.is_some() {
            return Err(AppError::AlreadyExists(format!(
                "Transaction hash {} already exists",
                new.tx_hash
            )));
        }

        let tx_hash = new.tx_hash.clone();
        let active_model = timelock_transaction::ActiveModel {
            tx_hash: Set(new.tx_hash),
            chain_id: Set(new.chain_id),
            contract_address: Set(new.contract_address),
            standard: Set(new.standard),
            creator_address: Set(new.creator_address),
            target: Set(new.target),
            value: Set(new.value),
            call_data: Set(new.call_data),
            function_signature: Set(new.function_signature),
            description: Set(new.description),
            operation_id: Set(new.operation_id),
            eta: Set(new.eta),
            status: Set(TransactionStatus::Submitting),
            error_message: Set(None),
            execution_tx_hash: Set(None),
            queued_at: Set(None),
            execution_attempted_at: Set(None),
            executed_at: Set(None),
            canceled_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        active_model
            .insert(&*self.db)
            .await
            .map_err(|e| map_write_error(e, &tx_hash))
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<Model>, AppError> {
        Ok(Entity::find_by_id(id).one(&*self.db).await?)
    }

    pub async fn find_by_hash(&self, tx_hash: &str) -> Result<Option<Model>, AppError> {
        Ok(Entity::find()
            .filter(Column::TxHash.eq(tx_hash))
            .one(&*self.db)
            .await?)
    }

    /// Applies `patch` to one row, stamping the timing column of the new status.
    ///
    /// With `expected_status` set, the write only happens if the row still has
    /// that status. Returns whether a row was changed.
    pub async fn update_fields(
        &self,
        id: i32,
        patch: TransactionPatch,
        expected_status: Option<TransactionStatus>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut update = Entity::update_many()
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id));

        if let Some(expected) = expected_status {
            update = update.filter(Column::Status.eq(expected));
        }
        if let Some(status) = patch.status {
            update = update.col_expr(Column::Status, Expr::value(status));
            if let Some(column) = timestamp_column(status) {
                update = update.col_expr(column, Expr::value(Some(now)));
            }
        }
        if let Some(error_message) = patch.error_message {
            update = update.col_expr(Column::ErrorMessage, Expr::value(error_message));
        }
        if let Some(execution_tx_hash) = patch.execution_tx_hash {
            update = update.col_expr(Column::ExecutionTxHash, Expr::value(Some(execution_tx_hash)));
        }

        let new_hash = patch.tx_hash.clone();
        if let Some(tx_hash) = patch.tx_hash {
            update = update.col_expr(Column::TxHash, Expr::value(tx_hash));
        }

        let result = update
            .exec(&*self.db)
            .await
            .map_err(|e| map_write_error(e, new_hash.as_deref().unwrap_or_default()))?;
        Ok(result.rows_affected > 0)
    }

    /// Unconditional status overwrite.
    pub async fn update_status(
        &self,
        id: i32,
        status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if self
            .update_fields(id, TransactionPatch::status(status), None, now)
            .await?
        {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Transaction {id} not found")))
        }
    }

    /// Compare-and-set status write: `from` must still be the stored status.
    pub async fn transition(
        &self,
        id: i32,
        from: TransactionStatus,
        patch: TransactionPatch,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.update_fields(id, patch, Some(from), now).await
    }

    pub async fn list_visible(
        &self,
        user: &str,
        authorized: &[AuthorizedContract],
        query: &TransactionListQuery,
    ) -> Result<(Vec<Model>, u64), AppError> {
        let mut select = Entity::find().filter(ownership_condition(user, authorized));
        if let Some(chain_id) = query.chain_id {
            select = select.filter(Column::ChainId.eq(chain_id));
        }
        if let Some(standard) = query.standard {
            select = select.filter(Column::Standard.eq(standard));
        }
        if let Some(status) = query.status {
            select = select.filter(Column::Status.eq(status));
        }

        let paginator = select
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .paginate(&*self.db, query.page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(query.page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    /// Non-terminal transactions visible to `user`, soonest ETA first.
    pub async fn list_pending(
        &self,
        user: &str,
        authorized: &[AuthorizedContract],
    ) -> Result<Vec<Model>, AppError> {
        Ok(Entity::find()
            .filter(ownership_condition(user, authorized))
            .filter(Column::Status.is_in(TransactionStatus::PENDING))
            .order_by_asc(Column::Eta)
            .order_by_asc(Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Queued transactions whose ETA has arrived.
    pub async fn find_ready_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Model>, AppError> {
        Ok(Entity::find()
            .filter(Column::Status.eq(TransactionStatus::Queued))
            .filter(Column::Eta.lte(now.timestamp()))
            .order_by_asc(Column::Eta)
            .all(&*self.db)
            .await?)
    }

    /// Admin-based transactions still waiting past `ETA + grace period`.
    pub async fn find_expiry_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Model>, AppError> {
        Ok(Entity::find()
            .filter(Column::Standard.eq(TimelockStandard::Compound))
            .filter(Column::Status.is_in([TransactionStatus::Queued, TransactionStatus::Ready]))
            .filter(Column::Eta.lt(now.timestamp() - COMPOUND_GRACE_PERIOD_SECONDS))
            .order_by_asc(Column::Eta)
            .all(&*self.db)
            .await?)
    }

    pub async fn find_by_operation_id(
        &self,
        chain_id: i32,
        contract_address: &str,
        operation_id: &str,
    ) -> Result<Option<Model>, AppError> {
        Ok(Entity::find()
            .filter(Column::ChainId.eq(chain_id))
            .filter(Column::ContractAddress.eq(contract_address))
            .filter(Column::OperationId.eq(operation_id))
            .order_by_desc(Column::Id)
            .one(&*self.db)
            .await?)
    }

    /// Lookup for standards without a stable operation id: the call tuple
    /// (target, value, signature, ETA) identifies the queued call.
    pub async fn find_by_call(
        &self,
        chain_id: i32,
        contract_address: &str,
        target: &str,
        value: &str,
        function_signature: Option<&str>,
        eta: i64,
    ) -> Result<Option<Model>, AppError> {
        let signature_condition = match function_signature {
            Some(signature) => Column::FunctionSignature.eq(signature),
            None => Column::FunctionSignature.is_null(),
        };
        Ok(Entity::find()
            .filter(Column::ChainId.eq(chain_id))
            .filter(Column::ContractAddress.eq(contract_address))
            .filter(Column::Target.eq(target))
            .filter(Column::Value.eq(value))
            .filter(signature_condition)
            .filter(Column::Eta.eq(eta))
            .order_by_desc(Column::Id)
            .one(&*self.db)
            .await?)
    }

    async fn status_counts(&self, condition: Condition) -> Result<TransactionStats, AppError> {
        let counts = Entity::find()
            .select_only()
            .column(Column::Status)
            .column_as(Column::Id.count(), "count")
            .filter(condition)
            .group_by(Column::Status)
            .into_tuple::<(TransactionStatus, i64)>()
            .all(&*self.db)
            .await?;
        Ok(TransactionStats::from_counts(counts))
    }

    pub async fn stats_for_creator(&self, creator: &str) -> Result<TransactionStats, AppError> {
        self.status_counts(Condition::all().add(Column::CreatorAddress.eq(creator)))
            .await
    }

    pub async fn stats_for_contract(
        &self,
        chain_id: i32,
        contract_address: &str,
        standard: TimelockStandard,
    ) -> Result<TransactionStats, AppError> {
        self.status_counts(
            Condition::all()
                .add(Column::ChainId.eq(chain_id))
                .add(Column::ContractAddress.eq(contract_address))
                .add(Column::Standard.eq(standard)),
        )
        .await
    }
}
