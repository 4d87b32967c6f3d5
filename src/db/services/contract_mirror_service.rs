use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    sea_query::{Expr, Func},
};
use std::collections::HashSet;
use std::sync::Arc;

use crate::db::entities::{compound_timelock, openzeppelin_timelock};
use crate::db::enums::TimelockStandard;
use crate::db::models::AuthorizedContract;
use crate::error::AppError;
use crate::services::contract_mirror::{
    AdminRoles, ContractMirror, MirrorRecord, RoleSets, normalize_loose, parse_address_set,
};

/// Reads the listener-maintained `compound_timelocks` / `openzeppelin_timelocks` tables.
#[derive(Clone)]
pub struct SeaOrmContractMirror {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmContractMirror {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<compound_timelock::Model> for MirrorRecord {
    fn from(model: compound_timelock::Model) -> Self {
        MirrorRecord::Compound(AdminRoles {
            creator: normalize_loose(&model.creator_address),
            admin: normalize_loose(&model.admin),
            pending_admin: model
                .pending_admin
                .as_deref()
                .map(normalize_loose)
                .filter(|pending| !pending.is_empty()),
        })
    }
}

impl From<openzeppelin_timelock::Model> for MirrorRecord {
    fn from(model: openzeppelin_timelock::Model) -> Self {
        MirrorRecord::OpenZeppelin(RoleSets {
            creator: normalize_loose(&model.creator_address),
            proposers: parse_address_set(&model.proposers),
            executors: parse_address_set(&model.executors),
            cancellers: parse_address_set(&model.cancellers),
        })
    }
}

#[async_trait]
impl ContractMirror for SeaOrmContractMirror {
    async fn find(
        &self,
        standard: TimelockStandard,
        chain_id: i32,
        contract_address: &str,
    ) -> Result<Option<MirrorRecord>, AppError> {
        let contract_address = normalize_loose(contract_address);
        let record = match standard {
            TimelockStandard::Compound => compound_timelock::Entity::find()
                .filter(compound_timelock::Column::ChainId.eq(chain_id))
                .filter(
                    Expr::expr(Func::lower(Expr::col(
                        compound_timelock::Column::ContractAddress,
                    )))
                    .eq(contract_address),
                )
                .one(&*self.db)
                .await?
                .map(MirrorRecord::from),
            TimelockStandard::OpenZeppelin => openzeppelin_timelock::Entity::find()
                .filter(openzeppelin_timelock::Column::ChainId.eq(chain_id))
                .filter(
                    Expr::expr(Func::lower(Expr::col(
                        openzeppelin_timelock::Column::ContractAddress,
                    )))
                    .eq(contract_address),
                )
                .one(&*self.db)
                .await?
                .map(MirrorRecord::from),
        };
        Ok(record)
    }

    async fn authorized_contracts(&self, user: &str) -> Result<Vec<AuthorizedContract>, AppError> {
        let user = normalize_loose(user);
        let mut contracts = HashSet::new();

        let compound_rows = compound_timelock::Entity::find()
            .filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(compound_timelock::Column::Admin)))
                            .eq(user.as_str()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(
                            compound_timelock::Column::PendingAdmin,
                        )))
                        .eq(user.as_str()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(
                            compound_timelock::Column::CreatorAddress,
                        )))
                        .eq(user.as_str()),
                    ),
            )
            .all(&*self.db)
            .await?;
        for row in compound_rows {
            contracts.insert(AuthorizedContract {
                chain_id: row.chain_id,
                contract_address: normalize_loose(&row.contract_address),
                standard: TimelockStandard::Compound,
            });
        }

        // The LIKE prefilter is coarse; membership is confirmed on the parsed sets.
        let pattern = format!("%{user}%");
        let role_rows = openzeppelin_timelock::Entity::find()
            .filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(
                            openzeppelin_timelock::Column::CreatorAddress,
                        )))
                        .eq(user.as_str()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(
                            openzeppelin_timelock::Column::Proposers,
                        )))
                        .like(pattern.as_str()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(
                            openzeppelin_timelock::Column::Executors,
                        )))
                        .like(pattern.as_str()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(
                            openzeppelin_timelock::Column::Cancellers,
                        )))
                        .like(pattern.as_str()),
                    ),
            )
            .all(&*self.db)
            .await?;
        for row in role_rows {
            let chain_id = row.chain_id;
            let contract_address = normalize_loose(&row.contract_address);
            if MirrorRecord::from(row).related_addresses().contains(&user) {
                contracts.insert(AuthorizedContract {
                    chain_id,
                    contract_address,
                    standard: TimelockStandard::OpenZeppelin,
                });
            }
        }

        Ok(contracts.into_iter().collect())
    }
}
