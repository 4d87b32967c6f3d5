use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::enums::TimelockStandard;
use crate::error::AppError;
use crate::services::contract_mirror::{ContractMirror, MirrorRecord};

/// Roles a user holds on a contract, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLabel {
    Creator,
    Admin,
    PendingAdmin,
    Proposer,
    Executor,
    Canceller,
}

/// Resolved permissions of one user for one contract (and optionally one transaction).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSet {
    pub labels: Vec<PermissionLabel>,
    pub can_propose: bool,
    pub can_execute: bool,
    pub can_cancel: bool,
    pub can_retry_submit: bool,
}

/// Computes the permission set for `user`.
///
/// `tx_creator` is the creator of the transaction being acted on, if any; it
/// grants cancel and retry-submit on top of the contract roles. Without a
/// mirror record every predicate is false.
pub fn resolve_permissions(
    record: Option<&MirrorRecord>,
    user: &str,
    tx_creator: Option<&str>,
) -> PermissionSet {
    let Some(record) = record else {
        return PermissionSet::default();
    };

    let is_creator = tx_creator.is_some_and(|creator| creator.eq_ignore_ascii_case(user));
    let mut set = PermissionSet::default();
    if is_creator {
        set.labels.push(PermissionLabel::Creator);
    }

    match record {
        MirrorRecord::Compound(roles) => {
            let is_admin = roles.admin.eq_ignore_ascii_case(user);
            if is_admin {
                set.labels.push(PermissionLabel::Admin);
            }
            if roles
                .pending_admin
                .as_deref()
                .is_some_and(|pending| pending.eq_ignore_ascii_case(user))
            {
                set.labels.push(PermissionLabel::PendingAdmin);
            }
            set.can_propose = is_admin;
            set.can_execute = is_admin;
            set.can_cancel = is_admin;
        }
        MirrorRecord::OpenZeppelin(roles) => {
            let user = user.to_ascii_lowercase();
            set.can_propose = roles.proposers.contains(&user);
            set.can_execute = roles.executors.contains(&user);
            set.can_cancel = roles.cancellers.contains(&user);
            if set.can_propose {
                set.labels.push(PermissionLabel::Proposer);
            }
            if set.can_execute {
                set.labels.push(PermissionLabel::Executor);
            }
            if set.can_cancel {
                set.labels.push(PermissionLabel::Canceller);
            }
        }
    }

    set.can_cancel |= is_creator;
    set.can_retry_submit = is_creator || set.can_propose;
    set
}

#[derive(Clone)]
pub struct PermissionService {
    mirror: Arc<dyn ContractMirror>,
}

impl PermissionService {
    pub fn new(mirror: Arc<dyn ContractMirror>) -> Self {
        Self { mirror }
    }

    /// Fail-closed resolution: a missing mirror record yields no permissions.
    pub async fn resolve(
        &self,
        user: &str,
        contract_address: &str,
        chain_id: i32,
        standard: TimelockStandard,
        tx_creator: Option<&str>,
    ) -> Result<PermissionSet, AppError> {
        let record = self.mirror.find(standard, chain_id, contract_address).await?;
        Ok(resolve_permissions(record.as_ref(), user, tx_creator))
    }

    /// Like [`resolve`](Self::resolve), but reports a missing mirror record as
    /// `TimelockNotFound` for callers that need the contract itself.
    pub async fn resolve_with_contract(
        &self,
        user: &str,
        contract_address: &str,
        chain_id: i32,
        standard: TimelockStandard,
        tx_creator: Option<&str>,
    ) -> Result<(MirrorRecord, PermissionSet), AppError> {
        let record = self
            .mirror
            .find(standard, chain_id, contract_address)
            .await?
            .ok_or_else(|| {
                AppError::TimelockNotFound(format!(
                    "{standard} timelock {contract_address} on chain {chain_id}"
                ))
            })?;
        let set = resolve_permissions(Some(&record), user, tx_creator);
        Ok((record, set))
    }

    pub async fn can_propose(
        &self,
        user: &str,
        contract_address: &str,
        chain_id: i32,
        standard: TimelockStandard,
    ) -> Result<bool, AppError> {
        Ok(self
            .resolve(user, contract_address, chain_id, standard, None)
            .await?
            .can_propose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::contract_mirror::{AdminRoles, RoleSets, parse_address_set};

    const ADMIN: &str = "0x00000000000000000000000000000000000000aa";
    const PENDING: &str = "0x00000000000000000000000000000000000000bb";
    const OTHER: &str = "0x00000000000000000000000000000000000000cc";

    fn compound() -> MirrorRecord {
        MirrorRecord::Compound(AdminRoles {
            creator: OTHER.to_string(),
            admin: ADMIN.to_string(),
            pending_admin: Some(PENDING.to_string()),
        })
    }

    fn openzeppelin() -> MirrorRecord {
        MirrorRecord::OpenZeppelin(RoleSets {
            creator: ADMIN.to_string(),
            proposers: parse_address_set("0x01,0x02"),
            executors: parse_address_set("0x02"),
            cancellers: parse_address_set("0x03"),
        })
    }

    #[test]
    fn compound_admin_holds_every_right() {
        let set = resolve_permissions(
            Some(&compound()),
            "0x00000000000000000000000000000000000000AA",
            None,
        );
        assert!(set.can_propose && set.can_execute && set.can_cancel && set.can_retry_submit);
        assert_eq!(set.labels, vec![PermissionLabel::Admin]);
    }

    #[test]
    fn pending_admin_is_informational_only() {
        let set = resolve_permissions(Some(&compound()), PENDING, None);
        assert_eq!(set.labels, vec![PermissionLabel::PendingAdmin]);
        assert!(!set.can_propose && !set.can_execute && !set.can_cancel);
    }

    #[test]
    fn creator_may_always_cancel_and_retry() {
        let set = resolve_permissions(Some(&compound()), OTHER, Some(OTHER));
        assert_eq!(set.labels, vec![PermissionLabel::Creator]);
        assert!(set.can_cancel && set.can_retry_submit);
        assert!(!set.can_execute && !set.can_propose);
    }

    #[test]
    fn openzeppelin_roles_are_independent_and_additive() {
        let record = openzeppelin();
        let proposer_executor = resolve_permissions(Some(&record), "0x02", Some("0x02"));
        assert_eq!(
            proposer_executor.labels,
            vec![
                PermissionLabel::Creator,
                PermissionLabel::Proposer,
                PermissionLabel::Executor
            ]
        );
        assert!(proposer_executor.can_cancel);

        let canceller = resolve_permissions(Some(&record), "0x03", None);
        assert!(canceller.can_cancel && !canceller.can_propose && !canceller.can_execute);

        let outsider = resolve_permissions(Some(&record), "0x99", None);
        assert_eq!(outsider, PermissionSet::default());
    }

    #[test]
    fn missing_record_fails_closed_even_for_creator() {
        let set = resolve_permissions(None, OTHER, Some(OTHER));
        assert_eq!(set, PermissionSet::default());
    }
}
