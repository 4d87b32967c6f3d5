//! Read-only view of the on-chain role snapshot kept by the chain listener.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::db::enums::TimelockStandard;
use crate::db::models::AuthorizedContract;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRoles {
    pub creator: String,
    pub admin: String,
    pub pending_admin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleSets {
    pub creator: String,
    pub proposers: HashSet<String>,
    pub executors: HashSet<String>,
    pub cancellers: HashSet<String>,
}

/// Mirror record of one timelock contract, shaped by its standard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorRecord {
    Compound(AdminRoles),
    OpenZeppelin(RoleSets),
}

impl MirrorRecord {
    pub fn creator(&self) -> &str {
        match self {
            MirrorRecord::Compound(roles) => &roles.creator,
            MirrorRecord::OpenZeppelin(roles) => &roles.creator,
        }
    }

    /// Every address with some relationship to the contract.
    pub fn related_addresses(&self) -> HashSet<String> {
        let mut addresses = HashSet::new();
        if !self.creator().is_empty() {
            addresses.insert(self.creator().to_string());
        }
        match self {
            MirrorRecord::Compound(roles) => {
                if !roles.admin.is_empty() {
                    addresses.insert(roles.admin.clone());
                }
                if let Some(pending) = &roles.pending_admin {
                    addresses.insert(pending.clone());
                }
            }
            MirrorRecord::OpenZeppelin(roles) => {
                addresses.extend(roles.proposers.iter().cloned());
                addresses.extend(roles.executors.iter().cloned());
                addresses.extend(roles.cancellers.iter().cloned());
            }
        }
        addresses
    }
}

/// Splits a serialized address list into a normalized set.
///
/// Accepts comma, whitespace or JSON-array style separators and drops blanks.
pub fn parse_address_set(serialized: &str) -> HashSet<String> {
    serialized
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|part| part.trim_matches(|c: char| c == '[' || c == ']' || c == '"' || c == '\''))
        .filter(|part| !part.is_empty())
        .map(normalize_loose)
        .collect()
}

/// Lowercases an address read from the mirror without rejecting it.
pub fn normalize_loose(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

#[async_trait]
pub trait ContractMirror: Send + Sync {
    /// Latest mirror record for a contract, or `None` if the listener has not seen it.
    async fn find(
        &self,
        standard: TimelockStandard,
        chain_id: i32,
        contract_address: &str,
    ) -> Result<Option<MirrorRecord>, AppError>;

    /// Contracts of both standards on which `user` holds any role.
    async fn authorized_contracts(&self, user: &str) -> Result<Vec<AuthorizedContract>, AppError>;
}

#[async_trait]
pub trait RecipientResolver: Send + Sync {
    async fn recipients_for(
        &self,
        standard: TimelockStandard,
        chain_id: i32,
        contract_address: &str,
    ) -> Result<HashSet<String>, AppError>;
}

/// Answers recipient lookups from the mirror records themselves.
pub struct MirrorRecipientResolver {
    mirror: Arc<dyn ContractMirror>,
}

impl MirrorRecipientResolver {
    pub fn new(mirror: Arc<dyn ContractMirror>) -> Self {
        Self { mirror }
    }
}

#[async_trait]
impl RecipientResolver for MirrorRecipientResolver {
    async fn recipients_for(
        &self,
        standard: TimelockStandard,
        chain_id: i32,
        contract_address: &str,
    ) -> Result<HashSet<String>, AppError> {
        Ok(self
            .mirror
            .find(standard, chain_id, contract_address)
            .await?
            .map(|record| record.related_addresses())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_lists_are_normalized_into_sets() {
        let set = parse_address_set(" 0xAAA,0xbbb , ,0xaaa");
        assert_eq!(set.len(), 2);
        assert!(set.contains("0xaaa"));
        assert!(set.contains("0xbbb"));
    }

    #[test]
    fn json_style_lists_are_accepted() {
        let set = parse_address_set(r#"["0xAbc", "0xDef"]"#);
        assert!(set.contains("0xabc"));
        assert!(set.contains("0xdef"));
        assert!(parse_address_set("").is_empty());
    }

    #[test]
    fn related_addresses_cover_every_role() {
        let record = MirrorRecord::OpenZeppelin(RoleSets {
            creator: "0xc".to_string(),
            proposers: parse_address_set("0xp"),
            executors: parse_address_set("0xe,0xp"),
            cancellers: parse_address_set("0xx"),
        });
        let related = record.related_addresses();
        assert_eq!(related.len(), 4);

        let compound = MirrorRecord::Compound(AdminRoles {
            creator: "0xc".to_string(),
            admin: "0xa".to_string(),
            pending_admin: Some("0xpa".to_string()),
        });
        assert_eq!(compound.related_addresses().len(), 3);
    }
}
