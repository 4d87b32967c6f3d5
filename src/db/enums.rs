use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Execution window after ETA for admin-based timelocks (Compound `GRACE_PERIOD`).
pub const COMPOUND_GRACE_PERIOD_SECONDS: i64 = 14 * 24 * 60 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// The two governance standards a timelock contract can follow.
///
/// `Compound` is the admin-based model (single admin, optional pending admin),
/// `OpenZeppelin` is the role-based model (proposer/executor/canceller sets).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum TimelockStandard {
    #[sea_orm(string_value = "compound")]
    Compound,
    #[sea_orm(string_value = "openzeppelin")]
    OpenZeppelin,
}

impl TimelockStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelockStandard::Compound => "compound",
            TimelockStandard::OpenZeppelin => "openzeppelin",
        }
    }

    /// Role-based timelocks never expire, so only the admin-based standard has one.
    pub fn grace_period_seconds(&self) -> Option<i64> {
        match self {
            TimelockStandard::Compound => Some(COMPOUND_GRACE_PERIOD_SECONDS),
            TimelockStandard::OpenZeppelin => None,
        }
    }
}

impl fmt::Display for TimelockStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimelockStandard {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compound" => Ok(TimelockStandard::Compound),
            "openzeppelin" => Ok(TimelockStandard::OpenZeppelin),
            _ => Err(ParseEnumError::new("timelock standard", s)),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "submitting")]
    Submitting,
    #[sea_orm(string_value = "queued")]
    Queued,
    #[sea_orm(string_value = "ready")]
    Ready,
    #[sea_orm(string_value = "executing")]
    Executing,
    #[sea_orm(string_value = "executed")]
    Executed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "submit_failed")]
    SubmitFailed,
    #[sea_orm(string_value = "canceled")]
    Canceled,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl TransactionStatus {
    /// Statuses shown in the pending view.
    pub const PENDING: [TransactionStatus; 6] = [
        TransactionStatus::Submitting,
        TransactionStatus::Queued,
        TransactionStatus::Ready,
        TransactionStatus::Executing,
        TransactionStatus::Failed,
        TransactionStatus::SubmitFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Submitting => "submitting",
            TransactionStatus::Queued => "queued",
            TransactionStatus::Ready => "ready",
            TransactionStatus::Executing => "executing",
            TransactionStatus::Executed => "executed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::SubmitFailed => "submit_failed",
            TransactionStatus::Canceled => "canceled",
            TransactionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitting" => Ok(TransactionStatus::Submitting),
            "queued" => Ok(TransactionStatus::Queued),
            "ready" => Ok(TransactionStatus::Ready),
            "executing" => Ok(TransactionStatus::Executing),
            "executed" => Ok(TransactionStatus::Executed),
            "failed" => Ok(TransactionStatus::Failed),
            "submit_failed" => Ok(TransactionStatus::SubmitFailed),
            "canceled" => Ok(TransactionStatus::Canceled),
            "expired" => Ok(TransactionStatus::Expired),
            _ => Err(ParseEnumError::new("transaction status", s)),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    #[sea_orm(string_value = "telegram")]
    Telegram,
    #[sea_orm(string_value = "lark")]
    Lark,
    #[sea_orm(string_value = "feishu")]
    Feishu,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Telegram => "telegram",
            ChannelType::Lark => "lark",
            ChannelType::Feishu => "feishu",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
