use thiserror::Error;

use crate::db::enums::TransactionStatus;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Timelock contract not found: {0}")]
    TimelockNotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: TransactionStatus,
        to: TransactionStatus,
        reason: String,
    },
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),
}

impl AppError {
    pub fn invalid_transition(
        from: TransactionStatus,
        to: TransactionStatus,
        reason: impl Into<String>,
    ) -> Self {
        AppError::InvalidStateTransition {
            from,
            to,
            reason: reason.into(),
        }
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::UpstreamFailure(format!("Database error: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::UpstreamFailure(format!("JSON serialization/deserialization error: {err}"))
    }
}

impl From<crate::notifications::encryption::EncryptionError> for AppError {
    fn from(err: crate::notifications::encryption::EncryptionError) -> Self {
        AppError::UpstreamFailure(err.to_string())
    }
}
