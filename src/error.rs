//! # Error Taxonomy
//!
//! Sentinel error kinds propagated across the activity/workflow boundary.
//! Every variant maps to a stable [`AppError::error_type`] name; the saga
//! retry policy and the orchestrator match on those names, never on messages.

use saga_engine::ApplicationError;
use thiserror::Error;

use crate::shard::ShardKind;

#[derive(Debug, Error)]
pub enum AppError {
    /// The mutation target has `is_blocked = true`.
    #[error("user is blocked")]
    UserIsBlocked,

    #[error("balance lower than transfer amount")]
    InsufficientFunds,

    #[error("amount cannot be negative")]
    NegativeAmount,

    /// A saga fully undid its prior effects; the message is the original
    /// cause, reachable through the engine's error chain.
    #[error("compensation is completed: {cause}")]
    CompensationCompleted { cause: String },

    /// Routing asked for a shard index absent from the map. A configuration
    /// bug, never worth retrying.
    #[error("{kind} shard {index} is not configured")]
    ShardNotFound { kind: ShardKind, index: u32 },

    /// SQLSTATE 23505. Money activities interpret this on the idempotence
    /// insert as a committed replay; registration activities treat it as
    /// terminal.
    #[error("unique constraint {constraint} violated")]
    UniqueViolation { constraint: String },

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("expected exactly 1 row affected, got {0}")]
    UnexpectedRowCount(u64),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("workflow failed: {0}")]
    WorkflowFailed(String),
}

impl AppError {
    pub const USER_IS_BLOCKED: &'static str = "UserIsBlocked";
    pub const INSUFFICIENT_FUNDS: &'static str = "InsufficientFunds";
    pub const NEGATIVE_AMOUNT: &'static str = "NegativeAmount";
    pub const COMPENSATION_COMPLETED: &'static str = "CompensationCompleted";
    pub const SHARD_NOT_FOUND: &'static str = "ShardNotFound";
    pub const UNIQUE_VIOLATION: &'static str = "UniqueViolation";
    pub const USER_NOT_FOUND: &'static str = "UserNotFound";

    /// Stable name used by retry policies and orchestrator-side matching.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::UserIsBlocked => Self::USER_IS_BLOCKED,
            AppError::InsufficientFunds => Self::INSUFFICIENT_FUNDS,
            AppError::NegativeAmount => Self::NEGATIVE_AMOUNT,
            AppError::CompensationCompleted { .. } => Self::COMPENSATION_COMPLETED,
            AppError::ShardNotFound { .. } => Self::SHARD_NOT_FOUND,
            AppError::UniqueViolation { .. } => Self::UNIQUE_VIOLATION,
            AppError::UserNotFound(_) => Self::USER_NOT_FOUND,
            AppError::UnexpectedRowCount(_) => "UnexpectedRowCount",
            AppError::Database(_) => "Database",
            AppError::WorkflowFailed(_) => "WorkflowFailed",
        }
    }

    /// Domain and validation failures are terminal: retrying cannot change
    /// the outcome. Infrastructure failures stay retryable.
    pub fn is_non_retryable(&self) -> bool {
        matches!(
            self,
            AppError::UserIsBlocked
                | AppError::InsufficientFunds
                | AppError::NegativeAmount
                | AppError::CompensationCompleted { .. }
                | AppError::ShardNotFound { .. }
                | AppError::UniqueViolation { .. }
        )
    }
}

impl From<AppError> for ApplicationError {
    fn from(err: AppError) -> Self {
        let app = ApplicationError::new(err.error_type(), err.to_string());
        ApplicationError {
            non_retryable: err.is_non_retryable(),
            ..app
        }
    }
}
