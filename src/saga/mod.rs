//! # Saga Orchestration
//!
//! Two durable orchestrations over the user activities: registration
//! (email-then-user with compensation) and money transfer (debit-then-credit
//! with a refund compensation). Workflow bodies are deterministic; every
//! side effect goes through an activity, and fresh identifiers are generated
//! here, before a workflow starts.

mod create_user;
mod transfer_money;
mod worker;

pub use create_user::{
    CreateEmailInput, CreateEmailRecord, CreateUserInput, CreateUserRecord, CreateUserWorkflow,
    DeleteEmailInput, DeleteEmailRecordIfPresent, DeleteUserInput, DeleteUserRecordIfPresent,
};
pub use transfer_money::{
    CompensateMoney, DecreaseMoney, IncreaseMoney, TransferMoneyWorkflow,
};
pub use worker::{WorkerHost, start_workers};

use std::sync::Arc;
use std::time::Duration;

use saga_engine::{
    ActivityOptions, ClientError, RetryPolicy, SagaClient, StartWorkflowOptions, WorkflowError,
};
use uuid::Uuid;

use crate::activities::UserActivities;
use crate::error::AppError;
use crate::id;
use crate::model::TransferMoneyParams;

/// Queue hosting the registration workflow and its activities.
pub const USER_TASK_QUEUE: &str = "user-task-queue";

/// Queue hosting the transfer workflow and its activities. Kept separate so
/// a spike in transfers cannot starve registrations of activity slots.
pub const TRANSFER_TASK_QUEUE: &str = "transfer-task-queue";

/// Activity options shared by both sagas.
pub fn default_activity_options() -> ActivityOptions {
    ActivityOptions::default()
        .with_schedule_to_close(Duration::from_secs(10))
        .with_start_to_close(Duration::from_secs(5))
        .with_retry_policy(
            RetryPolicy::default()
                .with_initial_interval(Duration::from_secs(1))
                .with_backoff_coefficient(2.0)
                .with_maximum_interval(Duration::from_secs(10))
                .with_maximum_attempts(5)
                .with_non_retryable_error_types([
                    AppError::COMPENSATION_COMPLETED,
                    AppError::USER_IS_BLOCKED,
                ]),
        )
}

/// The orchestrator role: starts sagas and maps engine failures back to the
/// domain taxonomy.
pub struct UserSaga {
    client: SagaClient,
    activities: Arc<dyn UserActivities>,
}

impl UserSaga {
    pub fn new(client: SagaClient, activities: Arc<dyn UserActivities>) -> Self {
        Self { client, activities }
    }

    /// Register a user. The workflow ID `create-user-<phone>` deduplicates
    /// concurrent registrations of the same phone number at the orchestrator
    /// level; the ID is generated here from the phone-hash shard so it can
    /// be returned even though the row is written by an activity.
    pub async fn create_user(&self, phone: &str, email: &str) -> Result<i64, AppError> {
        let shard = self.activities.topology().hash_phone_number(phone);
        let user_id = id::generate_user_id(shard);

        let handle = self
            .client
            .start_workflow::<CreateUserWorkflow>(
                StartWorkflowOptions {
                    workflow_id: format!("create-user-{phone}"),
                    task_queue: USER_TASK_QUEUE.to_string(),
                },
                CreateUserInput {
                    user_id,
                    phone: phone.to_string(),
                    email: email.to_string(),
                },
            )
            .await
            .map_err(client_error)?;

        handle.result().await.map_err(workflow_error)
    }

    /// Move `amount` minor units between two users. Each transfer gets a
    /// fresh UUIDv7 that doubles as the workflow ID and the idempotency key
    /// of every money-movement activity.
    pub async fn transfer_money(
        &self,
        from_user_id: i64,
        to_user_id: i64,
        amount: i64,
    ) -> Result<(), AppError> {
        let transaction_id = Uuid::now_v7().to_string();

        let handle = self
            .client
            .start_workflow::<TransferMoneyWorkflow>(
                StartWorkflowOptions {
                    workflow_id: transaction_id.clone(),
                    task_queue: TRANSFER_TASK_QUEUE.to_string(),
                },
                TransferMoneyParams {
                    transaction_id,
                    from_user_id,
                    to_user_id,
                    amount,
                },
            )
            .await
            .map_err(client_error)?;

        handle.result().await.map_err(workflow_error)
    }
}

fn client_error(err: ClientError) -> AppError {
    AppError::WorkflowFailed(err.to_string())
}

fn workflow_error(err: WorkflowError) -> AppError {
    match err.application() {
        Some(app) if app.error_type == AppError::COMPENSATION_COMPLETED => {
            AppError::CompensationCompleted {
                cause: app.message.clone(),
            }
        }
        Some(app) if app.error_type == AppError::USER_IS_BLOCKED => AppError::UserIsBlocked,
        _ => AppError::WorkflowFailed(err.to_string()),
    }
}
