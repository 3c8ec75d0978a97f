//! Registration saga: create the email-uniqueness record, then the user row.
//! If the user step fails, the email record is deleted again so a failed
//! registration leaves nothing behind.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use saga_engine::{
    Activity, ActivityError, ActivityOptions, ApplicationError, Workflow, WorkflowContext,
    WorkflowError,
};

use crate::activities::UserActivities;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserInput {
    pub user_id: i64,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEmailInput {
    pub user_id: i64,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteEmailInput {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteUserInput {
    pub user_id: i64,
}

pub struct CreateEmailRecord {
    activities: Arc<dyn UserActivities>,
}

impl CreateEmailRecord {
    pub fn new(activities: Arc<dyn UserActivities>) -> Self {
        Self { activities }
    }
}

#[async_trait]
impl Activity for CreateEmailRecord {
    const TYPE_ID: &'static str = "create-email-record";

    type Input = CreateEmailInput;
    type Output = ();
    type Error = AppError;

    async fn execute(&self, input: Self::Input) -> Result<(), AppError> {
        self.activities
            .create_email_record(input.user_id, &input.email)
            .await
    }
}

pub struct CreateUserRecord {
    activities: Arc<dyn UserActivities>,
}

impl CreateUserRecord {
    pub fn new(activities: Arc<dyn UserActivities>) -> Self {
        Self { activities }
    }
}

#[async_trait]
impl Activity for CreateUserRecord {
    const TYPE_ID: &'static str = "create-user-record";

    type Input = CreateUserInput;
    type Output = ();
    type Error = AppError;

    async fn execute(&self, input: Self::Input) -> Result<(), AppError> {
        self.activities
            .create_user_record(input.user_id, &input.phone, &input.email)
            .await
    }
}

pub struct DeleteEmailRecordIfPresent {
    activities: Arc<dyn UserActivities>,
}

impl DeleteEmailRecordIfPresent {
    pub fn new(activities: Arc<dyn UserActivities>) -> Self {
        Self { activities }
    }
}

#[async_trait]
impl Activity for DeleteEmailRecordIfPresent {
    const TYPE_ID: &'static str = "delete-email-record";

    type Input = DeleteEmailInput;
    type Output = ();
    type Error = AppError;

    async fn execute(&self, input: Self::Input) -> Result<(), AppError> {
        self.activities
            .delete_email_record_if_present(&input.email)
            .await
    }
}

pub struct DeleteUserRecordIfPresent {
    activities: Arc<dyn UserActivities>,
}

impl DeleteUserRecordIfPresent {
    pub fn new(activities: Arc<dyn UserActivities>) -> Self {
        Self { activities }
    }
}

#[async_trait]
impl Activity for DeleteUserRecordIfPresent {
    const TYPE_ID: &'static str = "delete-user-record";

    type Input = DeleteUserInput;
    type Output = ();
    type Error = AppError;

    async fn execute(&self, input: Self::Input) -> Result<(), AppError> {
        self.activities
            .delete_user_record_if_present(input.user_id)
            .await
    }
}

/// Steps of the registration saga that have a compensation. The numeric
/// value is how many completed steps must be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreateUserStep {
    NoCompensations = 0,
    EmailCreated = 1,
}

pub struct CreateUserWorkflow {
    options: ActivityOptions,
}

impl CreateUserWorkflow {
    pub fn new(options: ActivityOptions) -> Self {
        Self { options }
    }

    /// Undo every completed step, newest first, then report the original
    /// cause as a non-retryable `CompensationCompleted`.
    async fn compensate(
        &self,
        ctx: &WorkflowContext,
        completed: CreateUserStep,
        cause: ActivityError,
        input: &CreateUserInput,
    ) -> WorkflowError {
        tracing::warn!(
            workflow_id = %ctx.workflow_id(),
            error = %cause,
            "create-user saga failed, compensating"
        );

        for step in (1..=completed as u8).rev() {
            let result = match step {
                1 => {
                    ctx.execute_activity::<DeleteEmailRecordIfPresent>(
                        DeleteEmailInput {
                            email: input.email.clone(),
                        },
                        &self.options,
                    )
                    .await
                }
                _ => Ok(()),
            };
            if let Err(err) = result {
                tracing::error!(
                    workflow_id = %ctx.workflow_id(),
                    step,
                    error = %err,
                    "compensation step failed"
                );
                return err.into();
            }
        }

        ApplicationError::non_retryable(AppError::COMPENSATION_COMPLETED, cause.to_string()).into()
    }
}

#[async_trait]
impl Workflow for CreateUserWorkflow {
    const TYPE_ID: &'static str = "create-user";

    type Input = CreateUserInput;
    type Output = i64;

    async fn run(
        &self,
        ctx: &WorkflowContext,
        input: Self::Input,
    ) -> Result<Self::Output, WorkflowError> {
        tracing::debug!(workflow_id = %ctx.workflow_id(), "create-user workflow started");

        if let Err(err) = ctx
            .execute_activity::<CreateEmailRecord>(
                CreateEmailInput {
                    user_id: input.user_id,
                    email: input.email.clone(),
                },
                &self.options,
            )
            .await
        {
            return Err(self
                .compensate(ctx, CreateUserStep::NoCompensations, err, &input)
                .await);
        }

        if let Err(err) = ctx
            .execute_activity::<CreateUserRecord>(input.clone(), &self.options)
            .await
        {
            return Err(self
                .compensate(ctx, CreateUserStep::EmailCreated, err, &input)
                .await);
        }

        tracing::debug!(workflow_id = %ctx.workflow_id(), "create-user workflow completed");
        Ok(input.user_id)
    }
}
