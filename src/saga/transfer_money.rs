//! Transfer saga: debit the sender, credit the recipient. If the credit
//! fails, the debit is refunded with a `compensate`-typed movement that
//! shares the idempotency table, so replays of either direction stay safe.

use async_trait::async_trait;
use std::sync::Arc;

use saga_engine::{
    Activity, ActivityError, ActivityOptions, ApplicationError, Workflow, WorkflowContext,
    WorkflowError,
};

use crate::activities::UserActivities;
use crate::error::AppError;
use crate::model::{TransactionType, TransferMoneyParams};

pub struct DecreaseMoney {
    activities: Arc<dyn UserActivities>,
}

impl DecreaseMoney {
    pub fn new(activities: Arc<dyn UserActivities>) -> Self {
        Self { activities }
    }
}

#[async_trait]
impl Activity for DecreaseMoney {
    const TYPE_ID: &'static str = "decrease-money";

    type Input = TransferMoneyParams;
    type Output = ();
    type Error = AppError;

    async fn execute(&self, params: Self::Input) -> Result<(), AppError> {
        self.activities
            .decrease_money_from_user(
                &params.transaction_id,
                TransactionType::Decrease,
                params.from_user_id,
                params.to_user_id,
                params.amount,
            )
            .await
    }
}

pub struct IncreaseMoney {
    activities: Arc<dyn UserActivities>,
}

impl IncreaseMoney {
    pub fn new(activities: Arc<dyn UserActivities>) -> Self {
        Self { activities }
    }
}

#[async_trait]
impl Activity for IncreaseMoney {
    const TYPE_ID: &'static str = "increase-money";

    type Input = TransferMoneyParams;
    type Output = ();
    type Error = AppError;

    async fn execute(&self, params: Self::Input) -> Result<(), AppError> {
        self.activities
            .increase_money_to_user(
                &params.transaction_id,
                TransactionType::Increase,
                params.from_user_id,
                params.to_user_id,
                params.amount,
            )
            .await
    }
}

/// Refund the sender after a failed credit. The endpoints are swapped, so
/// the `increase` lands on the original sender's shard; the `compensate`
/// type keeps the idempotency key distinct from the committed `decrease`.
pub struct CompensateMoney {
    activities: Arc<dyn UserActivities>,
}

impl CompensateMoney {
    pub fn new(activities: Arc<dyn UserActivities>) -> Self {
        Self { activities }
    }
}

#[async_trait]
impl Activity for CompensateMoney {
    const TYPE_ID: &'static str = "compensate-money";

    type Input = TransferMoneyParams;
    type Output = ();
    type Error = AppError;

    async fn execute(&self, params: Self::Input) -> Result<(), AppError> {
        self.activities
            .increase_money_to_user(
                &params.transaction_id,
                TransactionType::Compensate,
                params.to_user_id,
                params.from_user_id,
                params.amount,
            )
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferStep {
    NoCompensations = 0,
    MoneyDebited = 1,
}

pub struct TransferMoneyWorkflow {
    options: ActivityOptions,
}

impl TransferMoneyWorkflow {
    pub fn new(options: ActivityOptions) -> Self {
        Self { options }
    }

    async fn compensate(
        &self,
        ctx: &WorkflowContext,
        completed: TransferStep,
        cause: ActivityError,
        params: &TransferMoneyParams,
    ) -> WorkflowError {
        tracing::warn!(
            workflow_id = %ctx.workflow_id(),
            error = %cause,
            "transfer saga failed, compensating"
        );

        for step in (1..=completed as u8).rev() {
            let result = match step {
                1 => {
                    ctx.execute_activity::<CompensateMoney>(params.clone(), &self.options)
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
impl Workflow for TransferMoneyWorkflow {
    const TYPE_ID: &'static str = "transfer-money";

    type Input = TransferMoneyParams;
    type Output = ();

    async fn run(
        &self,
        ctx: &WorkflowContext,
        params: Self::Input,
    ) -> Result<Self::Output, WorkflowError> {
        tracing::debug!(workflow_id = %ctx.workflow_id(), "transfer workflow started");

        if let Err(err) = ctx
            .execute_activity::<DecreaseMoney>(params.clone(), &self.options)
            .await
        {
            return Err(self
                .compensate(ctx, TransferStep::NoCompensations, err, &params)
                .await);
        }

        if let Err(err) = ctx
            .execute_activity::<IncreaseMoney>(params.clone(), &self.options)
            .await
        {
            return Err(self
                .compensate(ctx, TransferStep::MoneyDebited, err, &params)
                .await);
        }

        tracing::debug!(workflow_id = %ctx.workflow_id(), "transfer workflow completed");
        Ok(())
    }
}
