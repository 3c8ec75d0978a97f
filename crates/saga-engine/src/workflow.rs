//! # Workflows
//!
//! A [`Workflow`] is an orchestration written as plain `async` Rust. The
//! engine persists nothing about the body itself; determinism is the
//! contract that makes durable execution possible.
//!
//! ## Determinism
//!
//! Workflow bodies MUST be deterministic: no wall-clock reads, no random
//! number generation, no iteration over unordered collections, no direct
//! I/O. Every nondeterministic or side-effecting operation belongs in an
//! [`Activity`](crate::Activity) and is reached through
//! [`WorkflowContext::execute_activity`]. Identifiers that must be fresh per
//! execution (e.g. a transfer's transaction ID) are generated by the caller
//! before the workflow starts and passed in as input.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::activity::Activity;
use crate::engine::SagaEngine;
use crate::error::{ActivityError, WorkflowError};
use crate::queue::{ActivityTask, EngineTask};
use crate::retry::RetryPolicy;

/// Options governing one activity execution scheduled by a workflow.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    /// Overall deadline covering every attempt and the delays between them.
    pub schedule_to_close: Duration,
    /// Deadline for a single attempt.
    pub start_to_close: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            schedule_to_close: Duration::from_secs(10),
            start_to_close: Duration::from_secs(5),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl ActivityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedule_to_close(mut self, timeout: Duration) -> Self {
        self.schedule_to_close = timeout;
        self
    }

    pub fn with_start_to_close(mut self, timeout: Duration) -> Self {
        self.start_to_close = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

/// A workflow definition. See the module docs for the determinism contract.
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Stable identifier the engine dispatches on.
    const TYPE_ID: &'static str;

    type Input: Serialize + DeserializeOwned + Send + Clone;
    type Output: Serialize + DeserializeOwned + Send;

    async fn run(
        &self,
        ctx: &WorkflowContext,
        input: Self::Input,
    ) -> Result<Self::Output, WorkflowError>;
}

/// Type-erased workflow, as stored in the registry.
#[async_trait]
pub trait DynWorkflow: Send + Sync {
    fn type_id(&self) -> &'static str;

    async fn run_dyn(
        &self,
        ctx: &WorkflowContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, WorkflowError>;
}

#[async_trait]
impl<W: Workflow> DynWorkflow for W {
    fn type_id(&self) -> &'static str {
        W::TYPE_ID
    }

    async fn run_dyn(
        &self,
        ctx: &WorkflowContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, WorkflowError> {
        let input: W::Input = serde_json::from_value(input).map_err(|err| {
            WorkflowError::Codec(format!("invalid input for {}: {}", W::TYPE_ID, err))
        })?;

        let output = self.run(ctx, input).await?;

        serde_json::to_value(output).map_err(|err| {
            WorkflowError::Codec(format!(
                "failed to serialize output of {}: {}",
                W::TYPE_ID,
                err
            ))
        })
    }
}

/// Registry of workflows hosted by a worker.
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: DashMap<&'static str, Arc<dyn DynWorkflow>>,
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflow_count", &self.workflows.len())
            .finish()
    }
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<W: Workflow>(&self, workflow: W) {
        self.workflows.insert(W::TYPE_ID, Arc::new(workflow));
    }

    pub fn get(&self, type_id: &str) -> Option<Arc<dyn DynWorkflow>> {
        self.workflows
            .get(type_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn has(&self, type_id: &str) -> bool {
        self.workflows.contains_key(type_id)
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

/// Execution context handed to a running workflow.
///
/// The context is the only sanctioned bridge between deterministic workflow
/// code and the nondeterministic outside world.
pub struct WorkflowContext {
    engine: Arc<SagaEngine>,
    workflow_id: String,
    task_queue: String,
}

impl WorkflowContext {
    pub(crate) fn new(engine: Arc<SagaEngine>, workflow_id: String, task_queue: String) -> Self {
        Self {
            engine,
            workflow_id,
            task_queue,
        }
    }

    /// The client-supplied workflow ID of this execution.
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// The task queue this workflow (and its activities) runs on.
    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    /// Execute an activity to completion, applying the retry policy.
    ///
    /// Each attempt is bounded by `start_to_close`; the whole call, including
    /// backoff delays, by `schedule_to_close`. Retrying stops early when the
    /// failure is marked non-retryable or its type is listed in the policy.
    pub async fn execute_activity<A: Activity>(
        &self,
        input: A::Input,
        options: &ActivityOptions,
    ) -> Result<A::Output, ActivityError> {
        let input = serde_json::to_value(input).map_err(|err| ActivityError::Codec {
            activity_type: A::TYPE_ID,
            message: err.to_string(),
        })?;

        let policy = &options.retry_policy;
        let deadline = Instant::now() + options.schedule_to_close;
        let mut attempt: u32 = 1;

        loop {
            match self
                .dispatch_attempt(A::TYPE_ID, input.clone(), options.start_to_close)
                .await
            {
                Ok(value) => {
                    return serde_json::from_value(value).map_err(|err| ActivityError::Codec {
                        activity_type: A::TYPE_ID,
                        message: err.to_string(),
                    });
                }
                Err(err) => {
                    if !err.is_retryable(policy) || attempt >= policy.maximum_attempts {
                        return Err(err);
                    }
                    let delay = policy.delay_for_attempt(attempt);
                    if Instant::now() + delay >= deadline {
                        return Err(err);
                    }
                    tracing::debug!(
                        workflow_id = %self.workflow_id,
                        activity = A::TYPE_ID,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying activity"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn dispatch_attempt(
        &self,
        activity_type: &'static str,
        input: serde_json::Value,
        start_to_close: Duration,
    ) -> Result<serde_json::Value, ActivityError> {
        let (completion, receiver) = oneshot::channel();
        let task = EngineTask::Activity(ActivityTask {
            activity_type: activity_type.to_string(),
            input,
            completion,
        });
        self.engine.publish(&self.task_queue, task).await?;

        match tokio::time::timeout(start_to_close, receiver).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(ActivityError::Application(err)),
            Ok(Err(_)) => Err(ActivityError::WorkerLost { activity_type }),
            Err(_) => Err(ActivityError::Timeout {
                activity_type,
                elapsed: start_to_close,
            }),
        }
    }
}
