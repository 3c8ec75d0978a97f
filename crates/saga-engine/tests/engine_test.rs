//! End-to-end engine behavior: workflow dispatch through a worker, retry
//! policies, non-retryable short-circuits, and workflow-ID deduplication.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use saga_engine::{
    Activity, ActivityOptions, ApplicationError, ClientError, RetryPolicy, SagaClient, SagaEngine,
    StartWorkflowOptions, Worker, Workflow, WorkflowContext, WorkflowError,
};

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
struct FlakyError {
    message: String,
    error_type: &'static str,
    non_retryable: bool,
}

impl From<FlakyError> for ApplicationError {
    fn from(err: FlakyError) -> Self {
        let app = ApplicationError::new(err.error_type, err.message.clone());
        if err.non_retryable {
            ApplicationError {
                non_retryable: true,
                ..app
            }
        } else {
            app
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EchoInput {
    text: String,
}

/// Succeeds after a configurable number of failed attempts.
struct FlakyEcho {
    calls: Arc<AtomicU32>,
    failures_before_success: u32,
    error_type: &'static str,
    non_retryable: bool,
    delay: Duration,
}

#[async_trait]
impl Activity for FlakyEcho {
    const TYPE_ID: &'static str = "flaky-echo";

    type Input = EchoInput;
    type Output = String;
    type Error = FlakyError;

    async fn execute(&self, input: Self::Input) -> Result<Self::Output, Self::Error> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_success {
            return Err(FlakyError {
                message: format!("attempt {call} failed"),
                error_type: self.error_type,
                non_retryable: self.non_retryable,
            });
        }
        Ok(input.text)
    }
}

struct EchoWorkflow {
    options: ActivityOptions,
}

#[async_trait]
impl Workflow for EchoWorkflow {
    const TYPE_ID: &'static str = "echo-workflow";

    type Input = EchoInput;
    type Output = String;

    async fn run(
        &self,
        ctx: &WorkflowContext,
        input: Self::Input,
    ) -> Result<Self::Output, WorkflowError> {
        let output = ctx
            .execute_activity::<FlakyEcho>(input, &self.options)
            .await?;
        Ok(output)
    }
}

fn fast_options(max_attempts: u32, non_retryable_types: &[&str]) -> ActivityOptions {
    ActivityOptions::default()
        .with_schedule_to_close(Duration::from_secs(5))
        .with_start_to_close(Duration::from_millis(200))
        .with_retry_policy(
            RetryPolicy::default()
                .with_initial_interval(Duration::from_millis(5))
                .with_maximum_interval(Duration::from_millis(20))
                .with_maximum_attempts(max_attempts)
                .with_non_retryable_error_types(non_retryable_types.iter().copied()),
        )
}

async fn start_worker(
    engine: &Arc<SagaEngine>,
    queue: &str,
    activity: FlakyEcho,
    options: ActivityOptions,
) -> saga_engine::WorkerHandle {
    let worker = Worker::new(Arc::clone(engine), queue);
    worker.register_workflow(EchoWorkflow { options });
    worker.register_activity(activity);
    let mut handle = worker.start();
    handle.ready().await;
    handle
}

#[tokio::test]
async fn workflow_completes_through_worker() {
    let engine = Arc::new(SagaEngine::new());
    let calls = Arc::new(AtomicU32::new(0));
    let activity = FlakyEcho {
        calls: Arc::clone(&calls),
        failures_before_success: 0,
        error_type: "Transient",
        non_retryable: false,
        delay: Duration::ZERO,
    };
    let handle = start_worker(&engine, "q1", activity, fast_options(3, &[])).await;

    let client = SagaClient::new(Arc::clone(&engine));
    let wf = client
        .start_workflow::<EchoWorkflow>(
            StartWorkflowOptions {
                workflow_id: "wf-echo".to_string(),
                task_queue: "q1".to_string(),
            },
            EchoInput {
                text: "hello".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(wf.result().await.unwrap(), "hello");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!engine.is_running("wf-echo"));

    handle.shutdown().await;
}

#[tokio::test]
async fn retryable_failures_are_retried_until_success() {
    let engine = Arc::new(SagaEngine::new());
    let calls = Arc::new(AtomicU32::new(0));
    let activity = FlakyEcho {
        calls: Arc::clone(&calls),
        failures_before_success: 2,
        error_type: "Transient",
        non_retryable: false,
        delay: Duration::ZERO,
    };
    let handle = start_worker(&engine, "q2", activity, fast_options(5, &[])).await;

    let wf = SagaClient::new(Arc::clone(&engine))
        .start_workflow::<EchoWorkflow>(
            StartWorkflowOptions {
                workflow_id: "wf-retry".to_string(),
                task_queue: "q2".to_string(),
            },
            EchoInput {
                text: "eventually".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(wf.result().await.unwrap(), "eventually");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    handle.shutdown().await;
}

#[tokio::test]
async fn attempt_cap_is_enforced() {
    let engine = Arc::new(SagaEngine::new());
    let calls = Arc::new(AtomicU32::new(0));
    let activity = FlakyEcho {
        calls: Arc::clone(&calls),
        failures_before_success: u32::MAX,
        error_type: "Transient",
        non_retryable: false,
        delay: Duration::ZERO,
    };
    let handle = start_worker(&engine, "q3", activity, fast_options(3, &[])).await;

    let wf = SagaClient::new(Arc::clone(&engine))
        .start_workflow::<EchoWorkflow>(
            StartWorkflowOptions {
                workflow_id: "wf-cap".to_string(),
                task_queue: "q3".to_string(),
            },
            EchoInput {
                text: "never".to_string(),
            },
        )
        .await
        .unwrap();

    let err = wf.result().await.unwrap_err();
    assert_eq!(err.error_type(), Some("Transient"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    handle.shutdown().await;
}

#[tokio::test]
async fn non_retryable_flag_short_circuits() {
    let engine = Arc::new(SagaEngine::new());
    let calls = Arc::new(AtomicU32::new(0));
    let activity = FlakyEcho {
        calls: Arc::clone(&calls),
        failures_before_success: u32::MAX,
        error_type: "UserIsBlocked",
        non_retryable: true,
        delay: Duration::ZERO,
    };
    let handle = start_worker(&engine, "q4", activity, fast_options(5, &[])).await;

    let wf = SagaClient::new(Arc::clone(&engine))
        .start_workflow::<EchoWorkflow>(
            StartWorkflowOptions {
                workflow_id: "wf-nonretry".to_string(),
                task_queue: "q4".to_string(),
            },
            EchoInput {
                text: "blocked".to_string(),
            },
        )
        .await
        .unwrap();

    let err = wf.result().await.unwrap_err();
    assert_eq!(err.error_type(), Some("UserIsBlocked"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn policy_listed_error_types_are_not_retried() {
    let engine = Arc::new(SagaEngine::new());
    let calls = Arc::new(AtomicU32::new(0));
    // Retryable from the activity's point of view, but listed in the policy.
    let activity = FlakyEcho {
        calls: Arc::clone(&calls),
        failures_before_success: u32::MAX,
        error_type: "CompensationCompleted",
        non_retryable: false,
        delay: Duration::ZERO,
    };
    let handle = start_worker(
        &engine,
        "q5",
        activity,
        fast_options(5, &["CompensationCompleted"]),
    )
    .await;

    let wf = SagaClient::new(Arc::clone(&engine))
        .start_workflow::<EchoWorkflow>(
            StartWorkflowOptions {
                workflow_id: "wf-listed".to_string(),
                task_queue: "q5".to_string(),
            },
            EchoInput {
                text: "listed".to_string(),
            },
        )
        .await
        .unwrap();

    let err = wf.result().await.unwrap_err();
    assert_eq!(err.error_type(), Some("CompensationCompleted"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn duplicate_workflow_ids_are_rejected_while_running() {
    let engine = Arc::new(SagaEngine::new());
    let calls = Arc::new(AtomicU32::new(0));
    let activity = FlakyEcho {
        calls: Arc::clone(&calls),
        failures_before_success: 0,
        error_type: "Transient",
        non_retryable: false,
        delay: Duration::from_millis(100),
    };
    let handle = start_worker(&engine, "q6", activity, fast_options(3, &[])).await;

    let client = SagaClient::new(Arc::clone(&engine));
    let options = StartWorkflowOptions {
        workflow_id: "wf-dedup".to_string(),
        task_queue: "q6".to_string(),
    };
    let input = EchoInput {
        text: "first".to_string(),
    };

    let first = client
        .start_workflow::<EchoWorkflow>(options.clone(), input.clone())
        .await
        .unwrap();

    let second = client
        .start_workflow::<EchoWorkflow>(options.clone(), input.clone())
        .await;
    assert!(matches!(
        second,
        Err(ClientError::WorkflowAlreadyStarted(id)) if id == "wf-dedup"
    ));

    assert_eq!(first.result().await.unwrap(), "first");

    // The ID is reusable once the first execution completed.
    let third = client
        .start_workflow::<EchoWorkflow>(options, input)
        .await
        .unwrap();
    assert_eq!(third.result().await.unwrap(), "first");

    handle.shutdown().await;
}

#[tokio::test]
async fn start_without_worker_fails() {
    let engine = Arc::new(SagaEngine::new());
    let err = SagaClient::new(Arc::clone(&engine))
        .start_workflow::<EchoWorkflow>(
            StartWorkflowOptions {
                workflow_id: "wf-nowhere".to_string(),
                task_queue: "no-such-queue".to_string(),
            },
            EchoInput {
                text: "x".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::TaskQueue(_)));
    // A failed start must not leak the ID claim.
    assert!(!engine.is_running("wf-nowhere"));
}
