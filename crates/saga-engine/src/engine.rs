//! # SagaEngine and Client
//!
//! [`SagaEngine`] owns the process-wide engine state: the named task queues
//! workers poll, and the set of currently running workflow IDs used to
//! deduplicate starts with the same client-supplied ID. [`SagaClient`] is the
//! cheap-to-clone handle callers use to start workflows and await results.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::error::{ClientError, TaskQueueError, WorkflowError};
use crate::queue::{EngineTask, WorkflowTask};
use crate::workflow::Workflow;

/// Shared engine state. Wrap in an [`Arc`] and hand clones to workers and
/// clients.
#[derive(Default)]
pub struct SagaEngine {
    queues: DashMap<String, mpsc::Sender<EngineTask>>,
    running: DashMap<String, ()>,
}

impl SagaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register_queue(&self, name: &str, sender: mpsc::Sender<EngineTask>) {
        if self.queues.insert(name.to_string(), sender).is_some() {
            tracing::warn!(queue = name, "replacing worker registration for task queue");
        }
    }

    pub(crate) fn deregister_queue(&self, name: &str) {
        self.queues.remove(name);
    }

    pub(crate) async fn publish(&self, queue: &str, task: EngineTask) -> Result<(), TaskQueueError> {
        let sender = self
            .queues
            .get(queue)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TaskQueueError::NotFound(queue.to_string()))?;

        sender
            .send(task)
            .await
            .map_err(|_| TaskQueueError::Closed(queue.to_string()))
    }

    /// Claim a workflow ID for execution. Returns false when an execution
    /// with the same ID is already running.
    pub(crate) fn try_claim(&self, workflow_id: &str) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.running.entry(workflow_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(());
                true
            }
        }
    }

    pub(crate) fn release(&self, workflow_id: &str) {
        self.running.remove(workflow_id);
    }

    /// Whether an execution with the given ID is currently running.
    pub fn is_running(&self, workflow_id: &str) -> bool {
        self.running.contains_key(workflow_id)
    }
}

/// Options for starting a workflow.
#[derive(Debug, Clone)]
pub struct StartWorkflowOptions {
    /// Client-supplied durable identifier; concurrent starts with the same
    /// ID are rejected.
    pub workflow_id: String,
    /// Task queue the workflow and its activities run on.
    pub task_queue: String,
}

/// Handle to a started workflow execution.
#[derive(Debug)]
pub struct WorkflowHandle<O> {
    workflow_id: String,
    receiver: oneshot::Receiver<Result<serde_json::Value, WorkflowError>>,
    _output: PhantomData<O>,
}

impl<O: DeserializeOwned> WorkflowHandle<O> {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Await the workflow's terminal result.
    pub async fn result(self) -> Result<O, WorkflowError> {
        match self.receiver.await {
            Ok(Ok(value)) => serde_json::from_value(value)
                .map_err(|err| WorkflowError::Codec(err.to_string())),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(WorkflowError::ResultChannelClosed),
        }
    }
}

/// Client for starting workflows on a [`SagaEngine`].
#[derive(Clone)]
pub struct SagaClient {
    engine: Arc<SagaEngine>,
}

impl SagaClient {
    pub fn new(engine: Arc<SagaEngine>) -> Self {
        Self { engine }
    }

    /// Start a workflow execution.
    ///
    /// The returned handle resolves when the workflow reaches a terminal
    /// state. Dropping the handle does not cancel the execution.
    pub async fn start_workflow<W: Workflow>(
        &self,
        options: StartWorkflowOptions,
        input: W::Input,
    ) -> Result<WorkflowHandle<W::Output>, ClientError> {
        let input = serde_json::to_value(input).map_err(|err| ClientError::Codec(err.to_string()))?;

        if !self.engine.try_claim(&options.workflow_id) {
            return Err(ClientError::WorkflowAlreadyStarted(options.workflow_id));
        }

        let (completion, receiver) = oneshot::channel();
        let task = EngineTask::Workflow(WorkflowTask {
            workflow_type: W::TYPE_ID.to_string(),
            workflow_id: options.workflow_id.clone(),
            task_queue: options.task_queue.clone(),
            input,
            completion,
        });

        if let Err(err) = self.engine.publish(&options.task_queue, task).await {
            self.engine.release(&options.workflow_id);
            return Err(err.into());
        }

        tracing::debug!(
            workflow_id = %options.workflow_id,
            workflow_type = W::TYPE_ID,
            queue = %options.task_queue,
            "workflow started"
        );

        Ok(WorkflowHandle {
            workflow_id: options.workflow_id,
            receiver,
            _output: PhantomData,
        })
    }
}
