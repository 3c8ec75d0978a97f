//! In-process task queue payloads. A task queue is a bounded mpsc channel
//! owned by the worker polling it; these are the messages that travel on it.

use tokio::sync::oneshot;

use crate::error::{ApplicationError, WorkflowError};

pub(crate) enum EngineTask {
    Workflow(WorkflowTask),
    Activity(ActivityTask),
}

pub(crate) struct WorkflowTask {
    pub workflow_type: String,
    pub workflow_id: String,
    pub task_queue: String,
    pub input: serde_json::Value,
    pub completion: oneshot::Sender<Result<serde_json::Value, WorkflowError>>,
}

pub(crate) struct ActivityTask {
    pub activity_type: String,
    pub input: serde_json::Value,
    pub completion: oneshot::Sender<Result<serde_json::Value, ApplicationError>>,
}
