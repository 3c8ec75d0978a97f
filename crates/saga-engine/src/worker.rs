//! # Worker
//!
//! A [`Worker`] hosts the workflows and activities registered for one task
//! queue and runs the dispatch loop. Starting a worker yields a
//! [`WorkerHandle`] whose [`ready`](WorkerHandle::ready) future resolves once
//! the loop is actually polling the queue, so callers never have to guess
//! with timers.

use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::activity::{Activity, ActivityRegistry, NOT_REGISTERED_ERROR_TYPE};
use crate::engine::SagaEngine;
use crate::error::{ApplicationError, WorkflowError};
use crate::queue::{ActivityTask, EngineTask, WorkflowTask};
use crate::workflow::{Workflow, WorkflowContext, WorkflowRegistry};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Capacity of the task queue channel.
    pub channel_capacity: usize,
    /// Maximum activities executing concurrently on this worker. Workflow
    /// tasks are not counted: a workflow awaiting its own activity must not
    /// hold an activity slot.
    pub max_concurrent_activities: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            max_concurrent_activities: 16,
        }
    }
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_max_concurrent_activities(mut self, max: usize) -> Self {
        self.max_concurrent_activities = max;
        self
    }
}

/// A worker bound to one task queue.
pub struct Worker {
    engine: Arc<SagaEngine>,
    task_queue: String,
    config: WorkerConfig,
    workflows: Arc<WorkflowRegistry>,
    activities: Arc<ActivityRegistry>,
    receiver: mpsc::Receiver<EngineTask>,
}

impl Worker {
    pub fn new(engine: Arc<SagaEngine>, task_queue: impl Into<String>) -> Self {
        Self::with_config(engine, task_queue, WorkerConfig::default())
    }

    pub fn with_config(
        engine: Arc<SagaEngine>,
        task_queue: impl Into<String>,
        config: WorkerConfig,
    ) -> Self {
        let task_queue = task_queue.into();
        let (sender, receiver) = mpsc::channel(config.channel_capacity);
        engine.register_queue(&task_queue, sender);

        Self {
            engine,
            task_queue,
            config,
            workflows: Arc::new(WorkflowRegistry::new()),
            activities: Arc::new(ActivityRegistry::new()),
            receiver,
        }
    }

    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    pub fn register_workflow<W: Workflow>(&self, workflow: W) {
        self.workflows.register(workflow);
    }

    pub fn register_activity<A: Activity>(&self, activity: A) {
        self.activities.register(activity);
    }

    /// Spawn the dispatch loop and return its handle.
    pub fn start(self) -> WorkerHandle {
        let (ready_sender, ready_receiver) = oneshot::channel();
        let engine = Arc::clone(&self.engine);
        let task_queue = self.task_queue.clone();
        let join = tokio::spawn(self.run(ready_sender));

        WorkerHandle {
            engine,
            task_queue,
            ready: Some(ready_receiver),
            join,
        }
    }

    async fn run(mut self, ready: oneshot::Sender<()>) {
        let slots = Arc::new(Semaphore::new(self.config.max_concurrent_activities));
        let _ = ready.send(());
        tracing::info!(queue = %self.task_queue, "worker started");

        while let Some(task) = self.receiver.recv().await {
            match task {
                EngineTask::Workflow(task) => {
                    let engine = Arc::clone(&self.engine);
                    let workflows = Arc::clone(&self.workflows);
                    tokio::spawn(run_workflow(engine, workflows, task));
                }
                EngineTask::Activity(task) => {
                    let activities = Arc::clone(&self.activities);
                    let slots = Arc::clone(&slots);
                    tokio::spawn(async move {
                        // Semaphore is never closed, so acquire cannot fail.
                        let _permit = slots.acquire_owned().await.expect("semaphore closed");
                        run_activity(activities, task).await;
                    });
                }
            }
        }

        tracing::info!(queue = %self.task_queue, "worker stopped");
    }
}

async fn run_workflow(
    engine: Arc<SagaEngine>,
    workflows: Arc<WorkflowRegistry>,
    task: WorkflowTask,
) {
    let WorkflowTask {
        workflow_type,
        workflow_id,
        task_queue,
        input,
        completion,
    } = task;

    let result = match workflows.get(&workflow_type) {
        Some(workflow) => {
            let ctx = WorkflowContext::new(Arc::clone(&engine), workflow_id.clone(), task_queue);
            workflow.run_dyn(&ctx, input).await
        }
        None => Err(WorkflowError::NotRegistered(workflow_type.clone())),
    };

    if let Err(err) = &result {
        tracing::debug!(workflow_id = %workflow_id, error = %err, "workflow failed");
    }

    engine.release(&workflow_id);
    if completion.send(result).is_err() {
        tracing::debug!(workflow_id = %workflow_id, "workflow result receiver dropped");
    }
}

async fn run_activity(activities: Arc<ActivityRegistry>, task: ActivityTask) {
    let ActivityTask {
        activity_type,
        input,
        completion,
    } = task;

    let result = match activities.get(&activity_type) {
        Some(activity) => activity.execute_dyn(input).await,
        None => Err(ApplicationError::non_retryable(
            NOT_REGISTERED_ERROR_TYPE,
            format!("activity {activity_type} is not registered on this worker"),
        )),
    };

    let _ = completion.send(result);
}

/// Handle to a running worker.
pub struct WorkerHandle {
    engine: Arc<SagaEngine>,
    task_queue: String,
    ready: Option<oneshot::Receiver<()>>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    /// Resolves once the dispatch loop is polling its queue. Idempotent.
    pub async fn ready(&mut self) {
        if let Some(receiver) = self.ready.take() {
            let _ = receiver.await;
        }
    }

    /// Deregister the queue and wait for the dispatch loop to drain and stop.
    pub async fn shutdown(self) {
        self.engine.deregister_queue(&self.task_queue);
        let _ = self.join.await;
    }
}
