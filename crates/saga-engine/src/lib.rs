//! # saga-engine
//!
//! A small workflow engine for saga-style orchestrations, designed around the
//! contract a durable-execution vendor provides: workflow starts keyed by a
//! client-supplied ID, activity execution with per-activity retry policies and
//! non-retryable error type names, named task queues, and workers that host
//! workflow and activity code.
//!
//! This crate ships an in-process Tokio runtime implementing that contract.
//! Workflow bodies are plain `async` Rust ([`Workflow::run`]) that schedule
//! activities through a [`WorkflowContext`]; activities are typed units of
//! side-effecting work ([`Activity`]) dispatched at-least-once, so they are
//! expected to be idempotent.
//!
//! ## Modules
//!
//! - [`activity`]: [`Activity`] trait, type-erasure and registry
//! - [`workflow`]: [`Workflow`] trait, [`WorkflowContext`], [`ActivityOptions`]
//! - [`retry`]: [`RetryPolicy`] with exponential backoff
//! - [`engine`]: [`SagaEngine`], [`SagaClient`], [`WorkflowHandle`]
//! - [`worker`]: per-queue [`Worker`] with an explicit readiness signal
//! - [`error`]: error types crossing the activity/workflow boundary

pub mod activity;
pub mod engine;
pub mod error;
mod queue;
pub mod retry;
pub mod worker;
pub mod workflow;

pub use activity::{Activity, ActivityRegistry, DynActivity};
pub use engine::{SagaClient, SagaEngine, StartWorkflowOptions, WorkflowHandle};
pub use error::{
    ActivityError, ApplicationError, ClientError, TaskQueueError, WorkflowError,
};
pub use retry::RetryPolicy;
pub use worker::{Worker, WorkerConfig, WorkerHandle};
pub use workflow::{ActivityOptions, DynWorkflow, Workflow, WorkflowContext, WorkflowRegistry};
