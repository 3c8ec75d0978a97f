//! # Error Types
//!
//! Errors crossing the activity/workflow boundary. [`ApplicationError`] is the
//! unit of failure an activity reports to the engine; it carries a stable
//! `error_type` name that retry policies match against, and a `non_retryable`
//! flag so activity code can mark an individual failure as terminal regardless
//! of policy.

use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// An application-level failure reported by activity or workflow code.
///
/// The `error_type` is a stable name (not a message) used by
/// [`RetryPolicy::non_retryable_error_types`] and by callers that need to map
/// an engine failure back to a domain error.
#[derive(Debug, Clone, Error)]
#[error("{error_type}: {message}")]
pub struct ApplicationError {
    pub error_type: String,
    pub message: String,
    pub non_retryable: bool,
}

impl ApplicationError {
    /// A retryable application error.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            non_retryable: false,
        }
    }

    /// An error the engine must never retry, regardless of policy.
    pub fn non_retryable(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            non_retryable: true,
            ..Self::new(error_type, message)
        }
    }
}

/// Errors from publishing onto a task queue.
#[derive(Debug, Error)]
pub enum TaskQueueError {
    #[error("no worker is polling task queue {0}")]
    NotFound(String),

    #[error("task queue {0} is closed")]
    Closed(String),
}

/// Terminal outcome of executing an activity, after retries.
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error(transparent)]
    Application(#[from] ApplicationError),

    #[error("activity {activity_type} attempt timed out after {elapsed:?}")]
    Timeout {
        activity_type: &'static str,
        elapsed: Duration,
    },

    /// The worker dropped the attempt without reporting a result (e.g. a
    /// panic inside the activity). Dispatched at-least-once, so retryable.
    #[error("worker abandoned activity {activity_type} before reporting a result")]
    WorkerLost { activity_type: &'static str },

    #[error(transparent)]
    TaskQueue(#[from] TaskQueueError),

    #[error("activity {activity_type} payload codec failure: {message}")]
    Codec {
        activity_type: &'static str,
        message: String,
    },
}

impl ActivityError {
    /// The underlying application error, if any.
    pub fn application(&self) -> Option<&ApplicationError> {
        match self {
            ActivityError::Application(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn is_retryable(&self, policy: &RetryPolicy) -> bool {
        match self {
            ActivityError::Application(err) => {
                !err.non_retryable && !policy.is_non_retryable(&err.error_type)
            }
            ActivityError::Timeout { .. } | ActivityError::WorkerLost { .. } => true,
            ActivityError::TaskQueue(_) | ActivityError::Codec { .. } => false,
        }
    }
}

/// Terminal outcome of a workflow execution.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Application(#[from] ApplicationError),

    #[error(transparent)]
    Activity(#[from] ActivityError),

    #[error("workflow type {0} is not registered on this task queue")]
    NotRegistered(String),

    #[error("workflow result channel dropped before completion")]
    ResultChannelClosed,

    #[error("workflow payload codec failure: {0}")]
    Codec(String),
}

impl WorkflowError {
    /// Dig out the application error, whether the workflow reported one
    /// directly or an activity failed with one.
    pub fn application(&self) -> Option<&ApplicationError> {
        match self {
            WorkflowError::Application(err) => Some(err),
            WorkflowError::Activity(err) => err.application(),
            _ => None,
        }
    }

    /// Stable error type name, when an application error is involved.
    pub fn error_type(&self) -> Option<&str> {
        self.application().map(|err| err.error_type.as_str())
    }
}

/// Errors from starting a workflow.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A workflow with the same client-supplied ID is currently running.
    #[error("workflow {0} is already running")]
    WorkflowAlreadyStarted(String),

    #[error(transparent)]
    TaskQueue(#[from] TaskQueueError),

    #[error("workflow payload codec failure: {0}")]
    Codec(String),
}
