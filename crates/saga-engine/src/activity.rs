//! # Activities
//!
//! An [`Activity`] is a typed, side-effecting unit of work executed by a
//! worker on behalf of a workflow. The engine dispatches activities
//! at-least-once; implementations must be idempotent under re-invocation with
//! the same input.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

use crate::error::ApplicationError;

/// Error type name used when an activity payload fails to (de)serialize.
pub const CODEC_ERROR_TYPE: &str = "PayloadCodec";

/// Error type name used when a worker receives a task for an unknown activity.
pub const NOT_REGISTERED_ERROR_TYPE: &str = "ActivityNotRegistered";

/// A typed activity implementation.
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Stable identifier the engine dispatches on.
    const TYPE_ID: &'static str;

    type Input: Serialize + DeserializeOwned + Send + Clone;
    type Output: Serialize + DeserializeOwned + Send;
    type Error: std::error::Error + Into<ApplicationError> + Send + Sync + 'static;

    async fn execute(&self, input: Self::Input) -> Result<Self::Output, Self::Error>;
}

/// Type-erased activity, as stored in the registry.
#[async_trait]
pub trait DynActivity: Send + Sync {
    fn type_id(&self) -> &'static str;

    async fn execute_dyn(
        &self,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ApplicationError>;
}

#[async_trait]
impl<A: Activity> DynActivity for A {
    fn type_id(&self) -> &'static str {
        A::TYPE_ID
    }

    async fn execute_dyn(
        &self,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ApplicationError> {
        let input: A::Input = serde_json::from_value(input).map_err(|err| {
            ApplicationError::non_retryable(
                CODEC_ERROR_TYPE,
                format!("invalid input for {}: {}", A::TYPE_ID, err),
            )
        })?;

        let output = self.execute(input).await.map_err(Into::into)?;

        serde_json::to_value(output).map_err(|err| {
            ApplicationError::non_retryable(
                CODEC_ERROR_TYPE,
                format!("failed to serialize output of {}: {}", A::TYPE_ID, err),
            )
        })
    }
}

/// Registry of activities hosted by a worker.
#[derive(Default)]
pub struct ActivityRegistry {
    activities: DashMap<&'static str, Arc<dyn DynActivity>>,
}

impl fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("activity_count", &self.activities.len())
            .finish()
    }
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A: Activity>(&self, activity: A) {
        self.activities.insert(A::TYPE_ID, Arc::new(activity));
    }

    pub fn get(&self, type_id: &str) -> Option<Arc<dyn DynActivity>> {
        self.activities
            .get(type_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn has(&self, type_id: &str) -> bool {
        self.activities.contains_key(type_id)
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}
