//! Handler traits and the typed payload seam.
//!
//! Each task type declares a payload struct implementing [`TaskPayload`] and
//! a handler implementing [`TaskHandler`] for it. The registry stores
//! handlers type-erased; the JSON payload carried by a [`TaskRecord`] is
//! decoded back into the concrete payload struct here, at the dispatch
//! boundary, so payload field presence is checked by serde rather than by
//! ad-hoc dictionary lookups inside handlers.
//!
//! [`TaskRecord`]: crate::task::TaskRecord

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, warn};

use crate::error::{Error, Result};
use crate::runner::SchedulerHandle;
use crate::task::default_description;

/// Payload schema for one task type.
///
/// The tag is the registry key and the persisted `task_type` column; it must
/// be unique across the application.
pub trait TaskPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable task-type tag (e.g. `"reminder"`, `"message_cleanup"`).
    const TASK_TYPE: &'static str;
}

/// Behavior for one task type.
///
/// Handlers never touch scheduler state directly; they receive a
/// [`SchedulerHandle`] at each entry point and interact only through it
/// (scheduling follow-ups, coalescing via `cancel_all`).
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// The payload struct this handler consumes.
    type Payload: TaskPayload;

    /// Default persistence mode for new tasks of this type, used when the
    /// caller does not override it. `false` = durable.
    fn runtime_only(&self) -> bool {
        false
    }

    /// Run the task. An `Err` routes through [`TaskHandler::on_failure`]
    /// after the record has been torn down.
    async fn execute(&self, payload: Self::Payload, scheduler: &SchedulerHandle) -> Result<()>;

    /// Failure hook. Runs after the failed record is gone from queue and
    /// store, so scheduling a retry from here creates a genuinely new
    /// record. Errors returned from this hook are logged and swallowed.
    async fn on_failure(
        &self,
        error: &Error,
        payload: Self::Payload,
        scheduler: &SchedulerHandle,
    ) -> Result<()> {
        let _ = (payload, scheduler);
        warn!(
            task_type = Self::Payload::TASK_TYPE,
            "task failed with no failure hook: {error}"
        );
        Ok(())
    }

    /// Human-readable label for a task, used in logs and run history.
    fn describe(&self, payload: &Self::Payload, at: DateTime<Utc>) -> String {
        let _ = payload;
        default_description(Self::Payload::TASK_TYPE, at)
    }
}

/// Object-safe handler form stored in the registry.
///
/// Methods take the payload as `serde_json::Value`; [`TypedHandler`] decodes
/// it into the concrete payload struct and delegates to the typed trait.
#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    fn task_type(&self) -> &'static str;

    fn runtime_only(&self) -> bool;

    fn describe_value(&self, payload: &serde_json::Value, at: DateTime<Utc>) -> String;

    async fn execute_value(
        &self,
        payload: serde_json::Value,
        scheduler: &SchedulerHandle,
    ) -> Result<()>;

    /// Runs the failure hook; all hook-side errors end here as log lines.
    async fn on_failure_value(
        &self,
        error: &Error,
        payload: serde_json::Value,
        scheduler: &SchedulerHandle,
    );
}

/// Adapter from a typed [`TaskHandler`] to [`ErasedHandler`].
pub(crate) struct TypedHandler<H> {
    handler: H,
}

impl<H: TaskHandler> TypedHandler<H> {
    pub(crate) fn new(handler: H) -> Self {
        Self { handler }
    }

    fn decode(&self, payload: serde_json::Value) -> Result<H::Payload> {
        serde_json::from_value(payload).map_err(|e| {
            Error::Payload(format!(
                "cannot decode payload for task type '{}': {e}",
                H::Payload::TASK_TYPE
            ))
        })
    }
}

#[async_trait]
impl<H: TaskHandler> ErasedHandler for TypedHandler<H> {
    fn task_type(&self) -> &'static str {
        H::Payload::TASK_TYPE
    }

    fn runtime_only(&self) -> bool {
        self.handler.runtime_only()
    }

    fn describe_value(&self, payload: &serde_json::Value, at: DateTime<Utc>) -> String {
        match serde_json::from_value::<H::Payload>(payload.clone()) {
            Ok(typed) => self.handler.describe(&typed, at),
            Err(_) => default_description(H::Payload::TASK_TYPE, at),
        }
    }

    async fn execute_value(
        &self,
        payload: serde_json::Value,
        scheduler: &SchedulerHandle,
    ) -> Result<()> {
        let typed = self.decode(payload)?;
        self.handler.execute(typed, scheduler).await
    }

    async fn on_failure_value(
        &self,
        error: &Error,
        payload: serde_json::Value,
        scheduler: &SchedulerHandle,
    ) {
        let typed = match self.decode(payload) {
            Ok(typed) => typed,
            Err(decode_err) => {
                error!(
                    task_type = H::Payload::TASK_TYPE,
                    "failure hook skipped, payload undecodable: {decode_err}"
                );
                return;
            }
        };

        if let Err(hook_err) = self.handler.on_failure(error, typed, scheduler).await {
            warn!(
                task_type = H::Payload::TASK_TYPE,
                "failure hook itself errored: {hook_err}"
            );
        }
    }
}

/// Encode a typed payload for storage in a [`TaskRecord`].
///
/// [`TaskRecord`]: crate::task::TaskRecord
pub(crate) fn encode_payload<P: TaskPayload>(payload: &P) -> Result<serde_json::Value> {
    serde_json::to_value(payload).map_err(|e| {
        Error::Payload(format!(
            "cannot encode payload for task type '{}': {e}",
            P::TASK_TYPE
        ))
    })
}
