//! Handler registry: task-type tag → type-erased handler.
//!
//! Built once at startup, before the scheduler starts ticking, then handed
//! to [`Scheduler::new`](crate::runner::Scheduler::new) and never mutated
//! again. The handler set is statically enumerable via
//! [`HandlerRegistry::registered_types`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::handler::{ErasedHandler, TaskHandler, TaskPayload, TypedHandler};

/// Static mapping from task-type tag to handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn ErasedHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for its payload's task type.
    ///
    /// Duplicate registration for a tag is a configuration error: two
    /// handlers claiming one tag means task data would route ambiguously.
    pub fn register<H: TaskHandler>(&mut self, handler: H) -> Result<()> {
        let tag = H::Payload::TASK_TYPE;
        if self.handlers.contains_key(tag) {
            return Err(Error::HandlerAlreadyRegistered(tag.to_owned()));
        }
        self.handlers.insert(tag, Arc::new(TypedHandler::new(handler)));
        Ok(())
    }

    /// Resolve the handler for a tag.
    ///
    /// Failure means task data references a type with no code behind it —
    /// the caller logs loudly and drops the task rather than retrying.
    pub(crate) fn lookup(&self, task_type: &str) -> Result<Arc<dyn ErasedHandler>> {
        self.handlers
            .get(task_type)
            .cloned()
            .ok_or_else(|| Error::HandlerNotFound(task_type.to_owned()))
    }

    /// Whether a handler is registered for the tag.
    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// All registered tags, sorted for stable log output.
    pub fn registered_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::SchedulerHandle;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Refresh;

    impl TaskPayload for Refresh {
        const TASK_TYPE: &'static str = "refresh";
    }

    struct RefreshHandler;

    #[async_trait]
    impl TaskHandler for RefreshHandler {
        type Payload = Refresh;

        async fn execute(&self, _payload: Refresh, _scheduler: &SchedulerHandle) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Expire;

    impl TaskPayload for Expire {
        const TASK_TYPE: &'static str = "expire";
    }

    struct ExpireHandler;

    #[async_trait]
    impl TaskHandler for ExpireHandler {
        type Payload = Expire;

        async fn execute(&self, _payload: Expire, _scheduler: &SchedulerHandle) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn register_then_lookup() {
        let mut registry = HandlerRegistry::new();
        registry.register(RefreshHandler).expect("register");

        let handler = registry.lookup("refresh").expect("lookup");
        assert_eq!(handler.task_type(), "refresh");
        assert!(registry.contains("refresh"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.register(RefreshHandler).expect("first register");

        let err = registry.register(RefreshHandler);
        assert!(matches!(err, Err(Error::HandlerAlreadyRegistered(tag)) if tag == "refresh"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_unknown_type_fails() {
        let registry = HandlerRegistry::new();
        let err = registry.lookup("nonexistent");
        assert!(matches!(err, Err(Error::HandlerNotFound(tag)) if tag == "nonexistent"));
    }

    #[test]
    fn registered_types_are_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.register(RefreshHandler).expect("register refresh");
        registry.register(ExpireHandler).expect("register expire");

        assert_eq!(registry.registered_types(), vec!["expire", "refresh"]);
    }
}
