//! Error types for the scheduler.

/// Top-level error type for the task scheduler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A handler for this task type is already registered.
    #[error("handler already registered for task type '{0}'")]
    HandlerAlreadyRegistered(String),

    /// No handler is registered for this task type.
    #[error("no handler registered for task type '{0}'")]
    HandlerNotFound(String),

    /// Task execution error, raised by a handler's `execute`.
    #[error("execution error: {0}")]
    Execution(String),

    /// Payload encode/decode error at the typed handler boundary.
    #[error("payload error: {0}")]
    Payload(String),

    /// Task store error (save, delete, list).
    #[error("persistence error: {0}")]
    Persistence(String),

    /// SQLite error from the bundled store.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for an execution error with a formatted message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, Error>;
