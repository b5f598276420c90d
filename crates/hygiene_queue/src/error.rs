//! Error types for the work queue.

use hygiene_protocol::{AsErrorKind, ErrorKind};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue storage error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("task {0} already enqueued for this job")]
    Conflict(String),

    #[error("no handler registered for task kind {0}")]
    NoHandler(String),

    #[error("queue is shutting down")]
    ShuttingDown,

    #[error("corrupt queue row: {0}")]
    Corrupt(String),

    /// A handler's own failure, carrying its original classification so the
    /// retry policy reacts to it the same way it would at the handler's own
    /// crate boundary: only `Transient` failures are retried.
    #[error("handler error: {0}")]
    Handler(String, ErrorKind),
}

impl AsErrorKind for QueueError {
    fn kind(&self) -> ErrorKind {
        match self {
            QueueError::NotFound(_) => ErrorKind::NotFound,
            QueueError::Conflict(_) => ErrorKind::Conflict,
            QueueError::Sqlx(_) => ErrorKind::Transient,
            QueueError::ShuttingDown => ErrorKind::Transient,
            QueueError::Serialization(_) | QueueError::NoHandler(_) | QueueError::Corrupt(_) => {
                ErrorKind::Internal
            }
            QueueError::Handler(_, kind) => *kind,
        }
    }
}
