//! Errors surfaced by the pipeline executor, classified for the queue's
//! retry policy the same way every other crate boundary is.

use hygiene_protocol::{AsErrorKind, ErrorKind};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExecutorError>;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("task rejected: {0}")]
    Rejected(String),
    #[error("job store error: {0}")]
    Db(#[from] hygiene_db::DbError),
    #[error("artifact store error: {0}")]
    Store(#[from] hygiene_store::StoreError),
    #[error("analyser {analyzer} failed: {source}")]
    Analyzer {
        analyzer: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("analyser {0} timed out")]
    Timeout(&'static str),
    #[error("analyser {0} panicked: {1}")]
    Panicked(&'static str, String),
    #[error("ai synthesis hook failed: {0}")]
    AiHook(#[from] reqwest::Error),
    #[error("job cancelled")]
    Cancelled,
}

impl AsErrorKind for ExecutorError {
    fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::Rejected(_) => ErrorKind::Validation,
            ExecutorError::Db(e) => e.kind(),
            ExecutorError::Store(e) => e.kind(),
            ExecutorError::Analyzer { .. } => ErrorKind::Terminal,
            ExecutorError::Timeout(_) => ErrorKind::Transient,
            ExecutorError::Panicked(_, _) => ErrorKind::Internal,
            ExecutorError::AiHook(_) => ErrorKind::Transient,
            ExecutorError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
