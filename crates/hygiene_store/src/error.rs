//! Error types for the artifact store.

use hygiene_protocol::{AsErrorKind, ErrorKind};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    /// Rewrite of a write-once key.
    #[error("artifact already exists and is write-once: {0}")]
    Conflict(String),

    #[error("artifact store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "s3")]
    #[error("object store error: {0}")]
    ObjectStore(String),
}

impl AsErrorKind for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Io(_) => ErrorKind::Transient,
            #[cfg(feature = "s3")]
            StoreError::ObjectStore(_) => ErrorKind::Transient,
        }
    }
}
