//! Shared domain types, configuration, and error taxonomy for the
//! container-image hygiene platform's core pipeline.
//!
//! This crate has no I/O of its own: it is the vocabulary every other crate
//! (`hygiene_db`, `hygiene_store`, `hygiene_queue`, `hygiene_worker`,
//! `hygiene_api`) shares, so that a `Job` built by the API and read back by
//! the worker is the same type with the same invariants.

pub mod config;
pub mod defaults;
pub mod error;
pub mod http_types;
pub mod idempotency;
pub mod metrics;
pub mod paths;
pub mod types;

pub use config::{AnalyzerFlags, Config, QueueBackend};
pub use error::{AsErrorKind, ErrorKind};
pub use types::{
    AnalyzeImageTask, AnalyzerKind, AnalyzerTiming, ArtifactName, ImageMetadata, Job, JobStatus,
    LayerInfo, QueueTask, Scenario,
};
