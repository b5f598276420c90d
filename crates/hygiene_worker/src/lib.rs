//! The Pipeline Executor: drives the four-stage analyser
//! sequence for one job, survives partial failure, and resumes by replay.
//!
//! Registered with a [`hygiene_queue::WorkQueue`] as the handler for
//! `"analyze_image"` tasks by the composition root; has no network listener
//! or CLI of its own.

pub mod ai_hook;
pub mod analyzer;
pub mod error;
pub mod executor;
pub mod inspector;

pub use analyzer::{Analyzer, SubprocessAnalyzer};
pub use error::{ExecutorError, Result};
pub use executor::Executor;
pub use inspector::{ImageInspector, SkopeoInspector};
