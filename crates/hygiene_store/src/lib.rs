//! The Artifact Store: content-addressed, write-once blobs
//! keyed by `(job_id, name)`, stored under `{job_id}/artifacts/{name}`.
//!
//! Two backends share one trait: [`FsArtifactStore`] (default, local disk)
//! and, behind the `s3` feature, [`S3ArtifactStore`]. Neither is mutable
//! after a successful `put` — the pipeline executor relies on that to make
//! replay safe: a stage is only re-run if its artefact is missing.

pub mod error;
pub mod fs;
#[cfg(feature = "s3")]
pub mod s3;
pub mod trait_def;

pub use error::{Result, StoreError};
pub use fs::FsArtifactStore;
#[cfg(feature = "s3")]
pub use s3::S3ArtifactStore;
pub use trait_def::{ArtifactStore, ArtifactStream};
