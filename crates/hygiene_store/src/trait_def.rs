//! The artifact-store contract: write-once blobs addressed by
//! `(job_id, name)`, streamed back out by the download surface.

use async_trait::async_trait;
use hygiene_ids::JobId;
use hygiene_protocol::types::ArtifactName;
use tokio::io::AsyncRead;

use crate::error::Result;

/// A readable artifact body plus the content type it was written with.
pub struct ArtifactStream {
    pub content_type: &'static str,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

/// Implemented by both the local-filesystem backend (default) and the
/// S3-compatible backend (`s3` feature). Every call is keyed by the
/// `{job_id}/artifacts/{name}` layout.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write `bytes` under `(job_id, name)`. Must fail with
    /// [`crate::error::StoreError::Conflict`] if the key already holds data —
    /// artefacts are write-once.
    async fn put(&self, job_id: &JobId, name: ArtifactName, bytes: Vec<u8>) -> Result<()>;

    /// Stream an artifact back out. Fails with
    /// [`crate::error::StoreError::NotFound`] if absent.
    async fn get(&self, job_id: &JobId, name: ArtifactName) -> Result<ArtifactStream>;

    /// Whether the artifact exists, without reading its body. Used by the
    /// pipeline executor's idempotent-replay check: "resume by
    /// re-running any stages whose artefacts do not yet exist."
    async fn exists(&self, job_id: &JobId, name: ArtifactName) -> Result<bool>;

    /// Remove all artefacts for a job, backing a soft-deleted job record.
    async fn delete_all(&self, job_id: &JobId) -> Result<()>;
}
