//! The local-filesystem artifact store — the default backend: `create_dir_all`
//! plus a single write-once file create per output, over tokio's async
//! filesystem API.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hygiene_ids::JobId;
use hygiene_protocol::types::ArtifactName;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::trait_def::{ArtifactStore, ArtifactStream};

/// Artefacts laid out as `{root}/{job_id}/artifacts/{name}`.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, job_id: &JobId, name: ArtifactName) -> PathBuf {
        self.root.join(job_id.as_str()).join("artifacts").join(name.file_name())
    }

    fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.as_str())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, job_id: &JobId, name: ArtifactName, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(job_id, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::Conflict(artifact_key_display(job_id, name)));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        file.write_all(&bytes).await?;
        file.flush().await?;
        info!(job_id = %job_id, artifact = name.file_name(), bytes = bytes.len(), "wrote artifact");
        Ok(())
    }

    async fn get(&self, job_id: &JobId, name: ArtifactName) -> Result<ArtifactStream> {
        let path = self.path_for(job_id, name);
        let file = fs::File::open(&path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(artifact_key_display(job_id, name)),
            _ => StoreError::Io(e),
        })?;
        Ok(ArtifactStream {
            content_type: name.content_type(),
            reader: Box::new(file),
        })
    }

    async fn exists(&self, job_id: &JobId, name: ArtifactName) -> Result<bool> {
        Ok(fs::try_exists(self.path_for(job_id, name)).await?)
    }

    async fn delete_all(&self, job_id: &JobId) -> Result<()> {
        let dir = self.job_dir(job_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "failed to remove artifact directory");
                Err(StoreError::Io(e))
            }
        }
    }
}

fn artifact_key_display(job_id: &JobId, name: ArtifactName) -> String {
    format!("{job_id}/artifacts/{}", name.file_name())
}

/// Exposed for callers that need the on-disk path without an `ArtifactStore`
/// instance (e.g. deployment tooling pre-creating the root directory).
pub fn ensure_root(root: &Path) -> io::Result<()> {
    std::fs::create_dir_all(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hygiene_protocol::types::ArtifactName;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let job_id = JobId::new();

        store.put(&job_id, ArtifactName::Grype, b"{\"matches\":[]}".to_vec()).await.unwrap();
        assert!(store.exists(&job_id, ArtifactName::Grype).await.unwrap());

        let mut stream = store.get(&job_id, ArtifactName::Grype).await.unwrap();
        assert_eq!(stream.content_type, "application/json");
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut stream.reader, &mut buf).await.unwrap();
        assert_eq!(buf, b"{\"matches\":[]}");
    }

    #[tokio::test]
    async fn second_write_to_same_key_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let job_id = JobId::new();

        store.put(&job_id, ArtifactName::Dive, b"one".to_vec()).await.unwrap();
        let second = store.put(&job_id, ArtifactName::Dive, b"two".to_vec()).await;
        assert!(matches!(second, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let job_id = JobId::new();
        let result = store.get(&job_id, ArtifactName::Report).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_all_removes_the_job_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let job_id = JobId::new();
        store.put(&job_id, ArtifactName::Dockle, b"{}".to_vec()).await.unwrap();

        store.delete_all(&job_id).await.unwrap();
        assert!(!store.exists(&job_id, ArtifactName::Dockle).await.unwrap());
    }
}
