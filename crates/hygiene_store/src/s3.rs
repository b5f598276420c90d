//! S3-compatible artifact store, behind the `s3` feature.
//!
//! One trait, one cheap default filesystem implementation, one heavier
//! opt-in implementation for deployments that front a real object store.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use hygiene_ids::JobId;
use hygiene_protocol::types::ArtifactName;
use tracing::info;

use crate::error::{Result, StoreError};
use crate::trait_def::{ArtifactStore, ArtifactStream};

pub struct S3ArtifactStore {
    client: Client,
    bucket: String,
}

impl S3ArtifactStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn key(&self, job_id: &JobId, name: ArtifactName) -> String {
        hygiene_protocol::paths::artifact_key(job_id, name)
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put(&self, job_id: &JobId, name: ArtifactName, bytes: Vec<u8>) -> Result<()> {
        let key = self.key(job_id, name);

        // Write-once via a conditional PUT precondition: fails with 412 if
        // the key already has an object, matching the local backend's
        // `create_new` semantics without a read-check race.
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(name.content_type())
            .if_none_match("*")
            .body(ByteStream::from(bytes))
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(job_id = %job_id, artifact = name.file_name(), "wrote artifact to object store");
                Ok(())
            }
            Err(e) if is_precondition_failed(&e) => Err(StoreError::Conflict(key)),
            Err(e) => Err(StoreError::ObjectStore(e.to_string())),
        }
    }

    async fn get(&self, job_id: &JobId, name: ArtifactName) -> Result<ArtifactStream> {
        let key = self.key(job_id, name);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    StoreError::NotFound(key.clone())
                } else {
                    StoreError::ObjectStore(e.to_string())
                }
            })?;

        Ok(ArtifactStream {
            content_type: name.content_type(),
            reader: Box::new(output.body.into_async_read()),
        })
    }

    async fn exists(&self, job_id: &JobId, name: ArtifactName) -> Result<bool> {
        let key = self.key(job_id, name);
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(StoreError::ObjectStore(e.to_string())),
        }
    }

    async fn delete_all(&self, job_id: &JobId) -> Result<()> {
        let prefix = hygiene_protocol::paths::job_prefix(job_id);
        let listed = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .send()
            .await
            .map_err(|e| StoreError::ObjectStore(e.to_string()))?;

        for obj in listed.contents() {
            if let Some(key) = obj.key() {
                self.client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| StoreError::ObjectStore(e.to_string()))?;
            }
        }
        Ok(())
    }
}

fn is_precondition_failed<E: std::fmt::Debug>(err: &E) -> bool {
    format!("{err:?}").contains("PreconditionFailed") || format!("{err:?}").contains("412")
}

fn is_not_found<E: std::fmt::Debug>(err: &E) -> bool {
    let s = format!("{err:?}");
    s.contains("NoSuchKey") || s.contains("NotFound") || s.contains("404")
}
