//! Synchronous image inspection performed at
//! submission time, not inside the async pipeline. Shares the subprocess
//! idiom from [`crate::analyzer`] but returns structured metadata instead of
//! an artefact blob, since its result is embedded directly on the job record.

use async_trait::async_trait;
use hygiene_protocol::types::{ImageMetadata, LayerInfo};
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{ExecutorError, Result};

/// Resolves an image reference to its digest, architecture, OS, and layers.
#[async_trait]
pub trait ImageInspector: Send + Sync {
    async fn inspect(&self, image_ref: &str) -> Result<ImageMetadata>;
}

/// Shells out to `skopeo inspect`, the conventional tool for registry-agnostic
/// manifest introspection without pulling the image.
pub struct SkopeoInspector {
    timeout: Duration,
}

impl SkopeoInspector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[derive(Debug, Deserialize)]
struct SkopeoOutput {
    #[serde(rename = "Digest")]
    digest: String,
    #[serde(rename = "Architecture")]
    architecture: String,
    #[serde(rename = "Os")]
    os: String,
    #[serde(rename = "Layers")]
    layers: Vec<String>,
    #[serde(rename = "LayersData", default)]
    layers_data: Vec<SkopeoLayer>,
}

#[derive(Debug, Deserialize, Default)]
struct SkopeoLayer {
    #[serde(rename = "Size", default)]
    size: u64,
}

#[async_trait]
impl ImageInspector for SkopeoInspector {
    async fn inspect(&self, image_ref: &str) -> Result<ImageMetadata> {
        let run = async {
            let output = Command::new("skopeo")
                .args(["inspect", "--format", "json", &format!("docker://{image_ref}")])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
                .map_err(|e| ExecutorError::Analyzer {
                    analyzer: "image_inspection",
                    source: Box::new(e),
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                return Err(ExecutorError::Analyzer {
                    analyzer: "image_inspection",
                    source: format!("skopeo inspect exited with {}: {stderr}", output.status).into(),
                });
            }

            let parsed: SkopeoOutput = serde_json::from_slice(&output.stdout).map_err(|e| ExecutorError::Analyzer {
                analyzer: "image_inspection",
                source: Box::new(e),
            })?;

            let layers = parsed
                .layers
                .into_iter()
                .zip(parsed.layers_data.into_iter().chain(std::iter::repeat_with(SkopeoLayer::default)))
                .map(|(digest, data)| LayerInfo {
                    digest,
                    size_bytes: data.size,
                })
                .collect();

            Ok(ImageMetadata {
                digest: parsed.digest,
                architecture: parsed.architecture,
                os: parsed.os,
                layers,
            })
        };

        tokio::time::timeout(self.timeout, run)
            .await
            .unwrap_or(Err(ExecutorError::Timeout("image_inspection")))
    }
}
