//! Analyser stages B, C, D: each wraps a real scanning CLI
//! (`grype`, `dockle`, `dive`) as a subprocess, spawning the external tool and
//! capturing its stdout as the artefact body, behind one trait.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{ExecutorError, Result};

/// One pipeline analyser. Implementations must be panic-safe to call from
/// inside [`crate::executor::Executor`]'s `catch_unwind` boundary, but are
/// not required to catch their own panics — the executor does that.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Human-readable name, used in timing records and error messages.
    fn name(&self) -> &'static str;

    /// Run against `image_ref`, returning the raw bytes to persist as this
    /// stage's artefact. Timeouts are the executor's responsibility.
    async fn run(&self, image_ref: &str) -> Result<Vec<u8>>;
}

/// Runs a real CLI tool and captures its stdout as the artefact body.
///
/// `binary` is looked up on `PATH` (e.g. `"grype"`, `"dockle"`, `"dive"`);
/// `args_for` builds the argument list for a given image reference.
pub struct SubprocessAnalyzer {
    name: &'static str,
    binary: &'static str,
    args_for: fn(&str) -> Vec<String>,
}

impl SubprocessAnalyzer {
    pub fn grype() -> Self {
        Self {
            name: "grype",
            binary: "grype",
            args_for: |image_ref| vec![image_ref.to_string(), "-o".to_string(), "json".to_string()],
        }
    }

    pub fn dockle() -> Self {
        Self {
            name: "dockle",
            binary: "dockle",
            args_for: |image_ref| vec!["-f".to_string(), "json".to_string(), image_ref.to_string()],
        }
    }

    pub fn dive() -> Self {
        Self {
            name: "dive",
            binary: "dive",
            args_for: |image_ref| {
                vec![
                    image_ref.to_string(),
                    "--ci".to_string(),
                    "--json".to_string(),
                    "/dev/stdout".to_string(),
                ]
            },
        }
    }
}

#[async_trait]
impl Analyzer for SubprocessAnalyzer {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, image_ref: &str) -> Result<Vec<u8>> {
        let args = (self.args_for)(image_ref);
        let output = Command::new(self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ExecutorError::Analyzer {
                analyzer: self.name,
                source: Box::new(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(ExecutorError::Analyzer {
                analyzer: self.name,
                source: format!("{} exited with {}: {stderr}", self.binary, output.status).into(),
            });
        }

        Ok(output.stdout)
    }
}

/// Runs `inner` under `timeout`, mapping expiry to [`ExecutorError::Timeout`].
pub async fn with_timeout(
    name: &'static str,
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<Vec<u8>>>,
) -> Result<Vec<u8>> {
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or(Err(ExecutorError::Timeout(name)))
}
