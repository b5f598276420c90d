//! The Pipeline Executor: registered as the `analyze_image`
//! handler, runs the analyser sequence in a fixed order with fixed progress
//! bands, survives partial failure, and resumes idempotently on redelivery.
//!
//! Stages run sequentially in-process rather than through a generic
//! subprocess-bridge dispatch, since the analyser set here is a fixed
//! four-stage sequence rather than a user-extensible plugin registry (see
//! `DESIGN.md`).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use hygiene_db::{JobStore, StatusUpdate};
use hygiene_protocol::{
    defaults, AnalyzeImageTask, AnalyzerKind, AnalyzerTiming, AsErrorKind, Config, JobStatus, QueueTask,
};
use hygiene_queue::{QueueError, TaskHandler};
use hygiene_store::ArtifactStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::analyzer::{with_timeout, Analyzer};
use crate::ai_hook::AiHookClient;
use crate::error::{ExecutorError, Result};

/// Everything the executor needs to run one stage, kept together so
/// `run_stage` doesn't need a long parameter list.
struct Stage {
    kind: AnalyzerKind,
    enabled: bool,
    analyzer: Arc<dyn Analyzer>,
}

/// Drives the analyser sequence for `analyze_image` tasks.
pub struct Executor {
    jobs: Arc<JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    ai_hook: AiHookClient,
    config: Config,
    cancellation: CancellationToken,
}

impl Executor {
    pub fn new(
        jobs: Arc<JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        config: Config,
        cancellation: CancellationToken,
    ) -> Self {
        let ai_hook = AiHookClient::new(
            config.ai_hook_url.clone(),
            config.ai_hook_provider.clone(),
            config.analyzer_timeout,
        );
        Self {
            jobs,
            artifacts,
            ai_hook,
            config,
            cancellation,
        }
    }

    fn stages(&self) -> Vec<Stage> {
        let flags = self.config.analyzers;
        vec![
            Stage {
                kind: AnalyzerKind::VulnerabilityScan,
                enabled: flags.vulnerability_scan_enabled,
                analyzer: Arc::new(crate::analyzer::SubprocessAnalyzer::grype()),
            },
            Stage {
                kind: AnalyzerKind::CisAudit,
                enabled: flags.cis_audit_enabled,
                analyzer: Arc::new(crate::analyzer::SubprocessAnalyzer::dockle()),
            },
            Stage {
                kind: AnalyzerKind::LayerEfficiency,
                enabled: flags.layer_efficiency_enabled,
                analyzer: Arc::new(crate::analyzer::SubprocessAnalyzer::dive()),
            },
        ]
    }

    async fn execute(&self, task: AnalyzeImageTask) -> Result<()> {
        if task.job_id.is_empty() {
            return Err(ExecutorError::Rejected("empty job_id".to_string()));
        }

        let job = self.jobs.get(&task.job_id).await?;
        if job.status.is_terminal() {
            info!(job_id = %task.job_id, status = %job.status, "redelivery of terminal job, acknowledging without re-running");
            return Ok(());
        }
        if job.status == JobStatus::Running {
            if let Some(started_at) = job.started_at {
                let elapsed = Utc::now() - started_at;
                if elapsed < chrono::Duration::from_std(self.config.lease_interval).unwrap_or_default() {
                    info!(job_id = %task.job_id, "job already RUNNING within lease interval, another worker holds it");
                    return Ok(());
                }
            }
        }

        if task.dockerfile.is_none() && task.image_ref.is_none() {
            self.jobs
                .set_status(
                    &task.job_id,
                    JobStatus::Skipped,
                    StatusUpdate {
                        started_at: Some(Utc::now()),
                        completed_at: Some(Utc::now()),
                        error: None,
                    },
                )
                .await?;
            info!(job_id = %task.job_id, "no dockerfile and no image reference, skipping");
            return Ok(());
        }

        let already_running = job.status == JobStatus::Running;
        if !already_running {
            self.jobs
                .set_status(
                    &task.job_id,
                    JobStatus::Running,
                    StatusUpdate {
                        started_at: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await?;
        }

        let Some(image_ref) = task.image_ref.as_deref() else {
            info!(job_id = %task.job_id, "dockerfile-only submission, returning success without running analysers");
            self.jobs
                .set_status(
                    &task.job_id,
                    JobStatus::Skipped,
                    StatusUpdate {
                        completed_at: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await?;
            return Ok(());
        };

        let mut any_stage_failed = false;
        for stage in self.stages() {
            if self.cancellation.is_cancelled() {
                return self.finalize_cancelled(&task.job_id).await;
            }
            if !stage.enabled {
                continue;
            }
            if let Err(e) = self.run_stage(&task.job_id, image_ref, stage).await {
                warn!(job_id = %task.job_id, error = %e, "analyser stage failed, continuing pipeline");
                any_stage_failed = true;
            }
        }

        if self.cancellation.is_cancelled() {
            return self.finalize_cancelled(&task.job_id).await;
        }

        if let Err(e) = self.ai_hook.synthesize(&task.job_id).await {
            warn!(job_id = %task.job_id, error = %e, "AI synthesis hook failed, finalising without report");
        }

        let final_status = if any_stage_failed { JobStatus::Failed } else { JobStatus::Completed };
        self.jobs
            .set_status(
                &task.job_id,
                final_status,
                StatusUpdate {
                    completed_at: Some(Utc::now()),
                    error: any_stage_failed.then(|| "one or more analyser stages failed".to_string()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    async fn finalize_cancelled(&self, job_id: &hygiene_ids::JobId) -> Result<()> {
        self.jobs
            .set_status(
                job_id,
                JobStatus::Cancelled,
                StatusUpdate {
                    completed_at: Some(Utc::now()),
                    error: Some("cancelled".to_string()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Run one stage: idempotent-skip if its artefact already exists, record
    /// timing regardless, write the artefact on success, advance progress.
    async fn run_stage(
        &self,
        job_id: &hygiene_ids::JobId,
        image_ref: &str,
        stage: Stage,
    ) -> Result<()> {
        let artifact_name = stage
            .kind
            .artifact_name()
            .expect("pipeline stages always have an artifact name");
        let band = progress_band(stage.kind);

        if self.artifacts.exists(job_id, artifact_name).await? {
            info!(job_id = %job_id, analyzer = stage.kind.timing_key(), "artefact already present, skipping replay");
            self.jobs.update_progress(job_id, band.exit).await?;
            return Ok(());
        }

        let mut timing = AnalyzerTiming::started(Utc::now());
        self.jobs.update_progress(job_id, band.enter).await?;

        let analyzer = stage.analyzer;
        let name = analyzer.name();
        let image_ref = image_ref.to_string();
        let outcome = AssertUnwindSafe(with_timeout(
            name,
            self.config.analyzer_timeout,
            async move { analyzer.run(&image_ref).await },
        ))
        .catch_unwind()
        .await;

        let result = match outcome {
            Ok(inner) => inner,
            Err(panic) => Err(ExecutorError::Panicked(name, panic_message(panic))),
        };

        let (success, error_text, bytes) = match result {
            Ok(bytes) => (true, None, Some(bytes)),
            Err(e) => (false, Some(e.to_string()), None),
        };
        timing.finish(Utc::now(), success, error_text.clone());
        self.jobs.set_tool_metric(job_id, stage.kind.timing_key(), timing).await?;

        if let Some(bytes) = bytes {
            if let Err(e) = self.artifacts.put(job_id, artifact_name, bytes).await {
                warn!(job_id = %job_id, analyzer = stage.kind.timing_key(), error = %e, "artefact write failed");
                self.jobs.update_progress(job_id, band.exit).await?;
                return Err(e.into());
            }
        }

        self.jobs.update_progress(job_id, band.exit).await?;

        if !success {
            return Err(ExecutorError::Analyzer {
                analyzer: name,
                source: error_text.unwrap_or_default().into(),
            });
        }
        Ok(())
    }
}

fn progress_band(kind: AnalyzerKind) -> defaults::ProgressBand {
    match kind {
        AnalyzerKind::VulnerabilityScan => defaults::BAND_VULNERABILITY_SCAN,
        AnalyzerKind::CisAudit => defaults::BAND_CIS_AUDIT,
        AnalyzerKind::LayerEfficiency => defaults::BAND_LAYER_EFFICIENCY,
        AnalyzerKind::ImageInspection => defaults::ProgressBand { enter: 0, exit: 0 },
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "analyser panicked with a non-string payload".to_string()
    }
}

#[async_trait]
impl TaskHandler for Executor {
    async fn handle(&self, task: QueueTask) -> hygiene_queue::Result<()> {
        match task {
            QueueTask::AnalyzeImage(payload) => self
                .execute(payload)
                .await
                .map_err(|e| QueueError::Handler(e.to_string(), e.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hygiene_db::{create_pool, DbConfig};
    use hygiene_ids::JobId;
    use hygiene_protocol::Job;
    use hygiene_store::FsArtifactStore;

    async fn test_store() -> Arc<JobStore> {
        let pool = create_pool(DbConfig::sqlite_memory()).await.unwrap();
        Arc::new(JobStore::connect(pool).await.unwrap())
    }

    #[tokio::test]
    async fn rejects_empty_job_id() {
        let jobs = test_store().await;
        let dir = tempfile::tempdir().unwrap();
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(dir.path()));
        let executor = Executor::new(jobs, artifacts, Config::from_env(), CancellationToken::new());

        // `JobId` is `#[serde(transparent)]` and validated only by `parse`,
        // so an empty one can still arrive over the wire from a malformed task.
        let empty_job_id: JobId = serde_json::from_str("\"\"").unwrap();
        let task = AnalyzeImageTask {
            job_id: empty_job_id,
            dockerfile: Some("FROM alpine".to_string()),
            image_ref: None,
            app_context: None,
            inspected_metadata: None,
        };
        let err = executor.execute(task).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Rejected(_)));
        assert!(!err.kind().is_retryable());
    }

    #[tokio::test]
    async fn neither_input_present_marks_job_skipped() {
        let jobs = test_store().await;
        let dir = tempfile::tempdir().unwrap();
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(dir.path()));

        let job_id = JobId::new();
        let job = Job::new(job_id.clone(), None, None, None, None, Utc::now()).unwrap();
        jobs.create(&job).await.unwrap();

        let executor = Executor::new(Arc::clone(&jobs), artifacts, Config::from_env(), CancellationToken::new());
        executor
            .execute(AnalyzeImageTask {
                job_id: job_id.clone(),
                dockerfile: None,
                image_ref: None,
                app_context: None,
                inspected_metadata: None,
            })
            .await
            .unwrap();

        let stored = jobs.get(&job_id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Skipped);
    }

    #[tokio::test]
    async fn dockerfile_only_is_skipped_without_running_analysers() {
        let jobs = test_store().await;
        let dir = tempfile::tempdir().unwrap();
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(dir.path()));

        let job_id = JobId::new();
        let job = Job::new(job_id.clone(), Some("FROM alpine".to_string()), None, None, None, Utc::now()).unwrap();
        jobs.create(&job).await.unwrap();

        let executor = Executor::new(Arc::clone(&jobs), artifacts, Config::from_env(), CancellationToken::new());
        executor
            .execute(AnalyzeImageTask {
                job_id: job_id.clone(),
                dockerfile: Some("FROM alpine".to_string()),
                image_ref: None,
                app_context: None,
                inspected_metadata: None,
            })
            .await
            .unwrap();

        let stored = jobs.get(&job_id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Skipped);
        assert!(stored.tool_timings.is_empty());
    }

    #[tokio::test]
    async fn redelivery_of_terminal_job_is_a_no_op() {
        let jobs = test_store().await;
        let dir = tempfile::tempdir().unwrap();
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(dir.path()));

        let job_id = JobId::new();
        let job = Job::new(job_id.clone(), None, None, None, None, Utc::now()).unwrap();
        jobs.create(&job).await.unwrap();
        jobs.set_status(
            &job_id,
            JobStatus::Cancelled,
            StatusUpdate {
                started_at: Some(Utc::now()),
                completed_at: Some(Utc::now()),
                error: None,
            },
        )
        .await
        .unwrap();

        let executor = Executor::new(Arc::clone(&jobs), artifacts, Config::from_env(), CancellationToken::new());
        executor
            .execute(AnalyzeImageTask {
                job_id: job_id.clone(),
                dockerfile: None,
                image_ref: Some("alpine:3.19".to_string()),
                app_context: None,
                inspected_metadata: None,
            })
            .await
            .unwrap();

        let stored = jobs.get(&job_id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
    }
}
