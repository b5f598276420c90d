//! Domain types shared across the submission API, the queue, and the worker.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hygiene_ids::JobId;
use serde::{Deserialize, Serialize};

use crate::defaults;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Skipped,
    Unknown,
}

impl JobStatus {
    /// Once a job reaches one of these, it never changes again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Skipped
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Skipped => "SKIPPED",
            JobStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "QUEUED" => Ok(JobStatus::Queued),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            "SKIPPED" => Ok(JobStatus::Skipped),
            "UNKNOWN" => Ok(JobStatus::Unknown),
            other => Err(format!("unrecognized job status: {other}")),
        }
    }
}

/// Classification of a submission by which inputs are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    DockerfileOnly,
    ImageOnly,
    Both,
}

impl Scenario {
    /// Classify a submission from the presence of its two optional inputs.
    ///
    /// Returns `None` when neither input is present — that submission is
    /// invalid and must be rejected before a scenario is assigned.
    pub fn classify(has_dockerfile: bool, has_image_ref: bool) -> Option<Self> {
        match (has_dockerfile, has_image_ref) {
            (true, true) => Some(Scenario::Both),
            (true, false) => Some(Scenario::DockerfileOnly),
            (false, true) => Some(Scenario::ImageOnly),
            (false, false) => None,
        }
    }
}

/// One layer of an inspected image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub digest: String,
    pub size_bytes: u64,
}

/// Metadata captured synchronously at submission time for image-bearing jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub digest: String,
    pub architecture: String,
    pub os: String,
    pub layers: Vec<LayerInfo>,
}

/// The four analysers the pipeline drives, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    /// Stage A — synchronous at submission, not a pipeline stage proper.
    ImageInspection,
    /// Stage B — vulnerability scan.
    VulnerabilityScan,
    /// Stage C — CIS-benchmark audit.
    CisAudit,
    /// Stage D — layer-efficiency analysis.
    LayerEfficiency,
}

impl AnalyzerKind {
    /// The conventional name recorded in the per-analyser timing map. Stable
    /// and used as a map key; not meant to be user-facing prose.
    pub fn timing_key(self) -> &'static str {
        match self {
            AnalyzerKind::ImageInspection => "image_inspection",
            AnalyzerKind::VulnerabilityScan => "grype",
            AnalyzerKind::CisAudit => "dockle",
            AnalyzerKind::LayerEfficiency => "dive",
        }
    }

    /// The conventional artifact file name this analyser's output is stored
    /// under. `ImageInspection` has no artifact of its own.
    pub fn artifact_name(self) -> Option<ArtifactName> {
        match self {
            AnalyzerKind::ImageInspection => None,
            AnalyzerKind::VulnerabilityScan => Some(ArtifactName::Grype),
            AnalyzerKind::CisAudit => Some(ArtifactName::Dockle),
            AnalyzerKind::LayerEfficiency => Some(ArtifactName::Dive),
        }
    }

    /// The pipeline stages that actually run inside the executor's sequential
    /// loop, in order (excludes the synchronous submission-time inspection).
    pub fn pipeline_sequence() -> [AnalyzerKind; 3] {
        [
            AnalyzerKind::VulnerabilityScan,
            AnalyzerKind::CisAudit,
            AnalyzerKind::LayerEfficiency,
        ]
    }
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.timing_key())
    }
}

/// Write-once artefact names. Names are conventional, not semantic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactName {
    Grype,
    Dockle,
    Dive,
    Report,
    Draft,
}

impl ArtifactName {
    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactName::Grype => defaults::ARTIFACT_GRYPE,
            ArtifactName::Dockle => defaults::ARTIFACT_DOCKLE,
            ArtifactName::Dive => defaults::ARTIFACT_DIVE,
            ArtifactName::Report => defaults::ARTIFACT_REPORT,
            ArtifactName::Draft => defaults::ARTIFACT_DRAFT,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ArtifactName::Grype | ArtifactName::Dockle | ArtifactName::Dive => "application/json",
            ArtifactName::Report | ArtifactName::Draft => "text/markdown; charset=utf-8",
        }
    }

    pub fn parse(file_name: &str) -> Option<Self> {
        match file_name {
            s if s == defaults::ARTIFACT_GRYPE => Some(ArtifactName::Grype),
            s if s == defaults::ARTIFACT_DOCKLE => Some(ArtifactName::Dockle),
            s if s == defaults::ARTIFACT_DIVE => Some(ArtifactName::Dive),
            s if s == defaults::ARTIFACT_REPORT => Some(ArtifactName::Report),
            s if s == defaults::ARTIFACT_DRAFT => Some(ArtifactName::Draft),
            _ => None,
        }
    }
}

/// Per-analyser timing/outcome record, appended to as the pipeline runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerTiming {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub success: bool,
    pub error: Option<String>,
}

impl AnalyzerTiming {
    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(now),
            ..Default::default()
        }
    }

    pub fn finish(&mut self, now: DateTime<Utc>, success: bool, error: Option<String>) {
        self.completed_at = Some(now);
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
        self.success = success;
        self.error = error;
    }
}

/// The central durable entity: one submission, one pipeline execution, one report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub dockerfile: Option<String>,
    pub image_ref: Option<String>,
    pub app_context: Option<String>,
    pub scenario: Scenario,
    pub image_metadata: Option<ImageMetadata>,
    pub status: JobStatus,
    pub progress: i32,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Keyed by `AnalyzerKind::timing_key()`.
    pub tool_timings: BTreeMap<String, AnalyzerTiming>,
    pub error: Option<String>,
    pub deleted: bool,
}

impl Job {
    /// Construct a brand-new job in `PENDING` state, not yet queued.
    pub fn new(
        id: JobId,
        dockerfile: Option<String>,
        image_ref: Option<String>,
        app_context: Option<String>,
        image_metadata: Option<ImageMetadata>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let scenario = Scenario::classify(dockerfile.is_some(), image_ref.is_some())?;
        Some(Self {
            id,
            dockerfile,
            image_ref,
            app_context,
            scenario,
            image_metadata,
            status: JobStatus::Pending,
            progress: 0,
            created_at: now,
            queued_at: None,
            started_at: None,
            completed_at: None,
            tool_timings: BTreeMap::new(),
            error: None,
            deleted: false,
        })
    }
}

/// The queue envelope carried from the API to the executor.
/// `job_id` is the idempotency key: a task is bound to at most one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeImageTask {
    pub job_id: JobId,
    pub dockerfile: Option<String>,
    pub image_ref: Option<String>,
    pub app_context: Option<String>,
    pub inspected_metadata: Option<ImageMetadata>,
}

/// The single task kind the queue carries today. Modeled as a sum type so a
/// second kind can be added without touching every call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum QueueTask {
    AnalyzeImage(AnalyzeImageTask),
}

impl QueueTask {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueTask::AnalyzeImage(t) => &t.job_id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            QueueTask::AnalyzeImage(_) => "analyze_image",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_classification_matches_spec_table() {
        assert_eq!(Scenario::classify(true, true), Some(Scenario::Both));
        assert_eq!(Scenario::classify(true, false), Some(Scenario::DockerfileOnly));
        assert_eq!(Scenario::classify(false, true), Some(Scenario::ImageOnly));
        assert_eq!(Scenario::classify(false, false), None);
    }

    #[test]
    fn terminal_statuses_are_exactly_four() {
        let terminal: Vec<_> = [
            JobStatus::Pending,
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Skipped,
            JobStatus::Unknown,
        ]
        .into_iter()
        .filter(|s| s.is_terminal())
        .collect();
        assert_eq!(terminal.len(), 4);
    }

    #[test]
    fn analyzer_artifact_round_trips() {
        for kind in AnalyzerKind::pipeline_sequence() {
            let artifact = kind.artifact_name().unwrap();
            assert_eq!(ArtifactName::parse(artifact.file_name()), Some(artifact));
        }
    }

    #[test]
    fn timing_records_duration_on_finish() {
        let start = Utc::now();
        let mut timing = AnalyzerTiming::started(start);
        let end = start + chrono::Duration::milliseconds(250);
        timing.finish(end, true, None);
        assert_eq!(timing.duration_ms, Some(250));
        assert!(timing.success);
    }
}
