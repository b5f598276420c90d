//! Request/response DTOs for the Submission & Query API.

use chrono::{DateTime, Utc};
use hygiene_ids::JobId;
use serde::{Deserialize, Serialize};

use crate::types::{ImageMetadata, Job, JobStatus};

/// `POST /analyze` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub dockerfile: Option<String>,
    pub image_ref: Option<String>,
    pub app_context: Option<String>,
    /// Opaque, never logged; decrypted only in request-local scope.
    pub registry_credentials: Option<String>,
}

/// `POST /analyze` response body (202 Accepted).
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub stream_url: String,
    pub image_info: Option<ImageMetadata>,
}

/// `GET /jobs` query filters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    pub time_window_hours: Option<i64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// `GET /jobs` response body.
#[derive(Debug, Clone, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

/// Terminal-state inline summary attached to `GET /jobs/:id` responses,
/// read from the artifact store when the job is done.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub report_available: bool,
    pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: Job,
    pub summary: Option<JobSummary>,
}

/// `GET /jobs/:id/stream` SSE event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub progress: i32,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct TerminalEvent {
    pub progress: i32,
    pub status: JobStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// The uniform error envelope returned at the API boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// `POST /compare` request/response — out-of-scope detail, kept as
/// a typed stub so the route can exist without specifying diff semantics.
#[derive(Debug, Clone, Deserialize)]
pub struct CompareRequest {
    pub job_id_a: JobId,
    pub job_id_b: JobId,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareResponse {
    pub job_id_a: JobId,
    pub job_id_b: JobId,
    pub note: String,
}

/// `GET /health`, `/health/ready`, `/health/live` response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
}
