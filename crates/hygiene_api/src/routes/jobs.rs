//! `GET /jobs`, `GET /jobs/:id`, `DELETE /jobs/:id`.

use axum::extract::{Path, Query, State};
use axum::Json;
use hygiene_db::JobListFilter;
use hygiene_ids::JobId;
use hygiene_protocol::http_types::{JobListQuery, JobListResponse, JobResponse, JobSummary};
use hygiene_protocol::types::ArtifactName;
use hygiene_protocol::JobStatus;

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_PAGE_LIMIT: u32 = 20;

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let filter = JobListFilter {
        user_id: None,
        status: query.status,
        since: query
            .time_window_hours
            .map(|hours| chrono::Utc::now() - chrono::Duration::hours(hours)),
        page: query.page.unwrap_or(0),
        limit,
        include_deleted: false,
    };

    let (jobs, total) = state.jobs.list(filter).await?;
    Ok(Json(JobListResponse {
        jobs,
        total,
        page: query.page.unwrap_or(0),
        limit,
    }))
}

pub async fn get(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job_id = JobId::parse(&job_id).map_err(|e| ApiError::validation(e.to_string()))?;
    let job = state.jobs.get(&job_id).await?;

    let summary = if job.status.is_terminal() {
        let mut artifacts = Vec::new();
        for name in [
            ArtifactName::Grype,
            ArtifactName::Dockle,
            ArtifactName::Dive,
            ArtifactName::Report,
            ArtifactName::Draft,
        ] {
            if state.artifacts.exists(&job_id, name).await? {
                artifacts.push(name.file_name().to_string());
            }
        }
        Some(JobSummary {
            report_available: artifacts.iter().any(|a| a == ArtifactName::Report.file_name()),
            artifacts,
        })
    } else {
        None
    };

    Ok(Json(JobResponse { job, summary }))
}

pub async fn delete(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<axum::http::StatusCode, ApiError> {
    let job_id = JobId::parse(&job_id).map_err(|e| ApiError::validation(e.to_string()))?;
    state.jobs.soft_delete(&job_id).await?;
    state.artifacts.delete_all(&job_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Shared by `jobs.rs` and `stream.rs` to classify a response status
/// consistently; kept here since both need "is this job done yet".
pub fn is_terminal(status: JobStatus) -> bool {
    status.is_terminal()
}
