//! `POST /analyze`.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use hygiene_ids::JobId;
use hygiene_protocol::http_types::{AnalyzeRequest, AnalyzeResponse};
use hygiene_protocol::{AnalyzeImageTask, Job, JobStatus};
use hygiene_queue::EnqueueOptions;
use hygiene_security::CredentialCipher;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<(axum::http::StatusCode, Json<AnalyzeResponse>), ApiError> {
    if req.dockerfile.is_none() && req.image_ref.is_none() {
        return Err(ApiError::validation("at least one of dockerfile or image_ref is required"));
    }

    // Credentials are opaque to the core: the cipher only needs to
    // round-trip; no adapter ever reads the plaintext here.
    if let Some(creds) = &req.registry_credentials {
        if let Some(key) = &state.config.encryption_key_base64 {
            match CredentialCipher::from_base64_key(key) {
                Ok(cipher) => {
                    if let Err(e) = cipher.encrypt(creds.as_bytes()) {
                        warn!(error = %e, "failed to encrypt registry credentials, submission continues");
                    }
                }
                Err(e) => warn!(error = %e, "invalid encryption key configured, registry credentials discarded"),
            }
        }
    }

    let image_metadata = if let (Some(image_ref), true) =
        (req.image_ref.as_deref(), state.config.analyzers.image_inspector_enabled)
    {
        Some(
            state
                .inspector
                .inspect(image_ref)
                .await
                .map_err(|e| ApiError::validation(e.to_string()))?,
        )
    } else {
        None
    };

    let job_id = JobId::new();
    let now = Utc::now();
    let mut job = Job::new(
        job_id.clone(),
        req.dockerfile.clone(),
        req.image_ref.clone(),
        req.app_context.clone(),
        image_metadata.clone(),
        now,
    )
    .expect("at least one input was validated above");
    job.status = JobStatus::Queued;
    job.queued_at = Some(now);

    state.jobs.create(&job).await?;

    let task = AnalyzeImageTask {
        job_id: job_id.clone(),
        dockerfile: req.dockerfile,
        image_ref: req.image_ref,
        app_context: req.app_context,
        inspected_metadata: image_metadata.clone(),
    };

    if let Err(e) = state
        .queue
        .enqueue("analyze_image", hygiene_protocol::QueueTask::AnalyzeImage(task), EnqueueOptions::default())
        .await
    {
        // A dangling QUEUED record with no backing task must not be left as
        // the user-visible state — roll it to FAILED immediately.
        warn!(job_id = %job_id, error = %e, "enqueue failed after job record was written, marking job FAILED");
        let _ = state
            .jobs
            .set_status(
                &job_id,
                JobStatus::Failed,
                hygiene_db::StatusUpdate {
                    started_at: Some(now),
                    completed_at: Some(Utc::now()),
                    error: Some(format!("failed to enqueue: {e}")),
                },
            )
            .await;
        return Err(ApiError::from(e));
    }

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(AnalyzeResponse {
            job_id: job_id.clone(),
            status: JobStatus::Queued,
            stream_url: format!("/api/v1/jobs/{job_id}/stream"),
            image_info: image_metadata,
        }),
    ))
}

