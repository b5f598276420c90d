//! `GET /jobs/:id/stream`: server-sent progress events.
//!
//! The job store is the single source of truth — no in-memory replica is
//! trusted across handlers — so the stream is produced by polling it at a
//! short interval and de-duplicating on `(progress, status)` rather than
//! wiring a broadcast channel through the queue and executor; see
//! `DESIGN.md` for why that simplification is safe here.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use hygiene_db::JobStore;
use hygiene_ids::JobId;
use hygiene_protocol::http_types::{ProgressEvent, TerminalEvent};
use hygiene_protocol::JobStatus;

use crate::error::ApiError;
use crate::state::AppState;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Poll cursor: `None` once the terminal event has been emitted, ending the stream.
struct Cursor {
    jobs: Arc<JobStore>,
    job_id: JobId,
    last_seen: Option<(i32, JobStatus)>,
    done: bool,
}

pub async fn stream(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let job_id = JobId::parse(&job_id).map_err(|e| ApiError::validation(e.to_string()))?;
    // Fail fast if the job doesn't exist at all, rather than opening a stream
    // that would poll forever.
    state.jobs.get(&job_id).await?;

    let cursor = Cursor {
        jobs: state.jobs,
        job_id,
        last_seen: None,
        done: false,
    };

    let events = stream::unfold(cursor, |mut cursor| async move {
        loop {
            if cursor.done {
                return None;
            }
            let job = match cursor.jobs.get(&cursor.job_id).await {
                Ok(job) => job,
                Err(_) => {
                    cursor.done = true;
                    return None;
                }
            };
            let current = (job.progress, job.status);
            if cursor.last_seen != Some(current) {
                cursor.last_seen = Some(current);
                let event = if job.status.is_terminal() {
                    cursor.done = true;
                    let payload = TerminalEvent {
                        progress: job.progress,
                        status: job.status,
                        completed_at: job.completed_at,
                        error: job.error.clone(),
                    };
                    Event::default().event("done").data(serde_json::to_string(&payload).unwrap_or_default())
                } else {
                    let payload = ProgressEvent {
                        progress: job.progress,
                        status: job.status,
                    };
                    Event::default()
                        .event("progress")
                        .data(serde_json::to_string(&payload).unwrap_or_default())
                };
                return Some((Ok(event), cursor));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
