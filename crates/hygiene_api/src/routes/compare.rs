//! `POST /compare`: diff semantics between two jobs' results are an
//! explicit Non-goal, so this handler only validates that both jobs exist
//! and have finished, and hands back a typed acknowledgement rather than a
//! computed diff.

use axum::extract::State;
use axum::Json;
use hygiene_protocol::http_types::{CompareRequest, CompareResponse};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn compare(
    State(state): State<AppState>,
    Json(req): Json<CompareRequest>,
) -> Result<Json<CompareResponse>, ApiError> {
    let job_a = state.jobs.get(&req.job_id_a).await?;
    let job_b = state.jobs.get(&req.job_id_b).await?;

    let note = if !job_a.status.is_terminal() || !job_b.status.is_terminal() {
        "one or both jobs have not finished yet; comparison is only meaningful once both are terminal".to_string()
    } else {
        "diff computation is out of scope; fetch each job's artifacts and compare them directly".to_string()
    };

    Ok(Json(CompareResponse {
        job_id_a: job_a.id,
        job_id_b: job_b.id,
        note,
    }))
}
