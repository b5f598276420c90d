//! `GET /health`, `/health/ready`, `/health/live`: ambient endpoints required
//! by any deployed service's load balancer and orchestrator probes.

use axum::extract::State;
use axum::Json;
use hygiene_protocol::http_types::HealthResponse;

use crate::error::ApiError;
use crate::state::AppState;

/// Unconditional liveness: process is up and answering HTTP.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.config.service_name.clone(),
    })
}

/// Readiness: the job store must actually answer a query, not just exist.
pub async fn ready(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state
        .jobs
        .list(hygiene_db::JobListFilter { limit: 1, ..Default::default() })
        .await?;
    Ok(Json(HealthResponse {
        status: "ready",
        service: state.config.service_name.clone(),
    }))
}

/// Liveness probe distinct from readiness: never touches the database, so a
/// slow/degraded store doesn't get the process killed by an orchestrator.
pub async fn live(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "alive",
        service: state.config.service_name.clone(),
    })
}
