//! The Submission & Query API: the synchronous envelope around
//! the pipeline. This crate owns the axum router and its handlers; the
//! composition root (the `hygiene` binary) owns the listener and the
//! process lifecycle.

pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Build the full `/api/v1` router over a shared [`AppState`].
///
/// This function is the one place route paths are declared, so `hygiene`'s
/// `main.rs` never touches axum types directly.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/analyze", post(routes::analyze::submit))
        .route("/compare", post(routes::compare::compare))
        .route("/jobs", get(routes::jobs::list))
        .route("/jobs/:id", get(routes::jobs::get).delete(routes::jobs::delete))
        .route("/jobs/:id/stream", get(routes::stream::stream))
        .route("/jobs/:id/:artifact", get(routes::artifacts::download))
        .route("/metrics/queue", get(routes::metrics::queue))
        .route("/metrics/jobs", get(routes::metrics::jobs))
        .route("/metrics/tools", get(routes::metrics::tools))
        .route("/health", get(routes::health::health))
        .route("/health/ready", get(routes::health::ready))
        .route("/health/live", get(routes::health::live))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
