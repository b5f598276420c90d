//! The composition root's handle, threaded through every route via
//! `axum::extract::State`: explicit `Arc<...>` dependencies, no ambient
//! singletons.

use std::sync::Arc;

use hygiene_db::JobStore;
use hygiene_protocol::Config;
use hygiene_queue::WorkQueue;
use hygiene_store::ArtifactStore;
use hygiene_worker::ImageInspector;

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub inspector: Arc<dyn ImageInspector>,
    pub config: Arc<Config>,
}
