//! End-to-end router tests: a real axum server bound to an ephemeral port,
//! driven over HTTP with `reqwest`, mirroring the integration-test style
//! used for the job store and artifact store crates.

use std::sync::Arc;

use async_trait::async_trait;
use hygiene_api::{router, AppState};
use hygiene_db::{create_pool, DbConfig, JobStore};
use hygiene_protocol::types::ImageMetadata;
use hygiene_protocol::Config;
use hygiene_queue::InMemoryQueue;
use hygiene_store::FsArtifactStore;
use hygiene_worker::{ExecutorError, ImageInspector};

struct StubInspector;

#[async_trait]
impl ImageInspector for StubInspector {
    async fn inspect(&self, _image_ref: &str) -> Result<ImageMetadata, ExecutorError> {
        Err(ExecutorError::Rejected("stub inspector never resolves".to_string()))
    }
}

async fn spawn_server() -> String {
    let pool = create_pool(DbConfig::sqlite_memory()).await.unwrap();
    let jobs = Arc::new(JobStore::connect(pool).await.unwrap());
    let dir = tempfile::tempdir().unwrap();
    let artifacts = Arc::new(FsArtifactStore::new(dir.path()));
    let queue = InMemoryQueue::new(Some(1), Some(Arc::clone(&jobs)));
    let inspector = Arc::new(StubInspector);
    let mut config = Config::from_env();
    config.service_name = "hygiene-test".to_string();
    let state = AppState {
        jobs,
        artifacts,
        queue,
        inspector,
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    // Leak the tempdir for the life of the test process; cleaned up at exit.
    std::mem::forget(dir);
    format!("http://{addr}")
}

#[tokio::test]
async fn health_endpoint_reports_service_name() {
    let base = spawn_server().await;
    let resp = reqwest::get(format!("{base}/api/v1/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "hygiene-test");
}

#[tokio::test]
async fn analyze_without_dockerfile_or_image_ref_is_rejected() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/api/v1/analyze"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "validation");
}

#[tokio::test]
async fn analyze_with_dockerfile_is_accepted_and_queryable() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/api/v1/analyze"))
        .json(&serde_json::json!({ "dockerfile": "FROM alpine:3.19" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let body: serde_json::Value = resp.json().await.unwrap();
    let job_id = body["job_id"].as_str().unwrap().to_string();

    // Give the in-memory worker pool a moment to pick the task up.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let resp = client.get(format!("{base}/api/v1/jobs/{job_id}")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "SKIPPED");
}

#[tokio::test]
async fn unknown_job_id_returns_404() {
    let base = spawn_server().await;
    let resp = reqwest::get(format!("{base}/api/v1/jobs/{}", uuid::Uuid::new_v4())).await.unwrap();
    assert_eq!(resp.status(), 404);
}
