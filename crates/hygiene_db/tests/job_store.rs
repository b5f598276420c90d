use chrono::Utc;
use hygiene_db::{create_pool, DbConfig, JobListFilter, JobStore, StatusUpdate};
use hygiene_ids::JobId;
use hygiene_protocol::{AnalyzerTiming, Job, JobStatus};

async fn new_store() -> JobStore {
    let pool = create_pool(DbConfig::sqlite_memory()).await.unwrap();
    JobStore::connect(pool).await.unwrap()
}

fn sample_job() -> Job {
    Job::new(
        JobId::new(),
        None,
        Some("alpine:3.19".to_string()),
        None,
        None,
        Utc::now(),
    )
    .unwrap()
}

#[tokio::test]
async fn create_then_get_round_trips() {
    let store = new_store().await;
    let job = sample_job();
    store.create(&job).await.unwrap();

    let fetched = store.get(&job.id).await.unwrap();
    assert_eq!(fetched.id, job.id);
    assert_eq!(fetched.image_ref, job.image_ref);
    assert_eq!(fetched.status, JobStatus::Pending);
}

#[tokio::test]
async fn duplicate_create_is_rejected() {
    let store = new_store().await;
    let job = sample_job();
    store.create(&job).await.unwrap();
    let err = store.create(&job).await.unwrap_err();
    assert!(matches!(err, hygiene_db::DbError::Constraint(_)));
}

#[tokio::test]
async fn progress_never_decreases() {
    let store = new_store().await;
    let job = sample_job();
    store.create(&job).await.unwrap();
    store
        .set_status(&job.id, JobStatus::Running, StatusUpdate { started_at: Some(Utc::now()), ..Default::default() })
        .await
        .unwrap();

    store.update_progress(&job.id, 40).await.unwrap();
    store.update_progress(&job.id, 10).await.unwrap(); // stale write, ignored
    let fetched = store.get(&job.id).await.unwrap();
    assert_eq!(fetched.progress, 40);
}

#[tokio::test]
async fn terminal_status_pins_progress_to_100_and_is_final() {
    let store = new_store().await;
    let job = sample_job();
    store.create(&job).await.unwrap();
    let started = Utc::now();
    store
        .set_status(&job.id, JobStatus::Running, StatusUpdate { started_at: Some(started), ..Default::default() })
        .await
        .unwrap();
    store
        .set_status(
            &job.id,
            JobStatus::Completed,
            StatusUpdate { completed_at: Some(Utc::now()), ..Default::default() },
        )
        .await
        .unwrap();

    let fetched = store.get(&job.id).await.unwrap();
    assert_eq!(fetched.status, JobStatus::Completed);
    assert_eq!(fetched.progress, 100);
    assert!(fetched.completed_at.is_some());

    // Cannot transition out of a terminal status.
    let err = store
        .set_status(&job.id, JobStatus::Running, StatusUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, hygiene_db::DbError::InvalidState(_)));

    // Progress updates after terminal are silently dropped.
    store.update_progress(&job.id, 5).await.unwrap();
    let fetched = store.get(&job.id).await.unwrap();
    assert_eq!(fetched.progress, 100);
}

#[tokio::test]
async fn completing_without_started_at_is_rejected() {
    let store = new_store().await;
    let job = sample_job();
    store.create(&job).await.unwrap();

    let err = store
        .set_status(
            &job.id,
            JobStatus::Completed,
            StatusUpdate { completed_at: Some(Utc::now()), ..Default::default() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, hygiene_db::DbError::InvalidState(_)));
}

#[tokio::test]
async fn tool_metrics_accumulate_per_analyzer() {
    let store = new_store().await;
    let job = sample_job();
    store.create(&job).await.unwrap();

    let mut timing = AnalyzerTiming::started(Utc::now());
    timing.finish(Utc::now(), true, None);
    store.set_tool_metric(&job.id, "grype", timing.clone()).await.unwrap();

    let mut failing = AnalyzerTiming::started(Utc::now());
    failing.finish(Utc::now(), false, Some("boom".to_string()));
    store.set_tool_metric(&job.id, "dockle", failing).await.unwrap();

    let fetched = store.get(&job.id).await.unwrap();
    assert_eq!(fetched.tool_timings.len(), 2);
    assert!(fetched.tool_timings["grype"].success);
    assert!(!fetched.tool_timings["dockle"].success);
    assert_eq!(fetched.tool_timings["dockle"].error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn list_filters_by_status_and_excludes_soft_deleted() {
    let store = new_store().await;
    let job_a = sample_job();
    let job_b = sample_job();
    store.create(&job_a).await.unwrap();
    store.create(&job_b).await.unwrap();

    store
        .set_status(&job_a.id, JobStatus::Queued, StatusUpdate::default())
        .await
        .unwrap();

    let (jobs, total) = store
        .list(JobListFilter { status: Some(JobStatus::Queued), limit: 10, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(jobs[0].id, job_a.id);

    store.soft_delete(&job_b.id).await.unwrap();
    let (jobs, total) = store.list(JobListFilter { limit: 10, ..Default::default() }).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, job_a.id);
}

#[tokio::test]
async fn get_missing_job_is_not_found() {
    let store = new_store().await;
    let err = store.get(&JobId::new()).await.unwrap_err();
    assert!(matches!(err, hygiene_db::DbError::NotFound(_)));
}
