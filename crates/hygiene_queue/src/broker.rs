//! The durable, SQL-backed work queue (the "process-external broker"
//! backend). A SQLite table plays the role of the durable broker: claim a
//! row atomically inside a transaction, then operate on it outside the lock.
//!
//! A fixed pool of poller tasks claims rows concurrently without
//! double-delivery, rather than a single synchronous poll loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hygiene_db::{JobStore, StatusUpdate};
use hygiene_ids::{JobId, TaskId};
use hygiene_protocol::{metrics::QueueStats, AsErrorKind, JobStatus, QueueTask};
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::{QueueError, Result};
use crate::task::{EnqueueOptions, HandlerRef, TaskState};
use crate::trait_def::WorkQueue;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A durable, crash-surviving work queue backed by a SQL table.
///
/// Redelivery: a row claimed by a poller that then crashes stays `ACTIVE`
/// forever unless something reclaims it — the executor's own idempotent
/// replay is what makes that safe: it treats redelivery of a job whose
/// prior attempt never finished as "resume, don't restart."
pub struct BrokerQueue {
    pool: SqlitePool,
    handlers: RwLock<HashMap<String, HandlerRef>>,
    pollers: usize,
    jobs: Option<Arc<JobStore>>,
}

impl BrokerQueue {
    /// Open the broker over an already-migrated pool and spawn `pollers`
    /// background claim loops (default: `num_cpus::get()`). `jobs`, when
    /// given, is used to write a terminal `FAILED` status back to the job
    /// record once a task exhausts its retries, so a job is never left
    /// stuck non-terminal.
    pub async fn connect(pool: SqlitePool, pollers: Option<usize>, jobs: Option<Arc<JobStore>>) -> Result<Arc<Self>> {
        ensure_schema(&pool).await?;
        let queue = Arc::new(Self {
            pool,
            handlers: RwLock::new(HashMap::new()),
            pollers: pollers.unwrap_or_else(num_cpus::get).max(1),
            jobs,
        });
        for idx in 0..queue.pollers {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.poll_loop(idx).await });
        }
        Ok(queue)
    }

    async fn poll_loop(self: Arc<Self>, poller_idx: usize) {
        loop {
            match self.claim_one().await {
                Ok(Some(row)) => self.process(row).await,
                Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
                Err(e) => {
                    error!(poller = poller_idx, error = %e, "broker poll failed, backing off");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }

    /// Atomically claim the oldest queued row: select then update inside
    /// one transaction, so no two pollers can claim the same row.
    async fn claim_one(&self) -> Result<Option<ClaimedRow>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT task_id, job_id, kind, payload_json, attempt, max_retry, retry_backoff_ms \
             FROM hygiene_queue_tasks WHERE status = 'QUEUED' ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let task_id: String = row.try_get("task_id")?;
        sqlx::query(
            "UPDATE hygiene_queue_tasks SET status = 'ACTIVE', claimed_at = CURRENT_TIMESTAMP WHERE task_id = ?",
        )
        .bind(&task_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(ClaimedRow {
            task_id: TaskId::parse(&task_id).map_err(|e| QueueError::Corrupt(e.to_string()))?,
            job_id: row.try_get::<String, _>("job_id")?,
            kind: row.try_get("kind")?,
            payload_json: row.try_get("payload_json")?,
            attempt: row.try_get("attempt")?,
            max_retry: row.try_get("max_retry")?,
            retry_backoff_ms: row.try_get("retry_backoff_ms")?,
        }))
    }

    async fn process(&self, row: ClaimedRow) {
        let payload: QueueTask = match serde_json::from_str(&row.payload_json) {
            Ok(p) => p,
            Err(e) => {
                error!(job_id = %row.job_id, task_id = %row.task_id, error = %e, "corrupt task payload, failing permanently");
                let _ = self.finish(&row.task_id, "FAILED", Some(e.to_string())).await;
                return;
            }
        };

        let handler = self.handlers.read().await.get(&row.kind).cloned();
        let Some(handler) = handler else {
            warn!(kind = %row.kind, job_id = %row.job_id, task_id = %row.task_id, "no handler registered, failing task");
            let _ = self
                .finish(&row.task_id, "FAILED", Some(format!("no handler for kind {}", row.kind)))
                .await;
            return;
        };

        match handler.handle(payload).await {
            Ok(()) => {
                let _ = self.finish(&row.task_id, "COMPLETED", None).await;
            }
            Err(e) if e.kind().is_retryable() && row.attempt < row.max_retry => {
                warn!(task_id = %row.task_id, attempt = row.attempt + 1, error = %e, "retrying task");
                let backoff = Duration::from_millis(row.retry_backoff_ms) * (row.attempt as u32 + 1);
                tokio::time::sleep(backoff).await;
                let _ = self.requeue(&row.task_id, row.attempt + 1).await;
            }
            Err(e) => {
                error!(task_id = %row.task_id, error = %e, "task exhausted retries");
                let _ = self.finish(&row.task_id, "FAILED", Some(e.to_string())).await;
            }
        }
    }

    async fn finish(&self, task_id: &TaskId, status: &str, error: Option<String>) -> Result<()> {
        sqlx::query(
            "UPDATE hygiene_queue_tasks SET status = ?, error = ?, completed_at = CURRENT_TIMESTAMP WHERE task_id = ?",
        )
        .bind(status)
        .bind(&error)
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;

        if status == "FAILED" {
            self.fail_job_record(task_id, error.unwrap_or_else(|| "task failed".to_string())).await;
        }
        Ok(())
    }

    /// Write the terminal `FAILED` status to the job record bound to
    /// `task_id`, so a job whose task failed permanently is never left stuck
    /// non-terminal. No-op when no job store handle was configured.
    async fn fail_job_record(&self, task_id: &TaskId, error: String) {
        let Some(jobs) = &self.jobs else { return };
        let row = match sqlx::query("SELECT job_id FROM hygiene_queue_tasks WHERE task_id = ?")
            .bind(task_id.as_str())
            .fetch_optional(&self.pool)
            .await
        {
            Ok(Some(row)) => row,
            Ok(None) => return,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "failed to look up job id for failed task");
                return;
            }
        };
        let job_id_raw: String = match row.try_get("job_id") {
            Ok(v) => v,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "failed to read job id for failed task");
                return;
            }
        };
        let job_id = match JobId::parse(&job_id_raw) {
            Ok(id) => id,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "failed task has an unparseable job id");
                return;
            }
        };

        let now = chrono::Utc::now();
        if let Err(e) = jobs
            .set_status(
                &job_id,
                JobStatus::Failed,
                StatusUpdate {
                    started_at: Some(now),
                    completed_at: Some(now),
                    error: Some(error),
                },
            )
            .await
        {
            warn!(job_id = %job_id, task_id = %task_id, error = %e, "failed to record job as FAILED after task failure");
        }
    }

    async fn requeue(&self, task_id: &TaskId, attempt: i64) -> Result<()> {
        sqlx::query("UPDATE hygiene_queue_tasks SET status = 'QUEUED', attempt = ?, claimed_at = NULL WHERE task_id = ?")
            .bind(attempt)
            .bind(task_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

struct ClaimedRow {
    task_id: TaskId,
    job_id: String,
    kind: String,
    payload_json: String,
    attempt: i64,
    max_retry: i64,
    retry_backoff_ms: i64,
}

async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS hygiene_queue_tasks (
            task_id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            queue_name TEXT NOT NULL DEFAULT 'default',
            kind TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'QUEUED',
            attempt INTEGER NOT NULL DEFAULT 0,
            max_retry INTEGER NOT NULL DEFAULT 3,
            retry_backoff_ms INTEGER NOT NULL DEFAULT 2000,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            claimed_at TEXT,
            completed_at TEXT,
            error TEXT
        )"#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_queue_tasks_status ON hygiene_queue_tasks(status, created_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_queue_tasks_job ON hygiene_queue_tasks(job_id)")
        .execute(pool)
        .await?;
    Ok(())
}

#[async_trait]
impl WorkQueue for BrokerQueue {
    async fn enqueue(&self, kind: &str, payload: QueueTask, opts: EnqueueOptions) -> Result<TaskId> {
        let task_id = TaskId::new();
        let job_id = payload.job_id().clone();
        let payload_json = serde_json::to_string(&payload)?;

        sqlx::query(
            "INSERT INTO hygiene_queue_tasks (task_id, job_id, kind, payload_json, max_retry, retry_backoff_ms) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(task_id.as_str())
        .bind(job_id.as_str())
        .bind(kind)
        .bind(payload_json)
        .bind(opts.max_retry as i64)
        .bind(opts.retry_backoff.as_millis() as i64)
        .execute(&self.pool)
        .await?;

        info!(job_id = %job_id, task_id = %task_id, kind, "enqueued task to broker");
        Ok(task_id)
    }

    async fn register(&self, kind: &str, handler: HandlerRef) {
        self.handlers.write().await.insert(kind.to_string(), handler);
    }

    async fn stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            r#"SELECT
                SUM(CASE WHEN status = 'ACTIVE' THEN 1 ELSE 0 END) AS active,
                SUM(CASE WHEN status = 'QUEUED' THEN 1 ELSE 0 END) AS pending,
                SUM(CASE WHEN status = 'COMPLETED' THEN 1 ELSE 0 END) AS completed,
                SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END) AS failed,
                COUNT(*) AS scheduled
               FROM hygiene_queue_tasks"#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueStats {
            active: row.try_get::<Option<i64>, _>("active")?.unwrap_or(0) as u64,
            pending: row.try_get::<Option<i64>, _>("pending")?.unwrap_or(0) as u64,
            scheduled: row.try_get::<i64, _>("scheduled")? as u64,
            completed: row.try_get::<Option<i64>, _>("completed")?.unwrap_or(0) as u64,
            failed: row.try_get::<Option<i64>, _>("failed")?.unwrap_or(0) as u64,
        })
    }

    async fn job_status(&self, job_id: &JobId) -> Result<Option<TaskState>> {
        let row = sqlx::query(
            "SELECT status FROM hygiene_queue_tasks WHERE job_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(job_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let status: String = row.try_get("status")?;
        Ok(Some(match status.as_str() {
            "QUEUED" => TaskState::Pending,
            "ACTIVE" => TaskState::Running,
            "COMPLETED" => TaskState::Completed,
            _ => TaskState::Failed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hygiene_protocol::AnalyzeImageTask;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn memory_pool() -> SqlitePool {
        sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl crate::task::TaskHandler for CountingHandler {
        async fn handle(&self, _task: QueueTask) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sample_task() -> QueueTask {
        QueueTask::AnalyzeImage(AnalyzeImageTask {
            job_id: JobId::new(),
            dockerfile: None,
            image_ref: Some("alpine:3.19".to_string()),
            app_context: None,
            inspected_metadata: None,
        })
    }

    #[tokio::test]
    async fn dispatches_queued_task_to_handler() {
        let queue = BrokerQueue::connect(memory_pool().await, Some(1), None).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        queue
            .register("analyze_image", Arc::new(CountingHandler(Arc::clone(&calls))))
            .await;

        let task = sample_task();
        let job_id = task.job_id().clone();
        queue.enqueue("analyze_image", task, EnqueueOptions::default()).await.unwrap();

        for _ in 0..100 {
            if queue.job_status(&job_id).await.unwrap() == Some(TaskState::Completed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stats_reflect_queue_depth() {
        let queue = BrokerQueue::connect(memory_pool().await, Some(1), None).await.unwrap();
        queue.enqueue("analyze_image", sample_task(), EnqueueOptions::default()).await.unwrap();
        queue.enqueue("analyze_image", sample_task(), EnqueueOptions::default()).await.unwrap();
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.scheduled, 2);
    }
}
