//! The in-memory work queue: an unbounded channel plus a fixed worker pool.
//!
//! Suitable for development and tests: state is lost on process exit, and
//! retries are best-effort within the process lifetime. Concurrency defaults
//! to `num_cpus::get()`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hygiene_db::{JobStore, StatusUpdate};
use hygiene_ids::{JobId, TaskId};
use hygiene_protocol::{metrics::QueueStats, AsErrorKind, JobStatus, QueueTask};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{error, warn};

use crate::error::{QueueError, Result};
use crate::metrics::Metrics;
use crate::task::{EnqueueOptions, HandlerRef, TaskState};
use crate::trait_def::WorkQueue;

struct Envelope {
    task_id: TaskId,
    kind: String,
    payload: QueueTask,
    opts: EnqueueOptions,
    attempt: u32,
}

/// In-process FIFO queue backed by `tokio::sync::mpsc`.
pub struct InMemoryQueue {
    sender: mpsc::UnboundedSender<Envelope>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Envelope>>>,
    handlers: RwLock<HashMap<String, HandlerRef>>,
    job_states: RwLock<HashMap<JobId, TaskState>>,
    metrics: Metrics,
    active: Arc<AtomicU64>,
    concurrency: usize,
    jobs: Option<Arc<JobStore>>,
}

impl InMemoryQueue {
    /// Build the queue and spawn `concurrency` worker loops (default
    /// `num_cpus::get()`, pass `None` to use it). `jobs`, when given, is
    /// used to write a terminal `FAILED` status back to the job record once
    /// a task exhausts its retries, so a job is never left stuck non-terminal.
    pub fn new(concurrency: Option<usize>, jobs: Option<Arc<JobStore>>) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            handlers: RwLock::new(HashMap::new()),
            job_states: RwLock::new(HashMap::new()),
            metrics: Metrics::new(),
            active: Arc::new(AtomicU64::new(0)),
            concurrency: concurrency.unwrap_or_else(num_cpus::get),
            jobs,
        });

        for worker_idx in 0..queue.concurrency.max(1) {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.run_worker(worker_idx).await });
        }

        queue
    }

    async fn run_worker(self: Arc<Self>, worker_idx: usize) {
        loop {
            let envelope = {
                let mut receiver = self.receiver.lock().await;
                receiver.recv().await
            };
            let Some(envelope) = envelope else {
                // Sender dropped; no more work will ever arrive.
                return;
            };
            self.active.fetch_add(1, Ordering::Relaxed);
            self.process(envelope, worker_idx).await;
            self.active.fetch_sub(1, Ordering::Relaxed);
        }
    }

    async fn process(&self, mut envelope: Envelope, worker_idx: usize) {
        let job_id = envelope.payload.job_id().clone();
        self.set_job_state(&job_id, TaskState::Running).await;

        let handler = self.handlers.read().await.get(&envelope.kind).cloned();
        let Some(handler) = handler else {
            error!(kind = %envelope.kind, "in-memory worker {worker_idx} has no handler registered");
            self.metrics.inc_failed();
            self.set_job_state(&job_id, TaskState::Failed).await;
            return;
        };

        loop {
            match handler.handle(envelope.payload.clone()).await {
                Ok(()) => {
                    self.metrics.inc_completed();
                    self.set_job_state(&job_id, TaskState::Completed).await;
                    return;
                }
                Err(e) if e.kind().is_retryable() && envelope.attempt < envelope.opts.max_retry => {
                    envelope.attempt += 1;
                    self.metrics.inc_retried();
                    warn!(
                        job_id = %job_id,
                        attempt = envelope.attempt,
                        error = %e,
                        "task failed, retrying after backoff"
                    );
                    tokio::time::sleep(envelope.opts.retry_backoff * envelope.attempt).await;
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "task failed permanently");
                    self.metrics.inc_failed();
                    self.set_job_state(&job_id, TaskState::Failed).await;
                    self.fail_job_record(&job_id, e.to_string()).await;
                    return;
                }
            }
        }
    }

    async fn set_job_state(&self, job_id: &JobId, state: TaskState) {
        self.job_states.write().await.insert(job_id.clone(), state);
    }

    /// Write the terminal `FAILED` status to the job record once a task has
    /// exhausted its retries, so the job never sits stuck at `RUNNING`.
    async fn fail_job_record(&self, job_id: &JobId, error: String) {
        let Some(jobs) = &self.jobs else { return };
        let now = chrono::Utc::now();
        if let Err(e) = jobs
            .set_status(
                job_id,
                JobStatus::Failed,
                StatusUpdate {
                    started_at: Some(now),
                    completed_at: Some(now),
                    error: Some(error),
                },
            )
            .await
        {
            warn!(job_id = %job_id, error = %e, "failed to record job as FAILED after retries were exhausted");
        }
    }
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn enqueue(&self, kind: &str, payload: QueueTask, opts: EnqueueOptions) -> Result<TaskId> {
        let task_id = TaskId::new();
        let job_id = payload.job_id().clone();
        self.job_states.write().await.insert(job_id, TaskState::Pending);
        self.metrics.inc_enqueued();

        self.sender
            .send(Envelope {
                task_id: task_id.clone(),
                kind: kind.to_string(),
                payload,
                opts,
                attempt: 0,
            })
            .map_err(|_| QueueError::ShuttingDown)?;

        Ok(task_id)
    }

    async fn register(&self, kind: &str, handler: HandlerRef) {
        self.handlers.write().await.insert(kind.to_string(), handler);
    }

    async fn stats(&self) -> Result<QueueStats> {
        let pending = self.receiver.lock().await.len() as u64;
        let active = self.active.load(Ordering::Relaxed);
        Ok(self.metrics.snapshot(pending, active))
    }

    async fn job_status(&self, job_id: &JobId) -> Result<Option<TaskState>> {
        Ok(self.job_states.read().await.get(job_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hygiene_protocol::AnalyzeImageTask;
    use std::sync::atomic::AtomicUsize;

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl crate::task::TaskHandler for CountingHandler {
        async fn handle(&self, _task: QueueTask) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl crate::task::TaskHandler for FailingHandler {
        async fn handle(&self, _task: QueueTask) -> Result<()> {
            Err(QueueError::NoHandler("boom".to_string()))
        }
    }

    fn sample_task() -> QueueTask {
        QueueTask::AnalyzeImage(AnalyzeImageTask {
            job_id: JobId::new(),
            dockerfile: Some("FROM alpine".to_string()),
            image_ref: None,
            app_context: None,
            inspected_metadata: None,
        })
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let queue = InMemoryQueue::new(Some(2), None);
        let calls = Arc::new(AtomicUsize::new(0));
        queue
            .register("analyze_image", Arc::new(CountingHandler(Arc::clone(&calls))))
            .await;

        let task = sample_task();
        let job_id = task.job_id().clone();
        queue.enqueue("analyze_image", task, EnqueueOptions::default()).await.unwrap();

        for _ in 0..50 {
            if calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.job_status(&job_id).await.unwrap(), Some(TaskState::Completed));
    }

    #[tokio::test]
    async fn exhausting_retries_marks_task_failed() {
        let queue = InMemoryQueue::new(Some(1), None);
        queue.register("analyze_image", Arc::new(FailingHandler)).await;

        let task = sample_task();
        let job_id = task.job_id().clone();
        let opts = EnqueueOptions {
            max_retry: 1,
            retry_backoff: std::time::Duration::from_millis(5),
        };
        queue.enqueue("analyze_image", task, opts).await.unwrap();

        let mut state = None;
        for _ in 0..100 {
            state = queue.job_status(&job_id).await.unwrap();
            if state == Some(TaskState::Failed) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(state, Some(TaskState::Failed));
    }

    #[tokio::test]
    async fn missing_handler_fails_the_task() {
        let queue = InMemoryQueue::new(Some(1), None);
        let task = sample_task();
        let job_id = task.job_id().clone();
        queue.enqueue("analyze_image", task, EnqueueOptions::default()).await.unwrap();

        let mut state = None;
        for _ in 0..50 {
            state = queue.job_status(&job_id).await.unwrap();
            if state == Some(TaskState::Failed) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(state, Some(TaskState::Failed));
    }
}
