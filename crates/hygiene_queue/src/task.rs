//! Task handler contract and enqueue-time options for the work queue.

use std::sync::Arc;

use async_trait::async_trait;
use hygiene_ids::{JobId, TaskId};
use hygiene_protocol::QueueTask;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Runtime state of a queued task, reported by [`crate::WorkQueue::job_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Options accepted at enqueue time.
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    /// Maximum number of redeliveries before the task is abandoned as failed.
    pub max_retry: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_backoff: std::time::Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            max_retry: 3,
            retry_backoff: std::time::Duration::from_secs(2),
        }
    }
}

/// A handler registered for one task kind.
///
/// Handlers are looked up by [`QueueTask::kind_name`] and must not assume
/// they run on any particular worker thread; the queue backend owns
/// concurrency and retry policy, not the handler.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: QueueTask) -> Result<()>;
}

/// Blanket impl so plain async closures wrapped in `Arc` can be registered
/// without a dedicated struct, mirroring how the executor registers itself
/// as the single `"analyze_image"` handler.
pub type HandlerRef = Arc<dyn TaskHandler>;

/// Identifies one enqueued unit of work independent of its job.
///
/// A task is bound to at most one job, and the job id is the idempotency key;
/// the task id is the queue's own bookkeeping handle, returned
/// from `enqueue` so callers can look up task-level (not job-level) status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueuedTask {
    pub task_id: TaskId,
    pub job_id: JobId,
}
