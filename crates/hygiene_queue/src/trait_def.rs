//! The queue-backend contract both implementations satisfy.

use std::sync::Arc;

use async_trait::async_trait;
use hygiene_ids::{JobId, TaskId};
use hygiene_protocol::{metrics::QueueStats, QueueTask};

use crate::error::Result;
use crate::task::{EnqueueOptions, TaskHandler, TaskState};

/// A backend capable of accepting, dispatching, and reporting on tasks.
///
/// Two implementations exist: [`crate::InMemoryQueue`] (in-process, lost on
/// restart) and [`crate::BrokerQueue`] (durable, survives a process crash).
/// Callers program against this trait so the composition root can choose the
/// backend from `Config::queue_backend` without touching call sites.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Submit a task of the given kind. Returns the queue's own handle for
    /// it; the job id embedded in `payload` remains the idempotency key.
    async fn enqueue(&self, kind: &str, payload: QueueTask, opts: EnqueueOptions) -> Result<TaskId>;

    /// Register the handler invoked for every task of `kind`. Registering a
    /// second handler for the same kind replaces the first.
    async fn register(&self, kind: &str, handler: Arc<dyn TaskHandler>);

    /// A point-in-time snapshot of queue depth and outcome counters.
    async fn stats(&self) -> Result<QueueStats>;

    /// The most recent known state of the task bound to `job_id`, if any.
    async fn job_status(&self, job_id: &JobId) -> Result<Option<TaskState>>;
}
