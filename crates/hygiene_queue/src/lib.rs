//! The Work Queue: two interchangeable backends behind one
//! [`WorkQueue`] trait — a durable SQL-backed broker for production and an
//! in-memory channel for development and tests. Both guarantee FIFO
//! delivery per task and surface identical [`hygiene_protocol::metrics::QueueStats`].

pub mod broker;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod task;
pub mod trait_def;

pub use broker::BrokerQueue;
pub use error::{QueueError, Result};
pub use memory::InMemoryQueue;
pub use task::{EnqueueOptions, EnqueuedTask, HandlerRef, TaskHandler, TaskState};
pub use trait_def::WorkQueue;
