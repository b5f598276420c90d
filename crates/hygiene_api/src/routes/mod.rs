//! Route handlers, one module per resource.

pub mod analyze;
pub mod artifacts;
pub mod compare;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod stream;
