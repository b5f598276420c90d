//! In-process queue counters.
//!
//! Lock-free atomics, single-writer-per-field, read via [`Metrics::snapshot`].
//! Each [`crate::WorkQueue`] backend owns one instance and folds it into the
//! [`QueueStats`] it returns from `stats()`.

use std::sync::atomic::{AtomicU64, Ordering};

use hygiene_protocol::metrics::QueueStats;

#[derive(Default)]
pub struct Metrics {
    pub enqueued: AtomicU64,
    pub dispatched: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold the running counters into a [`QueueStats`] snapshot. `pending`
    /// and `active` are supplied by the caller since those reflect live
    /// backend state (channel depth or `SELECT COUNT`), not a counter.
    pub fn snapshot(&self, pending: u64, active: u64) -> QueueStats {
        QueueStats {
            active,
            pending,
            scheduled: self.enqueued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        let metrics = Metrics::new();
        metrics.inc_enqueued();
        metrics.inc_enqueued();
        metrics.inc_completed();

        let snap = metrics.snapshot(0, 0);
        assert_eq!(snap.scheduled, 2);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.failed, 0);
    }
}
