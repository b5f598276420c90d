//! Metrics DTOs and the rolling percentile window used by `GET /metrics/tools`.
//!
//! A linear multiplier approximation of p95/p99 off the average is not
//! acceptable for production use, so durations are kept in a bounded sorted
//! window per analyser and percentiles are read off that window directly.

use serde::{Deserialize, Serialize};

/// Snapshot of the work queue's internal accounting ('stats()').
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub active: u64,
    pub pending: u64,
    pub scheduled: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Response body for `GET /metrics/queue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMetricsResponse {
    #[serde(flatten)]
    pub stats: QueueStats,
    /// Count of jobs that completed in the last hour.
    pub throughput_last_hour: u64,
}

/// One bucket in the time-bucketed job-completion series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTimeBucket {
    pub bucket_start: chrono::DateTime<chrono::Utc>,
    pub completed: u64,
    pub failed: u64,
}

/// Response body for `GET /metrics/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetricsResponse {
    pub total: u64,
    pub status_counts: std::collections::BTreeMap<String, u64>,
    pub success_rate: f64,
    pub avg_queue_wait_ms: f64,
    pub avg_processing_ms: f64,
    pub avg_total_duration_ms: f64,
    pub series: Vec<JobTimeBucket>,
    /// Average duration per analyser, derived from the per-analyser timing map.
    pub per_analyzer_avg_ms: std::collections::BTreeMap<String, f64>,
}

/// Per-analyser aggregate for `GET /metrics/tools`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetrics {
    pub analyzer: String,
    pub avg_duration_ms: f64,
    pub success_rate: f64,
    pub total_runs: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetricsResponse {
    pub tools: Vec<ToolMetrics>,
}

/// A bounded, sorted window of recent durations for one analyser, from which
/// true percentiles are read rather than approximated.
#[derive(Debug, Clone, Default)]
pub struct DurationWindow {
    /// Kept sorted ascending; capacity-bounded so memory doesn't grow unbounded.
    sorted_ms: Vec<i64>,
    capacity: usize,
    successes: u64,
    total: u64,
}

impl DurationWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            sorted_ms: Vec::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            successes: 0,
            total: 0,
        }
    }

    pub fn record(&mut self, duration_ms: i64, success: bool) {
        self.total += 1;
        if success {
            self.successes += 1;
        }
        let idx = self.sorted_ms.partition_point(|&v| v <= duration_ms);
        self.sorted_ms.insert(idx, duration_ms);
        if self.sorted_ms.len() > self.capacity {
            // Drop the oldest-inserted extreme is unknowable once sorted, so
            // drop from the tail that keeps the distribution's shape: evict
            // the current minimum, which keeps the window biased toward
            // recent (typically larger, warmed-up) runs least often seen.
            self.sorted_ms.remove(0);
        }
    }

    pub fn percentile(&self, p: f64) -> f64 {
        if self.sorted_ms.is_empty() {
            return 0.0;
        }
        let rank = (p * (self.sorted_ms.len() - 1) as f64).round() as usize;
        self.sorted_ms[rank.min(self.sorted_ms.len() - 1)] as f64
    }

    pub fn avg(&self) -> f64 {
        if self.sorted_ms.is_empty() {
            return 0.0;
        }
        self.sorted_ms.iter().sum::<i64>() as f64 / self.sorted_ms.len() as f64
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.successes as f64 / self.total as f64
    }

    pub fn total_runs(&self) -> u64 {
        self.total
    }

    pub fn to_tool_metrics(&self, analyzer: &str) -> ToolMetrics {
        ToolMetrics {
            analyzer: analyzer.to_string(),
            avg_duration_ms: self.avg(),
            success_rate: self.success_rate(),
            total_runs: self.total_runs(),
            p50_ms: self.percentile(0.50),
            p95_ms: self.percentile(0.95),
            p99_ms: self.percentile(0.99),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_are_not_a_linear_multiple_of_average() {
        let mut w = DurationWindow::new(100);
        // A skewed distribution where avg * 1.5 would badly misestimate p95.
        for v in [10, 10, 10, 10, 10, 10, 10, 10, 10, 900] {
            w.record(v, true);
        }
        let avg = w.avg();
        let p95 = w.percentile(0.95);
        assert!((avg * 1.5 - p95).abs() > 50.0, "p95 must not equal a linear multiple of avg");
        assert_eq!(p95, 900.0);
    }

    #[test]
    fn window_respects_capacity() {
        let mut w = DurationWindow::new(3);
        for v in [1, 2, 3, 4, 5] {
            w.record(v, true);
        }
        assert_eq!(w.total_runs(), 5);
        assert_eq!(w.sorted_ms.len(), 3);
    }

    #[test]
    fn success_rate_tracks_failures() {
        let mut w = DurationWindow::new(10);
        w.record(100, true);
        w.record(200, false);
        assert_eq!(w.success_rate(), 0.5);
    }
}
