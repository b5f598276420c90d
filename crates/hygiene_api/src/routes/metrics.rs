//! `GET /metrics/{queue,jobs,tools}`.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hygiene_db::JobListFilter;
use hygiene_protocol::metrics::{
    DurationWindow, JobMetricsResponse, JobTimeBucket, QueueMetricsResponse, ToolMetrics, ToolMetricsResponse,
};
use hygiene_protocol::JobStatus;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Durations are kept per analyser in a rolling window so true percentiles
/// can be computed rather than a linear multiple of the average;
/// reconstructed here from the job store's per-job timing maps rather than a
/// live accumulator, since the job store is already the durable source of
/// truth for timings.
const WINDOW_CAPACITY: usize = 500;

pub async fn queue(State(state): State<AppState>) -> Result<Json<QueueMetricsResponse>, ApiError> {
    let stats = state.queue.stats().await?;
    let since = Utc::now() - ChronoDuration::hours(1);
    // `since` here must bound by completion time, not creation time, or a
    // job queued long ago but completed within the hour would be missed.
    let (completed, _total) = state
        .jobs
        .list(JobListFilter {
            status: Some(JobStatus::Completed),
            limit: 10_000,
            ..Default::default()
        })
        .await?;
    let throughput_last_hour = completed.iter().filter(|j| j.completed_at.is_some_and(|t| t >= since)).count() as u64;

    Ok(Json(QueueMetricsResponse {
        stats,
        throughput_last_hour,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TimeRangeQuery {
    #[serde(default = "default_time_range")]
    pub time_range: String,
}

fn default_time_range() -> String {
    "24h".to_string()
}

pub async fn jobs(
    State(state): State<AppState>,
    Query(query): Query<TimeRangeQuery>,
) -> Result<Json<JobMetricsResponse>, ApiError> {
    let (since, bucket_width) = match query.time_range.as_str() {
        "7d" => (Utc::now() - ChronoDuration::days(7), ChronoDuration::days(1)),
        "30d" => (Utc::now() - ChronoDuration::days(30), ChronoDuration::days(1)),
        _ => (Utc::now() - ChronoDuration::hours(24), ChronoDuration::hours(1)),
    };

    let (jobs, _total) = state
        .jobs
        .list(JobListFilter {
            since: Some(since),
            limit: 50_000,
            ..Default::default()
        })
        .await?;

    let mut status_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut queue_wait_ms = Vec::new();
    let mut processing_ms = Vec::new();
    let mut total_ms = Vec::new();
    let mut per_analyzer: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut buckets: BTreeMap<DateTime<Utc>, (u64, u64)> = BTreeMap::new();

    for job in &jobs {
        *status_counts.entry(job.status.to_string()).or_insert(0) += 1;

        if let (Some(queued_at), Some(started_at)) = (job.queued_at, job.started_at) {
            queue_wait_ms.push((started_at - queued_at).num_milliseconds() as f64);
        }
        if let (Some(started_at), Some(completed_at)) = (job.started_at, job.completed_at) {
            processing_ms.push((completed_at - started_at).num_milliseconds() as f64);
        }
        if let Some(completed_at) = job.completed_at {
            total_ms.push((completed_at - job.created_at).num_milliseconds() as f64);

            let bucket_start = bucket_floor(completed_at, since, bucket_width);
            let entry = buckets.entry(bucket_start).or_insert((0, 0));
            if job.status == JobStatus::Completed {
                entry.0 += 1;
            } else if job.status == JobStatus::Failed {
                entry.1 += 1;
            }
        }

        for (analyzer, timing) in &job.tool_timings {
            if let Some(duration_ms) = timing.duration_ms {
                per_analyzer.entry(analyzer.clone()).or_default().push(duration_ms as f64);
            }
        }
    }

    let total = jobs.len() as u64;
    let completed = status_counts.get("COMPLETED").copied().unwrap_or(0);
    let success_rate = if total == 0 { 0.0 } else { completed as f64 / total as f64 };

    let series = buckets
        .into_iter()
        .map(|(bucket_start, (completed, failed))| JobTimeBucket {
            bucket_start,
            completed,
            failed,
        })
        .collect();

    let per_analyzer_avg_ms = per_analyzer
        .into_iter()
        .map(|(analyzer, durations)| (analyzer, average(&durations)))
        .collect();

    Ok(Json(JobMetricsResponse {
        total,
        status_counts,
        success_rate,
        avg_queue_wait_ms: average(&queue_wait_ms),
        avg_processing_ms: average(&processing_ms),
        avg_total_duration_ms: average(&total_ms),
        series,
        per_analyzer_avg_ms,
    }))
}

pub async fn tools(State(state): State<AppState>) -> Result<Json<ToolMetricsResponse>, ApiError> {
    let (jobs, _total) = state
        .jobs
        .list(JobListFilter {
            limit: 50_000,
            include_deleted: false,
            ..Default::default()
        })
        .await?;

    let mut windows: BTreeMap<String, DurationWindow> = BTreeMap::new();
    for job in &jobs {
        for (analyzer, timing) in &job.tool_timings {
            if let Some(duration_ms) = timing.duration_ms {
                windows
                    .entry(analyzer.clone())
                    .or_insert_with(|| DurationWindow::new(WINDOW_CAPACITY))
                    .record(duration_ms, timing.success);
            }
        }
    }

    let tools: Vec<ToolMetrics> = windows.iter().map(|(name, window)| window.to_tool_metrics(name)).collect();
    Ok(Json(ToolMetricsResponse { tools }))
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn bucket_floor(at: DateTime<Utc>, since: DateTime<Utc>, width: ChronoDuration) -> DateTime<Utc> {
    let elapsed = at - since;
    let width_ms = width.num_milliseconds().max(1);
    let bucket_index = elapsed.num_milliseconds() / width_ms;
    since + ChronoDuration::milliseconds(bucket_index * width_ms)
}
