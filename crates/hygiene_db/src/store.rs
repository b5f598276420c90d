//! The Job Store: the durable system of record for job lifecycle, progress,
//! and timing. All mutations are conditional, enforcing status finality and
//! timing ordering regardless of how many callers race to update a job.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hygiene_ids::JobId;
use hygiene_protocol::{AnalyzerTiming, Job, JobStatus, Scenario};
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::pool::DbPool;

/// Optional fields accompanying a [`JobStore::set_status`] transition.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Filters accepted by [`JobStore::list`].
#[derive(Debug, Clone, Default)]
pub struct JobListFilter {
    pub user_id: Option<String>,
    pub status: Option<JobStatus>,
    pub since: Option<DateTime<Utc>>,
    pub page: u32,
    pub limit: u32,
    pub include_deleted: bool,
}

impl JobListFilter {
    fn offset(&self) -> i64 {
        (self.page as i64) * (self.limit.max(1) as i64)
    }
}

/// The durable record of every submitted job. Backed by SQLite; the single
/// authority for mutable per-job state — no in-memory replica is trusted
/// across handlers.
#[derive(Clone)]
pub struct JobStore {
    pub(crate) pool: DbPool,
}

impl JobStore {
    /// Construct a job store over an already-connected pool and ensure the
    /// schema exists. Call once at process start and share the handle.
    pub async fn connect(pool: DbPool) -> Result<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create a new job record. Rejects on duplicate identifier.
    pub async fn create(&self, job: &Job) -> Result<()> {
        let image_metadata_json = job
            .image_metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let tool_timings_json = serde_json::to_string(&job.tool_timings)?;
        let status_str = job.status.to_string();

        let result = sqlx::query(
            r#"INSERT INTO jobs
                (id, user_id, dockerfile, image_ref, app_context, scenario, image_metadata_json,
                 status, progress, created_at, queued_at, started_at, completed_at,
                 tool_timings_json, error, deleted)
               VALUES (?, NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)"#,
        )
        .bind(job.id.as_str())
        .bind(&job.dockerfile)
        .bind(&job.image_ref)
        .bind(&job.app_context)
        .bind(scenario_str(job.scenario))
        .bind(image_metadata_json)
        .bind(status_str)
        .bind(job.progress)
        .bind(job.created_at.to_rfc3339())
        .bind(job.queued_at.map(|t| t.to_rfc3339()))
        .bind(job.started_at.map(|t| t.to_rfc3339()))
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .bind(tool_timings_json)
        .bind(&job.error)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(DbError::constraint(format!("job {} already exists", job.id)))
            }
            Err(e) => Err(DbError::Sqlx(e)),
        }
    }

    /// Fetch a job by id.
    pub async fn get(&self, job_id: &JobId) -> Result<Job> {
        let row = sqlx::query(SELECT_COLUMNS)
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found(format!("job {job_id} not found")))?;
        row_to_job(&row)
    }

    /// Conditional progress update: only writes if `new_progress >= current`,
    /// and never moves a terminal job's progress (it is pinned at 100).
    pub async fn update_progress(&self, job_id: &JobId, new_progress: i32) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT status, progress FROM jobs WHERE id = ?")
            .bind(job_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found(format!("job {job_id} not found")))?;

        let status: String = row.try_get("status")?;
        let current_progress: i32 = row.try_get("progress")?;
        let status: JobStatus = status.parse().map_err(DbError::InvalidState)?;

        if status.is_terminal() {
            // Progress is pinned at 100 on terminal states; silently ignore.
            tx.commit().await?;
            return Ok(());
        }
        if new_progress < current_progress {
            // Monotonic-progress invariant: silently drop stale writes.
            tx.commit().await?;
            return Ok(());
        }

        sqlx::query("UPDATE jobs SET progress = ? WHERE id = ?")
            .bind(new_progress.clamp(0, 100))
            .bind(job_id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Conditional status transition. Forbids transitions out of a terminal
    /// status, and forbids reaching `COMPLETED`/`FAILED`/`CANCELLED` without
    /// `started_at` already set.
    pub async fn set_status(&self, job_id: &JobId, status: JobStatus, update: StatusUpdate) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT status, started_at FROM jobs WHERE id = ?")
            .bind(job_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found(format!("job {job_id} not found")))?;

        let current_status: String = row.try_get("status")?;
        let current_status: JobStatus = current_status.parse().map_err(DbError::InvalidState)?;
        let existing_started_at: Option<String> = row.try_get("started_at")?;

        if current_status.is_terminal() {
            tx.rollback().await?;
            return Err(DbError::invalid_state(format!(
                "job {job_id} is already terminal ({current_status}); cannot transition to {status}"
            )));
        }

        let started_at = update.started_at.map(|t| t.to_rfc3339()).or(existing_started_at);
        if status.is_terminal() && started_at.is_none() {
            tx.rollback().await?;
            return Err(DbError::invalid_state(format!(
                "cannot mark job {job_id} as {status} without started_at set"
            )));
        }

        let completed_at = update.completed_at.map(|t| t.to_rfc3339());

        sqlx::query(
            r#"UPDATE jobs SET
                status = ?,
                started_at = COALESCE(?, started_at),
                completed_at = CASE WHEN ? THEN ? ELSE completed_at END,
                progress = CASE WHEN ? THEN 100 ELSE progress END,
                error = COALESCE(?, error)
               WHERE id = ?"#,
        )
        .bind(status.to_string())
        .bind(started_at)
        .bind(status.is_terminal())
        .bind(completed_at)
        .bind(status.is_terminal())
        .bind(update.error)
        .bind(job_id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Append or overwrite one analyser's timing entry in the per-job map.
    pub async fn set_tool_metric(&self, job_id: &JobId, analyzer_name: &str, metric: AnalyzerTiming) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT tool_timings_json FROM jobs WHERE id = ?")
            .bind(job_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found(format!("job {job_id} not found")))?;

        let raw: String = row.try_get("tool_timings_json")?;
        let mut timings: BTreeMap<String, AnalyzerTiming> = serde_json::from_str(&raw)?;
        timings.insert(analyzer_name.to_string(), metric);
        let updated = serde_json::to_string(&timings)?;

        sqlx::query("UPDATE jobs SET tool_timings_json = ? WHERE id = ?")
            .bind(updated)
            .bind(job_id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Paginated, filtered listing.
    pub async fn list(&self, filter: JobListFilter) -> Result<(Vec<Job>, i64)> {
        let mut where_clauses = Vec::new();
        if !filter.include_deleted {
            where_clauses.push("deleted = 0".to_string());
        }
        if filter.status.is_some() {
            where_clauses.push("status = ?".to_string());
        }
        if filter.since.is_some() {
            where_clauses.push("created_at >= ?".to_string());
        }
        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) as count FROM jobs {where_sql}");
        let mut count_query = sqlx::query(&count_sql);
        if let Some(status) = filter.status {
            count_query = count_query.bind(status.to_string());
        }
        if let Some(since) = filter.since {
            count_query = count_query.bind(since.to_rfc3339());
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?.try_get("count")?;

        let list_sql = format!(
            "SELECT * FROM jobs {where_sql} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query(&list_sql);
        if let Some(status) = filter.status {
            list_query = list_query.bind(status.to_string());
        }
        if let Some(since) = filter.since {
            list_query = list_query.bind(since.to_rfc3339());
        }
        list_query = list_query.bind(filter.limit.max(1) as i64).bind(filter.offset());

        let rows = list_query.fetch_all(&self.pool).await?;
        let jobs = rows.iter().map(row_to_job).collect::<Result<Vec<_>>>()?;
        Ok((jobs, total))
    }

    /// Soft-delete: preserves audit history rather than erasing the row.
    pub async fn soft_delete(&self, job_id: &JobId) -> Result<()> {
        let affected = sqlx::query("UPDATE jobs SET deleted = 1 WHERE id = ?")
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(DbError::not_found(format!("job {job_id} not found")));
        }
        Ok(())
    }
}

const SELECT_COLUMNS: &str = "SELECT * FROM jobs WHERE id = ?";

fn scenario_str(scenario: Scenario) -> &'static str {
    match scenario {
        Scenario::DockerfileOnly => "dockerfile_only",
        Scenario::ImageOnly => "image_only",
        Scenario::Both => "both",
    }
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job> {
    let id: String = row.try_get("id")?;
    let scenario_raw: String = row.try_get("scenario")?;
    let scenario = match scenario_raw.as_str() {
        "dockerfile_only" => Scenario::DockerfileOnly,
        "image_only" => Scenario::ImageOnly,
        _ => Scenario::Both,
    };
    let status_raw: String = row.try_get("status")?;
    let status: JobStatus = status_raw.parse().map_err(DbError::InvalidState)?;
    let image_metadata_json: Option<String> = row.try_get("image_metadata_json")?;
    let image_metadata = image_metadata_json.map(|s| serde_json::from_str(&s)).transpose()?;
    let tool_timings_json: String = row.try_get("tool_timings_json")?;
    let tool_timings = serde_json::from_str(&tool_timings_json)?;

    Ok(Job {
        id: hygiene_ids::JobId::parse(&id).map_err(|e| DbError::InvalidState(e.to_string()))?,
        dockerfile: row.try_get("dockerfile")?,
        image_ref: row.try_get("image_ref")?,
        app_context: row.try_get("app_context")?,
        scenario,
        image_metadata,
        status,
        progress: row.try_get("progress")?,
        created_at: parse_ts(row.try_get("created_at")?)?,
        queued_at: parse_opt_ts(row.try_get("queued_at")?)?,
        started_at: parse_opt_ts(row.try_get("started_at")?)?,
        completed_at: parse_opt_ts(row.try_get("completed_at")?)?,
        tool_timings,
        error: row.try_get("error")?,
        deleted: row.try_get::<i64, _>("deleted")? != 0,
    })
}

fn parse_ts(raw: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::InvalidState(format!("bad timestamp {raw}: {e}")))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(parse_ts).transpose()
}
