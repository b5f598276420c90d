//! Job-store schema: a single `jobs` table, indexed on `(user_id, status)`
//! and `(created_at)` to serve the list/metrics queries within budget.
//!
//! Single-tenant identity is assumed, so `user_id` is carried as a
//! plain nullable column rather than a real multi-tenant key, but the index
//! shape is kept so the metrics/list queries would still scale if tenancy
//! were added later.

use crate::error::Result;
use crate::JobStore;

impl JobStore {
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                dockerfile TEXT,
                image_ref TEXT,
                app_context TEXT,
                scenario TEXT NOT NULL,
                image_metadata_json TEXT,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                queued_at TEXT,
                started_at TEXT,
                completed_at TEXT,
                tool_timings_json TEXT NOT NULL DEFAULT '{}',
                error TEXT,
                deleted INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_user_status ON jobs(user_id, status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
