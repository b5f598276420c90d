//! SQLite pool creation for the job store.
//!
//! The job store is SQLite behind `sqlx`, matching the rest of the workspace
//! ('JOB_STORE_DSN'). WAL mode is applied so concurrent job-status
//! writes from the worker don't contend with reads from the query API.

use tracing::info;

use crate::error::{DbError, Result};

pub type DbPool = sqlx::SqlitePool;

/// Job-store connection configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn sqlite(path: impl AsRef<str>) -> Self {
        Self {
            url: format!("sqlite:{}?mode=rwc", path.as_ref()),
            max_connections: 5,
        }
    }

    pub fn sqlite_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }

    pub fn from_dsn(dsn: impl Into<String>) -> Self {
        Self {
            url: dsn.into(),
            max_connections: 5,
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// Create the SQLite pool and apply concurrency-friendly pragmas.
pub async fn create_pool(config: DbConfig) -> Result<DbPool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .map_err(DbError::Sqlx)?;

    apply_sqlite_optimizations(&pool).await?;
    info!("connected to job store at {}", config.url);
    Ok(pool)
}

async fn apply_sqlite_optimizations(pool: &DbPool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA synchronous=NORMAL").execute(pool).await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_pool_connects() {
        let pool = create_pool(DbConfig::sqlite_memory()).await;
        assert!(pool.is_ok());
    }
}
