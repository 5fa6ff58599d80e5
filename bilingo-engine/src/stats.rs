//! Persisted corpus statistics

use async_trait::async_trait;
use bilingo_common::models::SystemStats;
use bilingo_common::{time, Error, Result};
use sqlx::{Row, SqlitePool};

#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Replace the singleton
    async fn save(&self, stats: &SystemStats) -> Result<()>;

    /// Last saved stats, or zeroed stats when nothing was computed yet
    async fn latest(&self) -> Result<SystemStats>;
}

pub struct SqliteStatsStore {
    pool: SqlitePool,
}

impl SqliteStatsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatsStore for SqliteStatsStore {
    async fn save(&self, stats: &SystemStats) -> Result<()> {
        let files = serde_json::to_string(&stats.source_files)
            .map_err(|e| Error::Internal(format!("Failed to encode source files: {}", e)))?;
        let updated_at = time::to_db_string(stats.updated_at.unwrap_or_else(time::now));

        sqlx::query(
            r#"
            INSERT INTO system_stats (id, total, source_files, updated_at)
            VALUES ('latest', ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                total = excluded.total,
                source_files = excluded.source_files,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(stats.total)
        .bind(files)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest(&self) -> Result<SystemStats> {
        let row = sqlx::query("SELECT total, source_files, updated_at FROM system_stats WHERE id = 'latest'")
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(SystemStats::default());
        };

        let files: String = row.try_get("source_files")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(SystemStats {
            total: row.try_get("total")?,
            source_files: serde_json::from_str(&files)
                .map_err(|e| Error::Internal(format!("Corrupt stats source files: {}", e)))?,
            updated_at: time::from_db_string(&updated_at),
        })
    }
}
