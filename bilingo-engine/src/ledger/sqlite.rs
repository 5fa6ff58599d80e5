//! SQLite progression ledger

use async_trait::async_trait;
use bilingo_common::config::ProgressionConfig;
use bilingo_common::models::ProgressionState;
use bilingo_common::{time, Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::{ProgressionLedger, XpGrant};

const STATE_COLUMNS: &str = "user_id, energy, max_energy, level, xp, last_recharge";

pub struct SqliteProgressionLedger {
    pool: SqlitePool,
    config: ProgressionConfig,
}

impl SqliteProgressionLedger {
    pub fn new(pool: SqlitePool, config: ProgressionConfig) -> Self {
        Self { pool, config }
    }
}

fn state_from_row(row: &SqliteRow) -> Result<ProgressionState> {
    let last_recharge: Option<String> = row.try_get("last_recharge")?;
    Ok(ProgressionState {
        user_id: row.try_get("user_id")?,
        energy: row.try_get("energy")?,
        max_energy: row.try_get("max_energy")?,
        level: row.try_get("level")?,
        xp: row.try_get("xp")?,
        last_recharge: last_recharge.as_deref().and_then(time::from_db_string),
    })
}

#[async_trait]
impl ProgressionLedger for SqliteProgressionLedger {
    async fn provision(&self, user_id: &str) -> Result<ProgressionState> {
        let now = time::to_db_string(time::now());
        let result = sqlx::query(
            r#"
            INSERT INTO progression (user_id, energy, max_energy, level, xp, last_recharge, updated_at)
            VALUES (?, ?, ?, 1, 0, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(self.config.starting_energy)
        .bind(self.config.starting_energy)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(user_id = %user_id, energy = self.config.starting_energy, "Provisioned progression");
        }
        self.snapshot(user_id).await
    }

    async fn snapshot(&self, user_id: &str) -> Result<ProgressionState> {
        let row = sqlx::query(&format!("SELECT {} FROM progression WHERE user_id = ?", STATE_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("progression for user {}", user_id)))?;

        state_from_row(&row)
    }

    async fn consume(&self, user_id: &str, amount: i64) -> Result<ProgressionState> {
        if amount <= 0 {
            return Err(Error::InvalidInput(format!("energy amount must be positive, got {}", amount)));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE progression
            SET energy = energy - ?1, updated_at = ?2
            WHERE user_id = ?3 AND energy - ?1 >= 0
            RETURNING {}
            "#,
            STATE_COLUMNS
        ))
        .bind(amount)
        .bind(time::to_db_string(time::now()))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let state = state_from_row(&row)?;
                debug!(user_id = %user_id, amount, energy = state.energy, "Energy consumed");
                Ok(state)
            }
            None => {
                // Distinguish an unknown user from an empty balance
                self.snapshot(user_id).await?;
                Err(Error::InsufficientEnergy {
                    user_id: user_id.to_string(),
                })
            }
        }
    }

    async fn grant_xp(&self, user_id: &str, amount: i64) -> Result<XpGrant> {
        if amount < 0 {
            return Err(Error::InvalidInput(format!("xp amount must not be negative, got {}", amount)));
        }

        // SET expressions all see the pre-update row
        let row = sqlx::query(&format!(
            r#"
            UPDATE progression
            SET level = CASE WHEN xp + ?1 >= MAX(level * ?2, 1) THEN level + 1 ELSE level END,
                max_energy = CASE WHEN xp + ?1 >= MAX(level * ?2, 1) THEN max_energy + ?3 ELSE max_energy END,
                xp = CASE WHEN xp + ?1 >= MAX(level * ?2, 1) THEN 0 ELSE xp + ?1 END,
                updated_at = ?4
            WHERE user_id = ?5
            RETURNING {}
            "#,
            STATE_COLUMNS
        ))
        .bind(amount)
        .bind(self.config.xp_per_level)
        .bind(self.config.energy_per_level)
        .bind(time::to_db_string(time::now()))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("progression for user {}", user_id)))?;

        let state = state_from_row(&row)?;
        let leveled_up = amount > 0 && state.xp == 0;
        if leveled_up {
            info!(
                user_id = %user_id,
                level = state.level,
                max_energy = state.max_energy,
                "Level up"
            );
        }

        Ok(XpGrant { state, leveled_up })
    }

    async fn recharge_if_new_day(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let stamp = time::to_db_string(now);
        let result = sqlx::query(
            r#"
            UPDATE progression
            SET energy = max_energy, last_recharge = ?1, updated_at = ?1
            WHERE user_id = ?2
              AND (last_recharge IS NULL OR substr(last_recharge, 1, 10) <> ?3)
            "#,
        )
        .bind(&stamp)
        .bind(user_id)
        .bind(time::utc_day(now))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(user_id = %user_id, day = %time::utc_day(now), "Energy recharged");
            return Ok(true);
        }

        self.snapshot(user_id).await?;
        Ok(false)
    }
}
