//! Idiom and quote mirrors
//!
//! A mirror is created as a draft the first time a user tags a pair as an
//! idiom or quote. After that it belongs to that user and is edited on its
//! own; nothing flows back to the pair. Deletion is soft, and a deleted
//! mirror answers `NotFound` from then on.

use async_trait::async_trait;
use bilingo_common::models::{
    strip_language_suffix, Mirror, MirrorEdit, MirrorKind, MirrorSource, MirrorStatus, SubtitlePair,
};
use bilingo_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

/// Default page size for [`MirrorStore::recent`]
pub const DEFAULT_RECENT_LIMIT: i64 = 10;

#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Draft a mirror of `pair` for `owner_id` unless one of that kind already exists
    ///
    /// Returns the new mirror, or `None` when the pair was already mirrored
    /// (including a mirror the owner has since deleted).
    async fn create_draft_if_absent(
        &self,
        pair: &SubtitlePair,
        owner_id: &str,
        kind: MirrorKind,
    ) -> Result<Option<Mirror>>;

    async fn get(&self, id: &str) -> Result<Mirror>;

    /// Newest non-deleted mirrors first, optionally of one kind
    async fn recent(&self, kind: Option<MirrorKind>, limit: i64) -> Result<Vec<Mirror>>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Mirror>>;

    async fn edit(&self, user_id: &str, id: &str, edit: MirrorEdit) -> Result<Mirror>;

    async fn set_status(&self, user_id: &str, id: &str, status: MirrorStatus) -> Result<Mirror>;

    async fn publish(&self, user_id: &str, id: &str) -> Result<Mirror> {
        self.set_status(user_id, id, MirrorStatus::Published).await
    }

    async fn unpublish(&self, user_id: &str, id: &str) -> Result<Mirror> {
        self.set_status(user_id, id, MirrorStatus::Draft).await
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<Mirror> {
        self.set_status(user_id, id, MirrorStatus::Deleted).await
    }
}

const MIRROR_COLUMNS: &str = "id, kind, title, primary_text, secondary_text, explanation, \
     pair_id, pair_seq_id, source_file, source_time, owner_id, status, created_at, updated_at";

pub struct SqliteMirrorStore {
    pool: SqlitePool,
}

impl SqliteMirrorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn owner_and_status(&self, id: &str) -> Result<Option<(String, String)>> {
        let row = sqlx::query("SELECT owner_id, status FROM mirrors WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<(String, String)> { Ok((row.try_get("owner_id")?, row.try_get("status")?)) })
            .transpose()
    }

    /// Explain why an owner-scoped update touched no row
    async fn rejection(&self, user_id: &str, id: &str) -> Error {
        match self.owner_and_status(id).await {
            Err(e) => e,
            Ok(None) => Error::NotFound(format!("mirror {}", id)),
            Ok(Some((_, status))) if status == MirrorStatus::Deleted.as_str() => {
                Error::NotFound(format!("mirror {}", id))
            }
            Ok(Some((owner, _))) if owner != user_id => Error::OwnershipViolation {
                mirror_id: id.to_string(),
                user_id: user_id.to_string(),
            },
            Ok(Some(_)) => Error::Internal(format!("mirror {} changed concurrently", id)),
        }
    }
}

fn timestamp(row: &SqliteRow, column: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    let raw: String = row.try_get(column)?;
    time::from_db_string(&raw).ok_or_else(|| Error::Internal(format!("bad {} timestamp '{}'", column, raw)))
}

fn mirror_from_row(row: &SqliteRow) -> Result<Mirror> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;

    Ok(Mirror {
        id: row.try_get("id")?,
        kind: kind.parse()?,
        title: row.try_get("title")?,
        primary_text: row.try_get("primary_text")?,
        secondary_text: row.try_get("secondary_text")?,
        explanation: row.try_get("explanation")?,
        source: MirrorSource {
            pair_id: row.try_get("pair_id")?,
            pair_seq_id: row.try_get("pair_seq_id")?,
            file: row.try_get("source_file")?,
            time: row.try_get("source_time")?,
        },
        owner_id: row.try_get("owner_id")?,
        status: status.parse()?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

#[async_trait]
impl MirrorStore for SqliteMirrorStore {
    async fn create_draft_if_absent(
        &self,
        pair: &SubtitlePair,
        owner_id: &str,
        kind: MirrorKind,
    ) -> Result<Option<Mirror>> {
        let now = time::to_db_string(time::now());
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO mirrors (
                id, kind, primary_text, secondary_text, pair_id, pair_seq_id,
                source_file, source_time, owner_id, status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'draft', ?, ?)
            ON CONFLICT(pair_id, owner_id, kind) DO NOTHING
            RETURNING {}
            "#,
            MIRROR_COLUMNS
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(kind.as_str())
        .bind(&pair.primary_text)
        .bind(&pair.secondary_text)
        .bind(&pair.id)
        .bind(pair.seq_id)
        .bind(pair.primary_file.as_deref().map(strip_language_suffix))
        .bind(&pair.primary_time)
        .bind(owner_id)
        .bind(&now)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mirror = mirror_from_row(&row)?;
                info!(
                    mirror_id = %mirror.id,
                    pair_id = %pair.id,
                    owner_id = %owner_id,
                    kind = kind.as_str(),
                    "Created draft mirror"
                );
                Ok(Some(mirror))
            }
            None => {
                debug!(pair_id = %pair.id, owner_id = %owner_id, kind = kind.as_str(), "Mirror already exists");
                Ok(None)
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Mirror> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM mirrors WHERE id = ? AND status <> 'deleted'",
            MIRROR_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("mirror {}", id)))?;

        mirror_from_row(&row)
    }

    async fn recent(&self, kind: Option<MirrorKind>, limit: i64) -> Result<Vec<Mirror>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM mirrors WHERE status <> 'deleted'",
            MIRROR_COLUMNS
        ));
        if let Some(kind) = kind {
            builder.push(" AND kind = ").push_bind(kind.as_str());
        }
        builder
            .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(limit.max(0));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(mirror_from_row).collect()
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Mirror>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM mirrors
            WHERE owner_id = ? AND status <> 'deleted'
            ORDER BY created_at DESC, rowid DESC
            "#,
            MIRROR_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(mirror_from_row).collect()
    }

    async fn edit(&self, user_id: &str, id: &str, edit: MirrorEdit) -> Result<Mirror> {
        if edit.is_empty() {
            return Err(Error::InvalidInput("mirror edit changes nothing".to_string()));
        }
        for (field, value) in [("primary_text", &edit.primary_text), ("secondary_text", &edit.secondary_text)] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(Error::InvalidInput(format!("{} must not be empty", field)));
            }
        }

        // Empty strings clear the optional fields
        let row = sqlx::query(&format!(
            r#"
            UPDATE mirrors
            SET title = CASE WHEN ?1 IS NULL THEN title ELSE NULLIF(?1, '') END,
                primary_text = COALESCE(?2, primary_text),
                secondary_text = COALESCE(?3, secondary_text),
                explanation = CASE WHEN ?4 IS NULL THEN explanation ELSE NULLIF(?4, '') END,
                updated_at = ?5
            WHERE id = ?6 AND owner_id = ?7 AND status <> 'deleted'
            RETURNING {}
            "#,
            MIRROR_COLUMNS
        ))
        .bind(&edit.title)
        .bind(&edit.primary_text)
        .bind(&edit.secondary_text)
        .bind(&edit.explanation)
        .bind(time::to_db_string(time::now()))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => mirror_from_row(&row),
            None => Err(self.rejection(user_id, id).await),
        }
    }

    async fn set_status(&self, user_id: &str, id: &str, status: MirrorStatus) -> Result<Mirror> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE mirrors
            SET status = ?1, updated_at = ?2
            WHERE id = ?3 AND owner_id = ?4 AND status <> 'deleted'
            RETURNING {}
            "#,
            MIRROR_COLUMNS
        ))
        .bind(status.as_str())
        .bind(time::to_db_string(time::now()))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mirror = mirror_from_row(&row)?;
                info!(mirror_id = %id, user_id = %user_id, status = status.as_str(), "Mirror status changed");
                Ok(mirror)
            }
            None => Err(self.rejection(user_id, id).await),
        }
    }
}
