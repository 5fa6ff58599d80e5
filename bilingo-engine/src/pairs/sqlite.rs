//! SQLite pair backend

use async_trait::async_trait;
use bilingo_common::models::{Category, NewPair, SubtitlePair};
use bilingo_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{DuplicateGroup, PairBackend};

const PAIR_COLUMNS: &str = "id, primary_text, secondary_text, primary_file, secondary_file, \
                            primary_time, secondary_time, rating, category, seq_id";

/// Bound on host parameters per `IN (...)` lookup
const LOOKUP_CHUNK: usize = 500;

/// Pair backend over the `pairs` table
#[derive(Clone)]
pub struct SqlitePairBackend {
    pool: SqlitePool,
}

impl SqlitePairBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn pair_from_row(row: &SqliteRow) -> Result<SubtitlePair> {
    let category: Option<String> = row.try_get("category")?;

    Ok(SubtitlePair {
        id: row.try_get("id")?,
        primary_text: row.try_get("primary_text")?,
        secondary_text: row.try_get("secondary_text")?,
        primary_file: row.try_get("primary_file")?,
        secondary_file: row.try_get("secondary_file")?,
        primary_time: row.try_get("primary_time")?,
        secondary_time: row.try_get("secondary_time")?,
        rating: row.try_get("rating")?,
        category: Category::from_db(category.as_deref())?,
        seq_id: row.try_get("seq_id")?,
    })
}

async fn insert_row<'e, E>(executor: E, id: &str, pair: &NewPair) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO pairs (id, primary_text, secondary_text, primary_file, secondary_file,
                           primary_time, secondary_time, rating, category, seq_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&pair.primary_text)
    .bind(&pair.secondary_text)
    .bind(&pair.primary_file)
    .bind(&pair.secondary_file)
    .bind(&pair.primary_time)
    .bind(&pair.secondary_time)
    .bind(pair.rating)
    .bind(pair.category.as_db())
    .bind(pair.seq_id)
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl PairBackend for SqlitePairBackend {
    async fn insert(&self, pair: NewPair) -> Result<SubtitlePair> {
        let id = Uuid::new_v4().to_string();
        insert_row(&self.pool, &id, &pair).await?;

        Ok(SubtitlePair {
            id,
            primary_text: pair.primary_text,
            secondary_text: pair.secondary_text,
            primary_file: pair.primary_file,
            secondary_file: pair.secondary_file,
            primary_time: pair.primary_time,
            secondary_time: pair.secondary_time,
            rating: pair.rating,
            category: pair.category,
            seq_id: pair.seq_id,
        })
    }

    async fn insert_many(&self, pairs: Vec<NewPair>) -> Result<usize> {
        if pairs.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for pair in &pairs {
            let id = Uuid::new_v4().to_string();
            insert_row(&mut *tx, &id, pair).await?;
        }
        tx.commit().await?;

        Ok(pairs.len())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<SubtitlePair>> {
        let sql = format!("SELECT {} FROM pairs WHERE id = ?", PAIR_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(pair_from_row).transpose()
    }

    async fn get_by_seq_id(&self, seq_id: i64) -> Result<Option<SubtitlePair>> {
        let sql = format!("SELECT {} FROM pairs WHERE seq_id = ?", PAIR_COLUMNS);
        let row = sqlx::query(&sql).bind(seq_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(pair_from_row).transpose()
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<SubtitlePair>> {
        let mut found: HashMap<String, SubtitlePair> = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("SELECT {} FROM pairs WHERE id IN (", PAIR_COLUMNS));
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(")");

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in &rows {
                let pair = pair_from_row(row)?;
                found.insert(pair.id.clone(), pair);
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    async fn seq_id_bounds(&self) -> Result<Option<(i64, i64)>> {
        let (lo, hi): (Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT MIN(seq_id), MAX(seq_id) FROM pairs")
                .fetch_one(&self.pool)
                .await?;
        Ok(lo.zip(hi))
    }

    async fn first_at_or_after_seq(&self, seq_id: i64) -> Result<Option<SubtitlePair>> {
        let sql = format!(
            "SELECT {} FROM pairs WHERE seq_id >= ? ORDER BY seq_id LIMIT 1",
            PAIR_COLUMNS
        );
        let row = sqlx::query(&sql).bind(seq_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(pair_from_row).transpose()
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pairs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn nth_in_insert_order(&self, skip: i64) -> Result<Option<SubtitlePair>> {
        let sql = format!(
            "SELECT {} FROM pairs ORDER BY insert_order LIMIT 1 OFFSET ?",
            PAIR_COLUMNS
        );
        let row = sqlx::query(&sql).bind(skip).fetch_optional(&self.pool).await?;
        row.as_ref().map(pair_from_row).transpose()
    }

    async fn sample(&self) -> Result<Option<SubtitlePair>> {
        let sql = format!("SELECT {} FROM pairs ORDER BY RANDOM() LIMIT 1", PAIR_COLUMNS);
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(pair_from_row).transpose()
    }

    async fn list_by_file(&self, file: &str) -> Result<Vec<SubtitlePair>> {
        let sql = format!(
            "SELECT {} FROM pairs WHERE primary_file = ?1 OR secondary_file = ?1 ORDER BY insert_order",
            PAIR_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(file).fetch_all(&self.pool).await?;
        rows.iter().map(pair_from_row).collect()
    }

    async fn update_rating(&self, id: &str, delta: i64) -> Result<Option<SubtitlePair>> {
        let sql = format!(
            "UPDATE pairs SET rating = rating + ? WHERE id = ? RETURNING {}",
            PAIR_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(delta)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(pair_from_row).transpose()
    }

    async fn toggle_category(&self, id: &str, category: Category) -> Result<Option<SubtitlePair>> {
        // Evaluated against the stored value, so concurrent toggles never
        // act on a stale read.
        let sql = format!(
            "UPDATE pairs SET category = CASE WHEN category IS ?1 THEN NULL ELSE ?1 END \
             WHERE id = ?2 RETURNING {}",
            PAIR_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(category.as_db())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(pair_from_row).transpose()
    }

    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let rows = sqlx::query(
            r#"
            SELECT primary_text, secondary_text, MIN(insert_order) AS keep, COUNT(*) AS size
            FROM pairs
            GROUP BY primary_text, secondary_text
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<DuplicateGroup> {
                Ok(DuplicateGroup {
                    primary_text: row.try_get("primary_text")?,
                    secondary_text: row.try_get("secondary_text")?,
                    keep: row.try_get("keep")?,
                    size: row.try_get("size")?,
                })
            })
            .collect()
    }

    async fn delete_group_duplicates(&self, group: &DuplicateGroup) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM pairs WHERE primary_text = ? AND secondary_text = ? AND insert_order <> ?",
        )
        .bind(&group.primary_text)
        .bind(&group.secondary_text)
        .bind(group.keep)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pairs").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn distinct_primary_files(&self) -> Result<Vec<String>> {
        let files: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT primary_file FROM pairs WHERE primary_file IS NOT NULL AND primary_file <> ''",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }

    async fn scan_batch(&self, after: i64, limit: i64) -> Result<Vec<(i64, SubtitlePair)>> {
        let sql = format!(
            "SELECT insert_order, {} FROM pairs WHERE insert_order > ? ORDER BY insert_order LIMIT ?",
            PAIR_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<(i64, SubtitlePair)> {
                Ok((row.try_get("insert_order")?, pair_from_row(row)?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bilingo_common::db::init::connect_in_memory;

    fn new_pair(primary: &str, secondary: &str, seq_id: Option<i64>) -> NewPair {
        NewPair {
            primary_text: primary.to_string(),
            secondary_text: secondary.to_string(),
            primary_file: Some("film_en.srt".to_string()),
            secondary_file: Some("film_ru.srt".to_string()),
            seq_id,
            ..Default::default()
        }
    }

    async fn setup() -> SqlitePairBackend {
        SqlitePairBackend::new(connect_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let backend = setup().await;
        let stored = backend.insert(new_pair("Hello", "Привет", Some(7))).await.unwrap();

        let by_id = backend.get_by_id(&stored.id).await.unwrap().unwrap();
        assert_eq!(by_id, stored);

        let by_seq = backend.get_by_seq_id(7).await.unwrap().unwrap();
        assert_eq!(by_seq.id, stored.id);

        assert!(backend.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_rating_accumulates() {
        let backend = setup().await;
        let stored = backend.insert(new_pair("a", "b", None)).await.unwrap();

        backend.update_rating(&stored.id, 3).await.unwrap();
        let updated = backend.update_rating(&stored.id, -1).await.unwrap().unwrap();
        assert_eq!(updated.rating, 2);

        assert!(backend.update_rating("missing", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_toggle_category_in_store() {
        let backend = setup().await;
        let stored = backend.insert(new_pair("a", "b", None)).await.unwrap();

        let p = backend.toggle_category(&stored.id, Category::Idiom).await.unwrap().unwrap();
        assert_eq!(p.category, Category::Idiom);
        let p = backend.toggle_category(&stored.id, Category::Quote).await.unwrap().unwrap();
        assert_eq!(p.category, Category::Quote);
        let p = backend.toggle_category(&stored.id, Category::Quote).await.unwrap().unwrap();
        assert_eq!(p.category, Category::None);
        let p = backend.toggle_category(&stored.id, Category::None).await.unwrap().unwrap();
        assert_eq!(p.category, Category::None);
    }

    #[tokio::test]
    async fn test_get_many_preserves_requested_order() {
        let backend = setup().await;
        let a = backend.insert(new_pair("a", "1", None)).await.unwrap();
        let b = backend.insert(new_pair("b", "2", None)).await.unwrap();

        let ids = vec![b.id.clone(), "gone".to_string(), a.id.clone()];
        let found = backend.get_many(&ids).await.unwrap();
        let found_ids: Vec<&str> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(found_ids, vec![b.id.as_str(), a.id.as_str()]);
    }

    #[tokio::test]
    async fn test_duplicate_groups_keep_first_inserted() {
        let backend = setup().await;
        let first = backend.insert(new_pair("A", "B", None)).await.unwrap();
        backend.insert(new_pair("A", "B", None)).await.unwrap();
        backend.insert(new_pair("C", "D", None)).await.unwrap();

        let groups = backend.duplicate_groups().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].size, 2);

        let deleted = backend.delete_group_duplicates(&groups[0]).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(backend.get_by_id(&first.id).await.unwrap().is_some());
        assert_eq!(backend.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_seq_bounds_and_nearest_greater() {
        let backend = setup().await;
        assert_eq!(backend.seq_id_bounds().await.unwrap(), None);

        backend.insert(new_pair("a", "1", Some(10))).await.unwrap();
        backend.insert(new_pair("b", "2", Some(40))).await.unwrap();
        backend.insert(new_pair("c", "3", None)).await.unwrap();

        assert_eq!(backend.seq_id_bounds().await.unwrap(), Some((10, 40)));
        let hit = backend.first_at_or_after_seq(11).await.unwrap().unwrap();
        assert_eq!(hit.seq_id, Some(40));
        assert!(backend.first_at_or_after_seq(41).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scan_batch_pages_in_insert_order() {
        let backend = setup().await;
        for i in 0..5 {
            backend.insert(new_pair(&format!("p{}", i), "s", None)).await.unwrap();
        }

        let first = backend.scan_batch(0, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let rest = backend.scan_batch(first[1].0, 10).await.unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].1.primary_text, "p2");
    }
}
