//! Database initialization
//!
//! Creates the database file on first run and the schema idempotently on
//! every start. All tables live in one SQLite file: pairs, progression,
//! mirrors and the stats singleton.

use crate::config::DatabaseConfig;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Current schema version
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path, config: &DatabaseConfig) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas go on the connect options so every pooled connection gets them.
    // WAL lets readers proceed while one writer holds the lock.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    info!(
        "Database ready (max {} connections, busy timeout {} ms)",
        config.max_connections, config.busy_timeout_ms
    );

    Ok(pool)
}

/// Private in-memory database with the full schema
///
/// Pinned to a single connection that never expires, since each SQLite
/// memory connection is its own database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create every table and index (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_pairs_table(pool).await?;
    create_progression_table(pool).await?;
    create_mirrors_table(pool).await?;
    create_system_stats_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the pairs table
///
/// `insert_order` is the stable sort key for skip sampling and marks the
/// first-inserted row of a duplicate group. `seq_id` is unique but sparse.
pub async fn create_pairs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pairs (
            insert_order INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            primary_text TEXT NOT NULL,
            secondary_text TEXT NOT NULL,
            primary_file TEXT,
            secondary_file TEXT,
            primary_time TEXT,
            secondary_time TEXT,
            rating INTEGER NOT NULL DEFAULT 0,
            category TEXT CHECK (category IN ('idiom', 'quote', 'wrong')),
            seq_id INTEGER UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pairs_primary_file ON pairs(primary_file)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pairs_secondary_file ON pairs(secondary_file)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pairs_texts ON pairs(primary_text, secondary_text)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the progression table
///
/// The CHECK constraints are the last line behind the conditional updates:
/// energy stays within `0..=max_energy` and level never drops below 1.
pub async fn create_progression_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS progression (
            user_id TEXT PRIMARY KEY,
            energy INTEGER NOT NULL,
            max_energy INTEGER NOT NULL CHECK (max_energy >= 0),
            level INTEGER NOT NULL DEFAULT 1 CHECK (level >= 1),
            xp INTEGER NOT NULL DEFAULT 0 CHECK (xp >= 0),
            last_recharge TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (energy >= 0 AND energy <= max_energy)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the mirrors table (idiom and quote records)
pub async fn create_mirrors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mirrors (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('idiom', 'quote')),
            title TEXT,
            primary_text TEXT NOT NULL,
            secondary_text TEXT NOT NULL,
            explanation TEXT,
            pair_id TEXT NOT NULL,
            pair_seq_id INTEGER,
            source_file TEXT,
            source_time TEXT,
            owner_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'published', 'deleted')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (pair_id, owner_id, kind)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_mirrors_owner ON mirrors(owner_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_mirrors_kind_created ON mirrors(kind, created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the stats singleton table
pub async fn create_system_stats_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS system_stats (
            id TEXT PRIMARY KEY CHECK (id = 'latest'),
            total INTEGER NOT NULL,
            source_files TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
