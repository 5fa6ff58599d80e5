//! bilingo-engine - content access and progression engine
//!
//! Random selection, temporal navigation, search and gated mutation over a
//! corpus of bilingual subtitle pairs. [`Engine`] owns the database pool and
//! wires the SQLite adapters and the in-process search index into a
//! [`ContentAccessService`].

use bilingo_common::config::EngineConfig;
use bilingo_common::db::init::{connect_in_memory, init_database};
use bilingo_common::Result;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub mod ledger;
pub mod mirrors;
pub mod pairs;
pub mod search;
pub mod service;
pub mod stats;

use ledger::SqliteProgressionLedger;
use mirrors::SqliteMirrorStore;
use pairs::{PairStore, SqlitePairBackend};
use search::{InvertedIndex, SearchIndex};
use service::ContentAccessService;
use stats::SqliteStatsStore;

/// Process-wide engine context
///
/// Opened once at startup and closed at shutdown; callers reach the stores
/// through [`Engine::service`].
pub struct Engine {
    pool: SqlitePool,
    config: EngineConfig,
    service: ContentAccessService,
}

impl Engine {
    /// Open (and if needed create) the database file
    pub async fn open(db_path: &Path, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = init_database(db_path, &config.database).await?;
        info!("Engine opened at {}", db_path.display());
        Ok(Self::with_pool(pool, config))
    }

    /// Private in-memory database, mostly for tests
    pub async fn in_memory(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = connect_in_memory().await?;
        Ok(Self::with_pool(pool, config))
    }

    /// Wire the stores over an already initialized pool
    pub fn with_pool(pool: SqlitePool, config: EngineConfig) -> Self {
        let pairs = Arc::new(PairStore::new(
            Arc::new(SqlitePairBackend::new(pool.clone())),
            config.random.clone(),
            config.navigation.clone(),
        ));
        let search = Arc::new(SearchIndex::new(
            Arc::new(InvertedIndex::new(config.search.clone())),
            pairs.clone(),
            config.search.clone(),
        ));
        let service = ContentAccessService::new(
            pairs,
            search,
            Arc::new(SqliteProgressionLedger::new(pool.clone(), config.progression.clone())),
            Arc::new(SqliteMirrorStore::new(pool.clone())),
            Arc::new(SqliteStatsStore::new(pool.clone())),
        );

        Self { pool, config, service }
    }

    pub fn service(&self) -> &ContentAccessService {
        &self.service
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections
    pub async fn close(self) {
        self.pool.close().await;
        info!("Engine closed");
    }
}
