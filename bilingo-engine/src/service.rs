//! Content access service
//!
//! Composes the pair store, search index, progression ledger, mirror store
//! and stats store into the user-facing operations. Every mutating action is
//! gated on energy and charged only after the content change went through;
//! if the process dies between the two, the user keeps a free action.

use crate::ledger::ProgressionLedger;
use crate::mirrors::{MirrorStore, DEFAULT_RECENT_LIMIT};
use crate::pairs::{DedupReport, PairStore, RandomPick};
use crate::search::{SearchIndex, SearchOutcome};
use crate::stats::StatsStore;
use bilingo_common::models::{
    Category, Mirror, MirrorEdit, MirrorKind, NewPair, ProgressionState, SubtitlePair, SystemStats,
};
use bilingo_common::{time, Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Energy charged and xp granted per billed action
const ACTION_COST: i64 = 1;
const ACTION_XP: i64 = 1;

/// Caller identity as vouched for by the identity collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

impl AuthenticatedUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Requested pair mutation; at least one field must be set
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateRequest {
    pub delta: Option<i64>,
    pub category: Option<Category>,
}

impl UpdateRequest {
    pub fn rating(delta: i64) -> Self {
        Self {
            delta: Some(delta),
            category: None,
        }
    }

    pub fn category(category: Category) -> Self {
        Self {
            delta: None,
            category: Some(category),
        }
    }

    /// Build from loosely typed input, parsing the category name
    pub fn from_raw(delta: Option<i64>, category: Option<&str>) -> Result<Self> {
        let request = Self {
            delta,
            category: category.map(str::parse).transpose()?,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if self.delta.is_none() && self.category.is_none() {
            return Err(Error::InvalidInput(
                "update needs a rating delta, a category, or both".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of a gated mutation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOutcome {
    pub pair: SubtitlePair,
    /// Draft mirror created by this update
    pub mirror: Option<Mirror>,
    pub progression: ProgressionState,
    /// False when energy ran out between the check and the charge
    pub charged: bool,
    pub leveled_up: bool,
}

pub struct ContentAccessService {
    pairs: Arc<PairStore>,
    search: Arc<SearchIndex>,
    ledger: Arc<dyn ProgressionLedger>,
    mirrors: Arc<dyn MirrorStore>,
    stats: Arc<dyn StatsStore>,
}

impl ContentAccessService {
    pub fn new(
        pairs: Arc<PairStore>,
        search: Arc<SearchIndex>,
        ledger: Arc<dyn ProgressionLedger>,
        mirrors: Arc<dyn MirrorStore>,
        stats: Arc<dyn StatsStore>,
    ) -> Self {
        Self {
            pairs,
            search,
            ledger,
            mirrors,
            stats,
        }
    }

    pub fn pairs(&self) -> &Arc<PairStore> {
        &self.pairs
    }

    pub fn ledger(&self) -> &Arc<dyn ProgressionLedger> {
        &self.ledger
    }

    pub fn mirrors(&self) -> &Arc<dyn MirrorStore> {
        &self.mirrors
    }

    /// Random pair, `None` on an empty corpus
    pub async fn get_random(&self) -> Result<Option<RandomPick>> {
        self.pairs.pick_random().await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<SubtitlePair> {
        self.pairs.get_by_id(id).await
    }

    pub async fn get_with_offset(&self, id: &str, offset: i64) -> Result<SubtitlePair> {
        self.pairs.get_neighbor(id, offset).await
    }

    pub async fn search(&self, query: &str) -> Result<SearchOutcome> {
        self.search.search(query).await
    }

    /// Gated rating/category mutation
    ///
    /// Order: recharge, affordability check, rating, category (plus mirror
    /// draft), index refresh, then charge and xp. A failure before the
    /// charge leaves the ledger untouched.
    pub async fn apply_update(
        &self,
        user: &AuthenticatedUser,
        pair_id: &str,
        request: UpdateRequest,
    ) -> Result<UpdateOutcome> {
        request.validate()?;
        let user_id = user.user_id.as_str();

        if self.ledger.recharge_if_new_day(user_id, time::now()).await? {
            info!(user_id = %user_id, "Daily energy recharge");
        }

        if !self.ledger.can_afford(user_id).await? {
            return Err(Error::InsufficientEnergy {
                user_id: user_id.to_string(),
            });
        }

        let mut updated = None;
        if let Some(delta) = request.delta {
            updated = Some(self.pairs.update_rating(pair_id, delta).await?);
        }

        let mut mirror = None;
        if let Some(category) = request.category {
            let pair = self.pairs.update_category(pair_id, category).await?;
            if let Some(kind) = pair.category.mirror_kind() {
                mirror = self.mirrors.create_draft_if_absent(&pair, user_id, kind).await?;
            }
            updated = Some(pair);
        }

        let pair = updated.ok_or_else(|| Error::Internal("update applied no change".to_string()))?;

        if let Err(e) = self.search.refresh(&pair).await {
            debug!(pair_id = %pair.id, error = %e, "Search index refresh skipped");
        }

        let (progression, charged, leveled_up) = match self.ledger.consume(user_id, ACTION_COST).await {
            Ok(_) => {
                let grant = self.ledger.grant_xp(user_id, ACTION_XP).await?;
                (grant.state, true, grant.leveled_up)
            }
            Err(Error::InsufficientEnergy { .. }) => {
                warn!(
                    user_id = %user_id,
                    pair_id = %pair.id,
                    "Energy drained by a concurrent request, action left uncharged"
                );
                (self.ledger.snapshot(user_id).await?, false, false)
            }
            Err(e) => return Err(e),
        };

        info!(
            user_id = %user_id,
            pair_id = %pair.id,
            rating = pair.rating,
            category = %pair.category,
            energy = progression.energy,
            charged,
            "Pair updated"
        );

        Ok(UpdateOutcome {
            pair,
            mirror,
            progression,
            charged,
            leveled_up,
        })
    }

    pub async fn remove_duplicates(&self) -> Result<DedupReport> {
        self.pairs.remove_duplicates().await
    }

    /// Recompute and persist the stats singleton
    pub async fn compute_stats(&self) -> Result<SystemStats> {
        let stats = self.pairs.compute_stats().await?;
        self.stats.save(&stats).await?;
        info!(total = stats.total, files = stats.source_files.len(), "Stats recomputed");
        Ok(stats)
    }

    pub async fn latest_stats(&self) -> Result<SystemStats> {
        self.stats.latest().await
    }

    /// Bulk-load normalized records from the ingestion collaborator
    ///
    /// The search index is not updated; run [`Self::reindex`] afterwards.
    pub async fn ingest(&self, pairs: Vec<NewPair>) -> Result<usize> {
        self.pairs.insert_many(pairs).await
    }

    pub async fn reindex(&self) -> Result<u64> {
        self.search.reindex().await
    }

    /// Delete every pair and empty the search index
    pub async fn delete_all(&self) -> Result<u64> {
        let deleted = self.pairs.delete_all().await?;
        if let Err(e) = self.search.clear().await {
            warn!(error = %e, "Failed to clear search index after delete-all");
        }
        Ok(deleted)
    }

    pub async fn provision(&self, user_id: &str) -> Result<ProgressionState> {
        self.ledger.provision(user_id).await
    }

    pub async fn progression(&self, user: &AuthenticatedUser) -> Result<ProgressionState> {
        self.ledger.snapshot(&user.user_id).await
    }

    pub async fn mirror(&self, id: &str) -> Result<Mirror> {
        self.mirrors.get(id).await
    }

    pub async fn recent_mirrors(&self, kind: Option<MirrorKind>, limit: Option<i64>) -> Result<Vec<Mirror>> {
        self.mirrors
            .recent(kind, limit.unwrap_or(DEFAULT_RECENT_LIMIT))
            .await
    }

    pub async fn my_mirrors(&self, user: &AuthenticatedUser) -> Result<Vec<Mirror>> {
        self.mirrors.list_by_owner(&user.user_id).await
    }

    pub async fn edit_mirror(&self, user: &AuthenticatedUser, id: &str, edit: MirrorEdit) -> Result<Mirror> {
        self.mirrors.edit(&user.user_id, id, edit).await
    }

    pub async fn publish_mirror(&self, user: &AuthenticatedUser, id: &str) -> Result<Mirror> {
        self.mirrors.publish(&user.user_id, id).await
    }

    pub async fn unpublish_mirror(&self, user: &AuthenticatedUser, id: &str) -> Result<Mirror> {
        self.mirrors.unpublish(&user.user_id, id).await
    }

    pub async fn delete_mirror(&self, user: &AuthenticatedUser, id: &str) -> Result<Mirror> {
        self.mirrors.delete(&user.user_id, id).await
    }
}
