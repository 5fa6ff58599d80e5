//! Pair storage
//!
//! [`PairBackend`] is the capability set a concrete store must offer (point
//! lookup, file-scoped range query, sampling, atomic updates, aggregation).
//! [`PairStore`] layers the selection, navigation and consolidation
//! algorithms on top of any backend.

mod sqlite;

pub use sqlite::SqlitePairBackend;

use async_trait::async_trait;
use bilingo_common::config::{NavigationConfig, RandomConfig};
use bilingo_common::models::{strip_language_suffix, Category, NewPair, SubtitlePair, SystemStats};
use bilingo_common::{time, Error, Result};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A set of pairs sharing the same (primary, secondary) text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub primary_text: String,
    pub secondary_text: String,
    /// `insert_order` of the row that survives
    pub keep: i64,
    pub size: i64,
}

/// Backend capabilities required by [`PairStore`]
#[async_trait]
pub trait PairBackend: Send + Sync {
    /// Insert one normalized record and assign its id
    async fn insert(&self, pair: NewPair) -> Result<SubtitlePair>;

    /// Insert a batch in one transaction, returning the number stored
    async fn insert_many(&self, pairs: Vec<NewPair>) -> Result<usize>;

    async fn get_by_id(&self, id: &str) -> Result<Option<SubtitlePair>>;

    async fn get_by_seq_id(&self, seq_id: i64) -> Result<Option<SubtitlePair>>;

    /// Fetch several pairs, returned in the order of `ids`; missing ids are skipped
    async fn get_many(&self, ids: &[String]) -> Result<Vec<SubtitlePair>>;

    /// Smallest and largest assigned `seq_id`, if any pair has one
    async fn seq_id_bounds(&self) -> Result<Option<(i64, i64)>>;

    /// First pair whose `seq_id` is at least `seq_id`
    async fn first_at_or_after_seq(&self, seq_id: i64) -> Result<Option<SubtitlePair>>;

    async fn count(&self) -> Result<i64>;

    /// Row at position `skip` in insertion order
    async fn nth_in_insert_order(&self, skip: i64) -> Result<Option<SubtitlePair>>;

    /// One uniformly sampled pair, `None` only when the store is empty
    async fn sample(&self) -> Result<Option<SubtitlePair>>;

    /// All pairs whose primary or secondary source file is `file`, in insertion order
    async fn list_by_file(&self, file: &str) -> Result<Vec<SubtitlePair>>;

    /// Atomic `rating += delta`
    async fn update_rating(&self, id: &str, delta: i64) -> Result<Option<SubtitlePair>>;

    /// Atomic category toggle (see [`Category::toggled`])
    async fn toggle_category(&self, id: &str, category: Category) -> Result<Option<SubtitlePair>>;

    /// Groups of more than one pair sharing (primary, secondary) text
    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>>;

    /// Delete every member of `group` except the kept row
    async fn delete_group_duplicates(&self, group: &DuplicateGroup) -> Result<u64>;

    async fn delete_all(&self) -> Result<u64>;

    /// Distinct non-empty primary-language source files
    async fn distinct_primary_files(&self) -> Result<Vec<String>>;

    /// Up to `limit` pairs with an insertion position after `after`, plus each position
    async fn scan_batch(&self, after: i64, limit: i64) -> Result<Vec<(i64, SubtitlePair)>>;
}

/// Strategy used by [`PairStore::pick_random`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RandomTier {
    /// Draw a `seq_id` between the bounds and take the nearest greater row
    SeqId { attempts: u32 },
    /// Draw an offset below the row count and skip that many rows
    Skip { attempts: u32 },
    /// Store-native sampling
    Sample,
}

impl RandomTier {
    pub fn name(&self) -> &'static str {
        match self {
            RandomTier::SeqId { .. } => "seq_id",
            RandomTier::Skip { .. } => "skip",
            RandomTier::Sample => "sample",
        }
    }

    fn attempts(&self) -> u32 {
        match self {
            RandomTier::SeqId { attempts } | RandomTier::Skip { attempts } => *attempts,
            RandomTier::Sample => 1,
        }
    }
}

/// A randomly selected pair and the tier that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RandomPick {
    pub pair: SubtitlePair,
    pub tier: RandomTier,
}

/// Outcome of a duplicate sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    pub groups_with_duplicates: u64,
    pub documents_deleted: u64,
    /// Groups whose deletion failed and were skipped
    pub failed_groups: u64,
}

/// Pair access with selection, navigation and consolidation algorithms
pub struct PairStore {
    backend: Arc<dyn PairBackend>,
    random: RandomConfig,
    navigation: NavigationConfig,
}

impl PairStore {
    pub fn new(backend: Arc<dyn PairBackend>, random: RandomConfig, navigation: NavigationConfig) -> Self {
        Self {
            backend,
            random,
            navigation,
        }
    }

    pub async fn insert(&self, pair: NewPair) -> Result<SubtitlePair> {
        self.backend.insert(pair).await
    }

    pub async fn insert_many(&self, pairs: Vec<NewPair>) -> Result<usize> {
        let inserted = self.backend.insert_many(pairs).await?;
        info!(inserted, "Stored ingested pairs");
        Ok(inserted)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<SubtitlePair> {
        self.backend
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("pair {}", id)))
    }

    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<SubtitlePair>> {
        self.backend.get_many(ids).await
    }

    pub async fn count(&self) -> Result<i64> {
        self.backend.count().await
    }

    pub async fn scan_batch(&self, after: i64, limit: i64) -> Result<Vec<(i64, SubtitlePair)>> {
        self.backend.scan_batch(after, limit).await
    }

    /// Random selection tiers, tried in order
    pub fn random_tiers(&self) -> [RandomTier; 3] {
        [
            RandomTier::SeqId {
                attempts: self.random.seq_attempts,
            },
            RandomTier::Skip {
                attempts: self.random.skip_attempts,
            },
            RandomTier::Sample,
        ]
    }

    /// Random pair, or `None` on an empty corpus
    pub async fn get_random(&self) -> Result<Option<SubtitlePair>> {
        Ok(self.pick_random().await?.map(|pick| pick.pair))
    }

    /// Random pair together with the tier that found it
    ///
    /// Attempts run sequentially and are bounded by the tier list. A failed
    /// attempt counts as a miss; the last failure is only surfaced when no
    /// tier produced a pair.
    pub async fn pick_random(&self) -> Result<Option<RandomPick>> {
        let mut last_error = None;

        for tier in self.random_tiers() {
            for attempt in 1..=tier.attempts() {
                match self.try_tier(tier).await {
                    Ok(Some(pair)) => {
                        debug!(tier = tier.name(), attempt, pair_id = %pair.id, "Random pair selected");
                        return Ok(Some(RandomPick { pair, tier }));
                    }
                    Ok(None) => {
                        debug!(tier = tier.name(), attempt, "Random tier missed");
                    }
                    Err(e) => {
                        warn!(tier = tier.name(), attempt, error = %e, "Random tier attempt failed");
                        last_error = Some(e);
                    }
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn try_tier(&self, tier: RandomTier) -> Result<Option<SubtitlePair>> {
        match tier {
            RandomTier::SeqId { .. } => {
                let Some((lo, hi)) = self.backend.seq_id_bounds().await? else {
                    return Ok(None);
                };
                let draw = rand::thread_rng().gen_range(lo..=hi);
                self.backend.first_at_or_after_seq(draw).await
            }
            RandomTier::Skip { .. } => {
                let total = self.backend.count().await?;
                if total <= 0 {
                    return Ok(None);
                }
                let skip = rand::thread_rng().gen_range(0..total);
                self.backend.nth_in_insert_order(skip).await
            }
            RandomTier::Sample => self.backend.sample().await,
        }
    }

    /// Pair `offset` steps away from `id` within the same source file
    ///
    /// `offset = 0` returns the anchor itself. Crossing the file boundary is
    /// `NotFound`.
    pub async fn get_neighbor(&self, id: &str, offset: i64) -> Result<SubtitlePair> {
        let anchor = self.get_by_id(id).await?;
        if offset == 0 {
            return Ok(anchor);
        }

        if let Some(pair) = self.neighbor_by_seq(&anchor, offset).await? {
            return Ok(pair);
        }

        self.neighbor_by_time(&anchor, offset).await
    }

    async fn neighbor_by_seq(&self, anchor: &SubtitlePair, offset: i64) -> Result<Option<SubtitlePair>> {
        if offset.unsigned_abs() > self.navigation.fast_path_max_offset.unsigned_abs() {
            return Ok(None);
        }
        let (Some(seq_id), Some(file)) = (anchor.seq_id, anchor.source_file()) else {
            return Ok(None);
        };
        let Some(target) = seq_id.checked_add(offset) else {
            return Ok(None);
        };

        let candidate = self.backend.get_by_seq_id(target).await?;
        Ok(candidate.filter(|c| c.seq_id.is_some() && c.in_file(file)))
    }

    async fn neighbor_by_time(&self, anchor: &SubtitlePair, offset: i64) -> Result<SubtitlePair> {
        let file = anchor
            .source_file()
            .ok_or_else(|| Error::NotFound(format!("pair {} has no source file to navigate", anchor.id)))?;
        let language = anchor.timing_language();

        let mut timeline: Vec<(i64, SubtitlePair)> = self
            .backend
            .list_by_file(file)
            .await?
            .into_iter()
            .filter_map(|p| p.start_ms(language).map(|start| (start, p)))
            .collect();
        // Stable sort keeps insertion order for cues starting at the same time
        timeline.sort_by_key(|(start, _)| *start);

        let position = timeline
            .iter()
            .position(|(_, p)| p.id == anchor.id)
            .ok_or_else(|| Error::NotFound(format!("pair {} has no usable timing in {}", anchor.id, file)))?;

        let target = (position as i64)
            .checked_add(offset)
            .and_then(|t| usize::try_from(t).ok())
            .filter(|&t| t < timeline.len())
            .ok_or_else(|| {
                Error::NotFound(format!("offset {} from pair {} leaves {}", offset, anchor.id, file))
            })?;

        Ok(timeline.swap_remove(target).1)
    }

    /// Atomic `rating += delta`
    pub async fn update_rating(&self, id: &str, delta: i64) -> Result<SubtitlePair> {
        self.backend
            .update_rating(id, delta)
            .await?
            .ok_or_else(|| Error::NotFound(format!("pair {}", id)))
    }

    /// Set or toggle off the category
    pub async fn update_category(&self, id: &str, category: Category) -> Result<SubtitlePair> {
        self.backend
            .toggle_category(id, category)
            .await?
            .ok_or_else(|| Error::NotFound(format!("pair {}", id)))
    }

    /// Keep the first-inserted pair of every (primary, secondary) text group
    ///
    /// A group that fails to delete is logged and skipped; the sweep goes on
    /// and the partial counts are returned.
    pub async fn remove_duplicates(&self) -> Result<DedupReport> {
        let groups = self.backend.duplicate_groups().await?;
        let mut report = DedupReport {
            groups_with_duplicates: groups.len() as u64,
            ..Default::default()
        };

        for group in &groups {
            match self.backend.delete_group_duplicates(group).await {
                Ok(deleted) => report.documents_deleted += deleted,
                Err(e) => {
                    warn!(
                        keep = group.keep,
                        size = group.size,
                        error = %e,
                        "Failed to consolidate duplicate group"
                    );
                    report.failed_groups += 1;
                }
            }
        }

        info!(
            groups = report.groups_with_duplicates,
            deleted = report.documents_deleted,
            failed = report.failed_groups,
            "Duplicate sweep finished"
        );
        Ok(report)
    }

    pub async fn delete_all(&self) -> Result<u64> {
        let deleted = self.backend.delete_all().await?;
        info!(deleted, "Deleted all pairs");
        Ok(deleted)
    }

    /// Total count and distinct source files, with language suffixes stripped
    pub async fn compute_stats(&self) -> Result<SystemStats> {
        let total = self.backend.count().await?;

        let stripped: BTreeSet<String> = self
            .backend
            .distinct_primary_files()
            .await?
            .iter()
            .map(|f| strip_language_suffix(f))
            .collect();
        let mut files: Vec<String> = stripped.into_iter().collect();
        files.sort_by_key(|f| f.to_lowercase());

        Ok(SystemStats {
            total,
            source_files: files,
            updated_at: Some(time::now()),
        })
    }
}
