//! Text search over pairs
//!
//! A quoted query is an exact phrase; anything else is an AND of word
//! tokens that must all occur in one text field. [`SearchIndex`] asks the
//! primary [`SearchBackend`] first and falls back to a batched scan of the
//! pair store with the same match semantics when the backend fails.

pub mod analyzer;
mod inverted;

pub use inverted::InvertedIndex;

use crate::pairs::PairStore;
use async_trait::async_trait;
use bilingo_common::config::SearchConfig;
use bilingo_common::models::SubtitlePair;
use bilingo_common::{Error, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use analyzer::{contains_phrase, tokenize};

/// A parsed search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// Literal substring as typed, matched case-insensitively
    Phrase(String),
    /// Distinct lowercased word tokens
    Tokens(Vec<String>),
}

impl SearchQuery {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();

        if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            let phrase = &trimmed[1..trimmed.len() - 1];
            if phrase.trim().is_empty() {
                return Err(Error::InvalidInput("empty phrase query".to_string()));
            }
            return Ok(SearchQuery::Phrase(phrase.to_string()));
        }

        let mut seen = HashSet::new();
        let tokens: Vec<String> = tokenize(trimmed)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        if tokens.is_empty() {
            return Err(Error::InvalidInput(format!("query {:?} has no searchable terms", raw)));
        }
        Ok(SearchQuery::Tokens(tokens))
    }

    /// Match test used by the store scan
    pub fn matches(&self, pair: &SubtitlePair) -> bool {
        match self {
            SearchQuery::Phrase(phrase) => {
                let needle = phrase.to_lowercase();
                contains_phrase(&pair.primary_text, &needle) || contains_phrase(&pair.secondary_text, &needle)
            }
            SearchQuery::Tokens(tokens) => {
                let all_in = |text: &str| {
                    let words: HashSet<String> = tokenize(text).into_iter().collect();
                    tokens.iter().all(|t| words.contains(t))
                };
                all_in(&pair.primary_text) || all_in(&pair.secondary_text)
            }
        }
    }
}

/// Scored document id returned by a backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
}

/// Primary search engine capabilities
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Best `limit` hits, highest score first
    async fn query(&self, query: &SearchQuery, limit: usize) -> Result<Vec<SearchHit>>;

    /// Insert or replace documents
    async fn bulk_upsert(&self, pairs: &[SubtitlePair]) -> Result<()>;

    /// Drop every document, leaving an empty usable index
    async fn clear(&self) -> Result<()>;
}

/// Which path answered a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Engine,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMatch {
    #[serde(flatten)]
    pub pair: SubtitlePair,
    /// Relevance, absent for fallback results
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub mode: SearchMode,
    pub matches: Vec<SearchMatch>,
}

/// Search with store fallback
pub struct SearchIndex {
    backend: Arc<dyn SearchBackend>,
    pairs: Arc<PairStore>,
    config: SearchConfig,
}

impl SearchIndex {
    pub fn new(backend: Arc<dyn SearchBackend>, pairs: Arc<PairStore>, config: SearchConfig) -> Self {
        Self { backend, pairs, config }
    }

    pub async fn search(&self, raw: &str) -> Result<SearchOutcome> {
        let query = SearchQuery::parse(raw)?;

        let engine_error = match self.search_engine(&query).await {
            Ok(matches) => {
                debug!(query = %raw, results = matches.len(), "Search answered by engine");
                return Ok(SearchOutcome {
                    mode: SearchMode::Engine,
                    matches,
                });
            }
            Err(e) => e,
        };

        warn!(query = %raw, error = %engine_error, "Search engine failed, scanning pair store");

        match self.search_store(&query).await {
            Ok(pairs) => Ok(SearchOutcome {
                mode: SearchMode::Fallback,
                matches: pairs
                    .into_iter()
                    .map(|pair| SearchMatch { pair, score: None })
                    .collect(),
            }),
            Err(fallback_error) => Err(Error::SearchUnavailable(format!(
                "engine: {}; fallback: {}",
                engine_error, fallback_error
            ))),
        }
    }

    async fn search_engine(&self, query: &SearchQuery) -> Result<Vec<SearchMatch>> {
        let hits = self.backend.query(query, self.config.result_limit).await?;
        let ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();

        // Hits whose pair has since been deleted are dropped here
        let mut scores: HashMap<String, f64> =
            hits.into_iter().map(|h| (h.id, h.score)).collect();
        let pairs = self.pairs.get_many(&ids).await?;

        Ok(pairs
            .into_iter()
            .map(|pair| {
                let score = scores.remove(&pair.id);
                SearchMatch { pair, score }
            })
            .collect())
    }

    /// Insertion-ordered scan of the pair store, stopping at the result limit
    async fn search_store(&self, query: &SearchQuery) -> Result<Vec<SubtitlePair>> {
        let mut found = Vec::new();
        let mut after = 0;

        loop {
            let batch = self.pairs.scan_batch(after, self.config.reindex_batch_size).await?;
            let Some(last) = batch.last().map(|(position, _)| *position) else {
                break;
            };
            after = last;

            for (_, pair) in batch {
                if query.matches(&pair) {
                    found.push(pair);
                    if found.len() >= self.config.result_limit {
                        return Ok(found);
                    }
                }
            }
        }

        Ok(found)
    }

    /// Rebuild the engine from the pair store in batches
    ///
    /// Readers may see a partially loaded index while this runs.
    pub async fn reindex(&self) -> Result<u64> {
        self.backend.clear().await?;

        let mut indexed = 0u64;
        let mut after = 0;
        loop {
            let batch = self.pairs.scan_batch(after, self.config.reindex_batch_size).await?;
            let Some(last) = batch.last().map(|(position, _)| *position) else {
                break;
            };
            after = last;

            let pairs: Vec<SubtitlePair> = batch.into_iter().map(|(_, pair)| pair).collect();
            self.backend.bulk_upsert(&pairs).await?;
            indexed += pairs.len() as u64;
            debug!(indexed, "Indexed batch");
        }

        info!(indexed, "Search index rebuilt");
        Ok(indexed)
    }

    /// Re-upsert one pair so its text and rating boost are current
    pub async fn refresh(&self, pair: &SubtitlePair) -> Result<()> {
        self.backend.bulk_upsert(std::slice::from_ref(pair)).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }
}
