//! In-process inverted index
//!
//! Holds word-token postings per text field and edge n-gram postings over
//! both fields. The index starts out unbuilt: queries fail with
//! `SearchUnavailable` until the first bulk load or `clear`, which lets the
//! caller fall back to scanning the store.

use async_trait::async_trait;
use bilingo_common::config::SearchConfig;
use bilingo_common::models::SubtitlePair;
use bilingo_common::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use super::analyzer::{edge_ngrams, phrase_grams, tokenize};
use super::{SearchBackend, SearchHit, SearchQuery};

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

const PRIMARY: usize = 0;
const SECONDARY: usize = 1;

#[derive(Debug, Clone, Default)]
struct FieldTerms {
    freqs: HashMap<String, u32>,
    len: usize,
}

impl FieldTerms {
    fn from_text(text: &str) -> Self {
        let tokens = tokenize(text);
        let mut freqs = HashMap::new();
        for token in &tokens {
            *freqs.entry(token.clone()).or_insert(0) += 1;
        }
        Self {
            freqs,
            len: tokens.len(),
        }
    }
}

#[derive(Debug, Clone)]
struct IndexedDoc {
    /// Position of first insertion, used as the tie-breaker
    order: u64,
    rating: i64,
    texts: [String; 2],
    fields: [FieldTerms; 2],
    grams: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    docs: HashMap<String, IndexedDoc>,
    postings: [HashMap<String, HashSet<String>>; 2],
    grams: HashMap<String, HashSet<String>>,
    total_len: [usize; 2],
    next_order: u64,
}

impl Snapshot {
    fn upsert(&mut self, pair: &SubtitlePair, min_gram: usize, max_gram: usize) {
        let order = match self.unindex(&pair.id) {
            Some(order) => order,
            None => {
                self.next_order += 1;
                self.next_order
            }
        };

        let fields = [
            FieldTerms::from_text(&pair.primary_text),
            FieldTerms::from_text(&pair.secondary_text),
        ];
        let mut grams = HashSet::new();

        for (field, terms) in fields.iter().enumerate() {
            self.total_len[field] += terms.len;
            for token in terms.freqs.keys() {
                self.postings[field]
                    .entry(token.clone())
                    .or_default()
                    .insert(pair.id.clone());
                grams.extend(edge_ngrams(token, min_gram, max_gram));
            }
        }
        for gram in &grams {
            self.grams.entry(gram.clone()).or_default().insert(pair.id.clone());
        }

        self.docs.insert(
            pair.id.clone(),
            IndexedDoc {
                order,
                rating: pair.rating,
                texts: [pair.primary_text.to_lowercase(), pair.secondary_text.to_lowercase()],
                fields,
                grams,
            },
        );
    }

    /// Drop a document's postings, returning its insertion position
    fn unindex(&mut self, id: &str) -> Option<u64> {
        let doc = self.docs.remove(id)?;

        for (field, terms) in doc.fields.iter().enumerate() {
            self.total_len[field] = self.total_len[field].saturating_sub(terms.len);
            for token in terms.freqs.keys() {
                remove_posting(&mut self.postings[field], token, id);
            }
        }
        for gram in &doc.grams {
            remove_posting(&mut self.grams, gram, id);
        }

        Some(doc.order)
    }

    fn idf(&self, field: usize, token: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = self.postings[field].get(token).map_or(0, |p| p.len()) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// BM25 score of `tokens` in one field, or `None` unless every token occurs there
    fn field_score(&self, doc: &IndexedDoc, field: usize, tokens: &[String]) -> Option<f64> {
        let terms = &doc.fields[field];
        let avg_len = (self.total_len[field] as f64 / self.docs.len().max(1) as f64).max(1.0);
        let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * terms.len as f64 / avg_len);

        let mut score = 0.0;
        for token in tokens {
            let tf = *terms.freqs.get(token)? as f64;
            score += self.idf(field, token) * tf * (BM25_K1 + 1.0) / (tf + norm);
        }
        Some(score)
    }

    /// Documents whose given field holds every token
    fn token_candidates(&self, field: usize, tokens: &[String]) -> HashSet<&str> {
        let mut lists: Vec<&HashSet<String>> = Vec::with_capacity(tokens.len());
        for token in tokens {
            match self.postings[field].get(token) {
                Some(list) => lists.push(list),
                None => return HashSet::new(),
            }
        }
        intersect(lists)
    }

    fn phrase_candidates(&self, grams: &[String]) -> HashSet<&str> {
        if grams.is_empty() {
            return self.docs.keys().map(String::as_str).collect();
        }
        let mut lists: Vec<&HashSet<String>> = Vec::with_capacity(grams.len());
        for gram in grams {
            match self.grams.get(gram) {
                Some(list) => lists.push(list),
                None => return HashSet::new(),
            }
        }
        intersect(lists)
    }
}

fn remove_posting(postings: &mut HashMap<String, HashSet<String>>, key: &str, id: &str) {
    if let Some(list) = postings.get_mut(key) {
        list.remove(id);
        if list.is_empty() {
            postings.remove(key);
        }
    }
}

fn intersect(mut lists: Vec<&HashSet<String>>) -> HashSet<&str> {
    lists.sort_by_key(|l| l.len());
    let Some((smallest, rest)) = lists.split_first() else {
        return HashSet::new();
    };
    smallest
        .iter()
        .filter(|id| rest.iter().all(|l| l.contains(*id)))
        .map(String::as_str)
        .collect()
}

/// Inverted index with field weighting and a linear rating boost
pub struct InvertedIndex {
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    config: SearchConfig,
}

impl InvertedIndex {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            snapshot: RwLock::new(None),
            config,
        }
    }

    /// True once the index has been loaded or cleared at least once
    pub fn is_built(&self) -> bool {
        self.snapshot.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.current().map(|s| s.docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn current(&self) -> Result<Arc<Snapshot>> {
        let guard = self
            .snapshot
            .read()
            .map_err(|_| Error::SearchUnavailable("index lock poisoned".to_string()))?;
        guard
            .clone()
            .ok_or_else(|| Error::SearchUnavailable("index has not been built".to_string()))
    }

    fn score(&self, doc: &IndexedDoc, relevance: f64) -> f64 {
        relevance + doc.rating as f64 * self.config.rating_boost
    }

    fn field_weight(&self, field: usize) -> f64 {
        if field == PRIMARY {
            self.config.primary_field_weight
        } else {
            1.0
        }
    }

    fn run(&self, snapshot: &Snapshot, query: &SearchQuery) -> Vec<(u64, SearchHit)> {
        let mut best: HashMap<&str, f64> = HashMap::new();

        match query {
            SearchQuery::Tokens(tokens) => {
                for field in [PRIMARY, SECONDARY] {
                    for id in snapshot.token_candidates(field, tokens) {
                        let Some(doc) = snapshot.docs.get(id) else {
                            continue;
                        };
                        if let Some(score) = snapshot.field_score(doc, field, tokens) {
                            let weighted = score * self.field_weight(field);
                            let entry = best.entry(id).or_insert(weighted);
                            *entry = entry.max(weighted);
                        }
                    }
                }
            }
            SearchQuery::Phrase(phrase) => {
                let grams = phrase_grams(phrase, self.config.min_gram, self.config.max_gram);
                let needle = phrase.to_lowercase();
                for id in snapshot.phrase_candidates(&grams) {
                    let Some(doc) = snapshot.docs.get(id) else {
                        continue;
                    };
                    let relevance = [PRIMARY, SECONDARY]
                        .into_iter()
                        .filter(|&field| doc.texts[field].contains(needle.as_str()))
                        .map(|field| self.field_weight(field))
                        .reduce(f64::max);
                    if let Some(relevance) = relevance {
                        best.insert(id, relevance);
                    }
                }
            }
        }

        best.into_iter()
            .filter_map(|(id, relevance)| {
                let doc = snapshot.docs.get(id)?;
                Some((
                    doc.order,
                    SearchHit {
                        id: id.to_string(),
                        score: self.score(doc, relevance),
                    },
                ))
            })
            .collect()
    }

    fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| Error::SearchUnavailable("index lock poisoned".to_string()))?;
        // Only `clear` builds the index
        let snapshot = guard
            .as_mut()
            .ok_or_else(|| Error::SearchUnavailable("index not built".to_string()))?;
        // Copies only while a reader still holds the previous snapshot
        f(Arc::make_mut(snapshot));
        Ok(())
    }
}

#[async_trait]
impl SearchBackend for InvertedIndex {
    async fn query(&self, query: &SearchQuery, limit: usize) -> Result<Vec<SearchHit>> {
        let snapshot = self.current()?;
        let mut ranked = self.run(&snapshot, query);
        ranked.sort_by(|(a_order, a), (b_order, b)| {
            b.score.total_cmp(&a.score).then(a_order.cmp(b_order))
        });
        Ok(ranked.into_iter().take(limit).map(|(_, hit)| hit).collect())
    }

    async fn bulk_upsert(&self, pairs: &[SubtitlePair]) -> Result<()> {
        let (min_gram, max_gram) = (self.config.min_gram, self.config.max_gram);
        self.mutate(|snapshot| {
            for pair in pairs {
                snapshot.upsert(pair, min_gram, max_gram);
            }
        })
    }

    async fn clear(&self) -> Result<()> {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| Error::SearchUnavailable("index lock poisoned".to_string()))?;
        *guard = Some(Arc::new(Snapshot::default()));
        Ok(())
    }
}
