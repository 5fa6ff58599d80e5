//! Domain models shared by the engine and its tools

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::timing::cue_start_ms;
use crate::{Error, Result};

/// Editorial tag on a pair
///
/// Stored as `NULL` for [`Category::None`] and the lowercase name otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    None,
    Idiom,
    Quote,
    Wrong,
}

impl Category {
    /// Column value for this category
    pub fn as_db(self) -> Option<&'static str> {
        match self {
            Category::None => None,
            Category::Idiom => Some("idiom"),
            Category::Quote => Some("quote"),
            Category::Wrong => Some("wrong"),
        }
    }

    /// Decode a column value; unknown strings are a data error
    pub fn from_db(value: Option<&str>) -> Result<Self> {
        match value {
            None => Ok(Category::None),
            Some(s) => s.parse(),
        }
    }

    /// Next state after an explicit `set(requested)`
    ///
    /// Setting the active value again clears it; anything else switches directly.
    pub fn toggled(self, requested: Category) -> Category {
        if self == requested {
            Category::None
        } else {
            requested
        }
    }

    /// Mirror collection this category feeds, if any
    pub fn mirror_kind(self) -> Option<MirrorKind> {
        match self {
            Category::Idiom => Some(MirrorKind::Idiom),
            Category::Quote => Some(MirrorKind::Quote),
            Category::None | Category::Wrong => None,
        }
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "null" => Ok(Category::None),
            "idiom" => Ok(Category::Idiom),
            "quote" => Ok(Category::Quote),
            "wrong" => Ok(Category::Wrong),
            other => Err(Error::InvalidInput(format!(
                "category must be one of: idiom, quote, wrong, or none (got '{}')",
                other
            ))),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db().unwrap_or("none"))
    }
}

/// Which side of a pair a field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Primary,
    Secondary,
}

impl Language {
    pub fn other(self) -> Language {
        match self {
            Language::Primary => Language::Secondary,
            Language::Secondary => Language::Primary,
        }
    }
}

/// A bilingual content unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitlePair {
    pub id: String,
    pub primary_text: String,
    pub secondary_text: String,
    pub primary_file: Option<String>,
    pub secondary_file: Option<String>,
    pub primary_time: Option<String>,
    pub secondary_time: Option<String>,
    pub rating: i64,
    pub category: Category,
    pub seq_id: Option<i64>,
}

impl SubtitlePair {
    /// Source file used to group pairs for temporal navigation
    pub fn source_file(&self) -> Option<&str> {
        self.primary_file
            .as_deref()
            .or(self.secondary_file.as_deref())
            .filter(|f| !f.is_empty())
    }

    /// True if this pair belongs to the given source file on either side
    pub fn in_file(&self, file: &str) -> bool {
        self.primary_file.as_deref() == Some(file) || self.secondary_file.as_deref() == Some(file)
    }

    pub fn cue(&self, language: Language) -> Option<&str> {
        let cue = match language {
            Language::Primary => self.primary_time.as_deref(),
            Language::Secondary => self.secondary_time.as_deref(),
        };
        cue.filter(|c| !c.is_empty())
    }

    /// Language whose timing orders navigation for this pair
    pub fn timing_language(&self) -> Language {
        if self.cue(Language::Primary).is_some() {
            Language::Primary
        } else {
            Language::Secondary
        }
    }

    /// Cue start in milliseconds, falling back to the other language
    pub fn start_ms(&self, preferred: Language) -> Option<i64> {
        self.cue(preferred)
            .and_then(cue_start_ms)
            .or_else(|| self.cue(preferred.other()).and_then(cue_start_ms))
    }
}

/// A normalized record handed over by ingestion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPair {
    pub primary_text: String,
    pub secondary_text: String,
    #[serde(default)]
    pub primary_file: Option<String>,
    #[serde(default)]
    pub secondary_file: Option<String>,
    #[serde(default)]
    pub primary_time: Option<String>,
    #[serde(default)]
    pub secondary_time: Option<String>,
    #[serde(default)]
    pub rating: i64,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub seq_id: Option<i64>,
}

/// Mirror collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorKind {
    Idiom,
    Quote,
}

impl MirrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MirrorKind::Idiom => "idiom",
            MirrorKind::Quote => "quote",
        }
    }
}

impl FromStr for MirrorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idiom" => Ok(MirrorKind::Idiom),
            "quote" => Ok(MirrorKind::Quote),
            other => Err(Error::InvalidInput(format!("unknown mirror kind '{}'", other))),
        }
    }
}

/// Editorial lifecycle of a mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorStatus {
    Draft,
    Published,
    Deleted,
}

impl MirrorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MirrorStatus::Draft => "draft",
            MirrorStatus::Published => "published",
            MirrorStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for MirrorStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(MirrorStatus::Draft),
            "published" => Ok(MirrorStatus::Published),
            "deleted" => Ok(MirrorStatus::Deleted),
            other => Err(Error::Internal(format!("unknown mirror status '{}'", other))),
        }
    }
}

/// Where a mirror was copied from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSource {
    pub pair_id: String,
    pub pair_seq_id: Option<i64>,
    pub file: Option<String>,
    pub time: Option<String>,
}

/// User-owned editorial copy of an idiom or quote pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mirror {
    pub id: String,
    pub kind: MirrorKind,
    pub title: Option<String>,
    pub primary_text: String,
    pub secondary_text: String,
    pub explanation: Option<String>,
    pub source: MirrorSource,
    pub owner_id: String,
    pub status: MirrorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Owner edit of a mirror; `None` leaves a field as is, an empty string clears an optional field
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorEdit {
    pub title: Option<String>,
    pub primary_text: Option<String>,
    pub secondary_text: Option<String>,
    pub explanation: Option<String>,
}

impl MirrorEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.primary_text.is_none()
            && self.secondary_text.is_none()
            && self.explanation.is_none()
    }
}

/// Per-user quota and progression record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionState {
    pub user_id: String,
    pub energy: i64,
    pub max_energy: i64,
    pub level: i64,
    pub xp: i64,
    pub last_recharge: Option<DateTime<Utc>>,
}

impl ProgressionState {
    pub fn can_afford(&self) -> bool {
        self.energy > 0
    }

    /// XP needed to reach the next level
    pub fn max_xp(&self, xp_per_level: i64) -> i64 {
        (self.level * xp_per_level).max(1)
    }
}

/// Cached corpus statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total: i64,
    pub source_files: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Strip the subtitle extension and trailing language code from a file name
///
/// `movie_en.srt` → `movie`, `movie.srt` → `movie`, `notes.txt` → `notes.txt`
pub fn strip_language_suffix(file: &str) -> String {
    let Some(stem) = file.strip_suffix(".srt") else {
        return file.to_string();
    };
    match stem.rsplit_once('_') {
        Some((base, lang))
            if !base.is_empty()
                && (2..=3).contains(&lang.len())
                && lang.bytes().all(|b| b.is_ascii_alphabetic()) =>
        {
            base.to_string()
        }
        _ => stem.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> SubtitlePair {
        SubtitlePair {
            id: "p1".to_string(),
            primary_text: "Break a leg".to_string(),
            secondary_text: "Ни пуха ни пера".to_string(),
            primary_file: Some("show_en.srt".to_string()),
            secondary_file: Some("show_ru.srt".to_string()),
            primary_time: None,
            secondary_time: Some("00:00:05,000 --> 00:00:06,000".to_string()),
            rating: 0,
            category: Category::None,
            seq_id: Some(1),
        }
    }

    #[test]
    fn test_category_toggle_machine() {
        assert_eq!(Category::None.toggled(Category::Idiom), Category::Idiom);
        assert_eq!(Category::Idiom.toggled(Category::Idiom), Category::None);
        assert_eq!(Category::Idiom.toggled(Category::Quote), Category::Quote);
        assert_eq!(Category::Wrong.toggled(Category::None), Category::None);
        assert_eq!(Category::None.toggled(Category::None), Category::None);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("Idiom".parse::<Category>().unwrap(), Category::Idiom);
        assert_eq!("null".parse::<Category>().unwrap(), Category::None);
        assert_eq!("".parse::<Category>().unwrap(), Category::None);
        assert!(matches!("slang".parse::<Category>(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_category_db_round_trip() {
        for c in [Category::None, Category::Idiom, Category::Quote, Category::Wrong] {
            assert_eq!(Category::from_db(c.as_db()).unwrap(), c);
        }
    }

    #[test]
    fn test_mirror_kind_only_for_idiom_and_quote() {
        assert_eq!(Category::Idiom.mirror_kind(), Some(MirrorKind::Idiom));
        assert_eq!(Category::Quote.mirror_kind(), Some(MirrorKind::Quote));
        assert_eq!(Category::Wrong.mirror_kind(), None);
        assert_eq!(Category::None.mirror_kind(), None);
    }

    #[test]
    fn test_timing_falls_back_to_other_language() {
        let p = pair();
        assert_eq!(p.timing_language(), Language::Secondary);
        assert_eq!(p.start_ms(Language::Primary), Some(5_000));
        assert_eq!(p.source_file(), Some("show_en.srt"));
        assert!(p.in_file("show_ru.srt"));
    }

    #[test]
    fn test_strip_language_suffix() {
        assert_eq!(strip_language_suffix("movie_en.srt"), "movie");
        assert_eq!(strip_language_suffix("a_b_rus.srt"), "a_b");
        assert_eq!(strip_language_suffix("movie.srt"), "movie");
        assert_eq!(strip_language_suffix("movie_2019.srt"), "movie_2019");
        assert_eq!(strip_language_suffix("notes.txt"), "notes.txt");
    }

    #[test]
    fn test_max_xp_scales_with_level() {
        let state = ProgressionState {
            user_id: "u".to_string(),
            energy: 3,
            max_energy: 10,
            level: 3,
            xp: 0,
            last_recharge: None,
        };
        assert_eq!(state.max_xp(10), 30);
        assert!(state.can_afford());
    }
}
