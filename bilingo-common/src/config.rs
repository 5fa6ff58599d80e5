//! Configuration loading and root folder resolution
//!
//! Every setting has a compiled default. A missing config file, or a file that
//! only sets a few keys, never stops the engine from starting.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_ENV_VAR: &str = "BILINGO_ROOT";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "bilingo.db";

/// Full engine configuration, as read from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub root_folder: Option<PathBuf>,
    pub database: DatabaseConfig,
    pub progression: ProgressionConfig,
    pub random: RandomConfig,
    pub navigation: NavigationConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    /// Energy and max energy of a freshly provisioned user
    pub starting_energy: i64,
    /// Level threshold is `level * xp_per_level`
    pub xp_per_level: i64,
    /// Max energy gained per level-up
    pub energy_per_level: i64,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            starting_energy: 10,
            xp_per_level: 10,
            energy_per_level: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomConfig {
    pub seq_attempts: u32,
    pub skip_attempts: u32,
}

impl Default for RandomConfig {
    fn default() -> Self {
        Self {
            seq_attempts: 5,
            skip_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Largest |offset| resolved through `seq_id` arithmetic
    pub fast_path_max_offset: i64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            fast_path_max_offset: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub result_limit: usize,
    pub reindex_batch_size: i64,
    /// Added to the relevance score per rating point
    pub rating_boost: f64,
    /// Weight of primary-text matches relative to secondary-text matches
    pub primary_field_weight: f64,
    pub min_gram: usize,
    pub max_gram: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            result_limit: 100,
            reindex_batch_size: 1000,
            rating_boost: 0.2,
            primary_field_weight: 2.0,
            min_gram: 3,
            max_gram: 20,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; absent keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::from_toml_str(&content)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Load from the explicit path if given, else from the platform config locations
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match find_config_file() {
            Some(path) => Self::load(&path),
            None => {
                info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(Error::Config("database.max_connections must be at least 1".to_string()));
        }
        if self.progression.starting_energy < 0 {
            return Err(Error::Config("progression.starting_energy must not be negative".to_string()));
        }
        if self.progression.xp_per_level < 1 {
            return Err(Error::Config("progression.xp_per_level must be at least 1".to_string()));
        }
        if self.progression.energy_per_level < 0 {
            return Err(Error::Config("progression.energy_per_level must not be negative".to_string()));
        }
        if self.search.reindex_batch_size < 1 {
            return Err(Error::Config("search.reindex_batch_size must be at least 1".to_string()));
        }
        if self.search.min_gram == 0 || self.search.min_gram > self.search.max_gram {
            return Err(Error::Config(format!(
                "search gram range {}..={} is empty",
                self.search.min_gram, self.search.max_gram
            )));
        }
        Ok(())
    }
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `root_folder` key of the TOML config
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config: &EngineConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Database file location for a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

/// Config file locations: `~/.config/bilingo/config.toml`, then `/etc/bilingo/config.toml`
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("bilingo").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/bilingo/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("bilingo"))
        .unwrap_or_else(|| PathBuf::from("./bilingo_data"))
}
