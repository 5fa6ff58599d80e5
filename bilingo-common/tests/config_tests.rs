//! Unit tests for configuration and graceful degradation
//!
//! Covers:
//! - Missing config files fall back to defaults
//! - Partial config files keep defaults for absent keys
//! - Root folder resolution priority order
//!
//! Tests that manipulate BILINGO_ROOT are marked with #[serial]
//! so they do not race on the process environment.

use bilingo_common::config::{
    database_path, resolve_root_folder, EngineConfig, DATABASE_FILE, ROOT_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
fn test_defaults_match_documented_values() {
    let config = EngineConfig::default();

    assert_eq!(config.progression.starting_energy, 10);
    assert_eq!(config.progression.xp_per_level, 10);
    assert_eq!(config.progression.energy_per_level, 5);
    assert_eq!(config.random.seq_attempts, 5);
    assert_eq!(config.random.skip_attempts, 3);
    assert_eq!(config.navigation.fast_path_max_offset, 100);
    assert_eq!(config.search.result_limit, 100);
    assert_eq!(config.search.reindex_batch_size, 1000);
    assert!((config.search.rating_boost - 0.2).abs() < f64::EPSILON);
    assert_eq!((config.search.min_gram, config.search.max_gram), (3, 20));
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_toml_keeps_other_defaults() {
    let config = EngineConfig::from_toml_str(
        r#"
        [progression]
        starting_energy = 3

        [search]
        result_limit = 25
        "#,
    )
    .expect("partial config should parse");

    assert_eq!(config.progression.starting_energy, 3);
    assert_eq!(config.progression.xp_per_level, 10);
    assert_eq!(config.search.result_limit, 25);
    assert_eq!(config.search.reindex_batch_size, 1000);
    assert_eq!(config.database.busy_timeout_ms, 5000);
}

#[test]
fn test_invalid_values_rejected() {
    let result = EngineConfig::from_toml_str("[progression]\nxp_per_level = 0\n");
    assert!(result.is_err());

    let result = EngineConfig::from_toml_str("[search]\nmin_gram = 5\nmax_gram = 4\n");
    assert!(result.is_err());

    let result = EngineConfig::from_toml_str("this is = = not toml");
    assert!(result.is_err());
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn test_load_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "root_folder = \"/srv/bilingo\"\n[random]\nseq_attempts = 7\n").unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/bilingo")));
    assert_eq!(config.random.seq_attempts, 7);
}

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(ROOT_ENV_VAR, "/from/env");
    let config = EngineConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    let root = resolve_root_folder(Some("/from/cli"), ROOT_ENV_VAR, &config);
    assert_eq!(root, PathBuf::from("/from/cli"));

    env::remove_var(ROOT_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_beats_toml() {
    env::set_var(ROOT_ENV_VAR, "/from/env");
    let config = EngineConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    let root = resolve_root_folder(None, ROOT_ENV_VAR, &config);
    assert_eq!(root, PathBuf::from("/from/env"));

    env::remove_var(ROOT_ENV_VAR);
}

#[test]
#[serial]
fn test_toml_then_default() {
    env::remove_var(ROOT_ENV_VAR);

    let config = EngineConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };
    assert_eq!(
        resolve_root_folder(None, ROOT_ENV_VAR, &config),
        PathBuf::from("/from/toml")
    );

    let fallback = resolve_root_folder(None, ROOT_ENV_VAR, &EngineConfig::default());
    assert!(!fallback.as_os_str().is_empty());
}

#[test]
fn test_database_path_inside_root() {
    let path = database_path(&PathBuf::from("/data/bilingo"));
    assert_eq!(path, PathBuf::from("/data/bilingo").join(DATABASE_FILE));
}
