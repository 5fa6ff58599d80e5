//! # Bilingo Common Library
//!
//! Shared code for the Bilingo engine and tools:
//! - Domain models (pairs, categories, mirrors, progression, stats)
//! - Database initialization
//! - Configuration loading
//! - Subtitle cue timing helpers

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod time;
pub mod timing;

pub use error::{Error, Result};
pub use models::{Category, MirrorKind};
