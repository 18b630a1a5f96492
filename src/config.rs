//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - shapeql.toml (default configuration)
//! - shapeql.local.toml (git-ignored local overrides)
//! - Environment variables (SHAPEQL_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # shapeql.toml
//! [storage]
//! table_name = "Blogs"
//! max_rows = 0
//!
//! [evaluation]
//! enable_pushdown = true
//! separator = ", "
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! SHAPEQL_EVALUATION__ENABLE_PUSHDOWN=false
//! SHAPEQL_LOGGING__FORMAT=json
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// In-memory storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Table the blog records are stored in
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Maximum rows per table. 0 = no limit.
    #[serde(default)]
    pub max_rows: usize,
}

/// Predicate evaluation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Translate predicates into storage fragments when possible.
    /// When false every predicate is evaluated after materialisation.
    #[serde(default = "default_true")]
    pub enable_pushdown: bool,

    /// Separator used by joined-text fields of the default projection
    #[serde(default = "default_separator")]
    pub separator: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_table_name() -> String {
    "Blogs".to_string()
}
fn default_true() -> bool {
    true
}
fn default_separator() -> String {
    ", ".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. shapeql.toml (base configuration)
    /// 2. shapeql.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (SHAPEQL_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("shapeql.toml"))
            .merge(Toml::file("shapeql.local.toml"))
            .merge(Env::prefixed("SHAPEQL_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SHAPEQL_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig::default(),
            evaluation: EvaluationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            table_name: default_table_name(),
            max_rows: 0,
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            enable_pushdown: true,
            separator: default_separator(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
