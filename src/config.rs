//! Configuration for keyscope.
//!
//! [`Config::load`] layers, in increasing priority: the embedded defaults, an
//! optional TOML file, and `KEYSCOPE__SECTION__KEY` environment variables.
//! [`Config::defaults`] returns the embedded defaults alone (useful in tests).

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::search::SearchLimits;

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
[server]
bind             = "127.0.0.1:5002"
upload_dir       = "uploads"
max_upload_bytes = 16777216

[search]
max_depth = 1024
page_size = 100
"#;

pub const ENV_PREFIX: &str = "KEYSCOPE";

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind() -> String { "127.0.0.1:5002".to_string() }
fn default_upload_dir() -> PathBuf { PathBuf::from("uploads") }
fn default_max_upload_bytes() -> usize { 16 * 1024 * 1024 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// `[search]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_max_depth() -> usize { crate::search::DEFAULT_MAX_DEPTH }
fn default_page_size() -> usize { 100 }

impl Default for SearchConfig {
    fn default() -> Self {
        Self { max_depth: default_max_depth(), page_size: default_page_size() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    /// Load defaults, then `file` (which must exist when given), then the
    /// process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::from_sources(file, environment())
    }

    pub fn from_sources(
        file: Option<&Path>,
        env: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml));
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder.add_source(env).build()?.try_deserialize()
    }

    /// Return the built-in defaults without touching the filesystem.
    pub fn defaults() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap_or_else(|_| Self { server: ServerConfig::default(), search: SearchConfig::default() })
    }

    pub fn search_limits(&self) -> SearchLimits {
        SearchLimits { max_depth: self.search.max_depth }
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
