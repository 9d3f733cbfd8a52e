//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILSIFT_CONFIG` (environment variable)
//! 2. `~/.config/mailsift/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailsift\config.toml` (Windows)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::search::SearchOptions;
use crate::store::mbox::DEFAULT_BODY_CACHE;
use crate::store::SortKey;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Offline mail store.
    pub store: StoreConfig,
    /// Search defaults.
    pub search: SearchConfig,
    /// Saved searches: name → text query.
    pub searches: BTreeMap<String, String>,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
}

/// Offline mail store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one MBOX file per mailbox. Defaults to the
    /// current directory.
    pub root: Option<PathBuf>,
    /// Number of decoded message bodies kept in the LRU cache.
    pub body_cache_size: usize,
}

/// Search defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Charset sent with every native search. None sends no charset.
    pub charset: Option<String>,
    /// Mailbox searched when none is given.
    pub default_mailbox: String,
    /// Default sort key: "arrival", "date", "from", "subject", "size", "to", "cc".
    pub sort: SortKey,
    /// Default sort direction: "asc" or "desc".
    pub sort_order: String,
    /// Keep header caches across searches in one session.
    pub reuse_cache: bool,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: None,
            body_cache_size: DEFAULT_BODY_CACHE,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            charset: None,
            default_mailbox: "INBOX".to_string(),
            sort: SortKey::Arrival,
            sort_order: "asc".to_string(),
            reuse_cache: false,
        }
    }
}

impl SearchConfig {
    pub fn is_descending(&self) -> bool {
        self.sort_order.eq_ignore_ascii_case("desc")
    }

    /// Engine options for these defaults.
    pub fn options(&self) -> SearchOptions {
        SearchOptions {
            charset: self.charset.clone(),
            reuse_cache: self.reuse_cache,
        }
    }
}

impl Config {
    /// Text of a saved search.
    pub fn saved_search(&self, name: &str) -> Option<&str> {
        self.searches.get(name).map(String::as_str)
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILSIFT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailsift").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailsift")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailsift.log")
}
