//! Configuration loading.
//!
//! Settings resolve in priority order: environment variables, then the
//! TOML config file, then compiled defaults. The config file is looked up
//! at `$METARELAY_CONFIG` or `<config dir>/metarelay/config.toml`.

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file error: {0}")]
    File(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Per-category durable-tier TTLs, in seconds.
///
/// These are tuning inputs, not invariants; any category not listed here
/// falls back to `default`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheTtlConfig {
    pub collection_list: i64,
    pub collection_detail: i64,
    pub collection_years: i64,
    pub item_search: i64,
    pub item_detail: i64,
    pub media_detail: i64,
    pub default: i64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            collection_list: 86_400,    // 24 hours
            collection_detail: 604_800, // 7 days, collections rarely change
            collection_years: 3_600,    // 1 hour, derived from item sampling
            item_search: 300,           // 5 minutes
            item_detail: 86_400,        // 24 hours
            media_detail: 86_400,       // 24 hours
            default: 300,
        }
    }
}

impl CacheTtlConfig {
    /// TTL in seconds for a logical cache category.
    pub fn for_category(&self, category: &str) -> i64 {
        match category {
            "collection-list" => self.collection_list,
            "collection-detail" => self.collection_detail,
            "collection-years" => self.collection_years,
            "item-search" => self.item_search,
            "item-detail" => self.item_detail,
            "media-detail" => self.media_detail,
            _ => self.default,
        }
    }
}

/// Bounds for the year-bucket sampling window.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Pages of items fetched when deriving a collection's year buckets.
    pub year_sample_pages: u32,
    /// Items per sampled page.
    pub year_sample_per_page: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            year_sample_pages: 1,
            year_sample_per_page: 100,
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_host: String,
    pub bind_port: u16,
    pub database_path: PathBuf,
    pub upstream_base_url: String,
    /// Bearer token for the upstream API. Required at startup.
    pub upstream_api_key: Option<String>,
    /// Sustained upstream request rate, tokens per second.
    pub upstream_rate_limit: f64,
    /// Upstream burst capacity, tokens.
    pub upstream_burst_size: u32,
    pub ttl: CacheTtlConfig,
    pub sampling: SamplingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            bind_port: 8460,
            database_path: PathBuf::from("./data/metarelay.db"),
            upstream_base_url: "https://api.metadata.example.com".to_string(),
            upstream_api_key: None,
            upstream_rate_limit: 2.0,
            upstream_burst_size: 5,
            ttl: CacheTtlConfig::default(),
            sampling: SamplingConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings: TOML file (if present) overlaid with env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match Self::config_file_path() {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                tracing::info!("Loading config from {}", path.display());
                toml::from_str(&content)?
            }
            _ => Settings::default(),
        };
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn config_file_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("METARELAY_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|d| d.join("metarelay").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("METARELAY_HOST") {
            self.bind_host = host;
        }
        if let Ok(port) = std::env::var("METARELAY_PORT") {
            if let Ok(port) = port.parse() {
                self.bind_port = port;
            }
        }
        if let Ok(path) = std::env::var("METARELAY_DATABASE") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("UPSTREAM_BASE_URL") {
            self.upstream_base_url = url;
        }
        if let Ok(key) = std::env::var("UPSTREAM_API_KEY") {
            self.upstream_api_key = Some(key);
        }
        if let Ok(rate) = std::env::var("UPSTREAM_RATE_LIMIT") {
            if let Ok(rate) = rate.parse() {
                self.upstream_rate_limit = rate;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match &self.upstream_api_key {
            Some(key) if !key.trim().is_empty() => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "UPSTREAM_API_KEY must be set (env var or config file)".to_string(),
                ))
            }
        }
        if self.upstream_rate_limit <= 0.0 {
            return Err(ConfigError::Invalid(
                "upstream_rate_limit must be positive".to_string(),
            ));
        }
        if self.upstream_burst_size == 0 {
            return Err(ConfigError::Invalid(
                "upstream_burst_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
