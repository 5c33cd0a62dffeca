//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (QUOTESYNC_*)
//! 2. TOML config file (if QUOTESYNC_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (QUOTESYNC_*)
/// 2. TOML config file (if QUOTESYNC_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite file backing the local-device store.
    ///
    /// Set via QUOTESYNC_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Base URL of the remote document store.
    ///
    /// Set via QUOTESYNC_REMOTE_URL. When absent every category is served
    /// from the local-device store.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Bearer token for the remote document store.
    ///
    /// Set via QUOTESYNC_REMOTE_API_KEY environment variable.
    #[serde(default)]
    pub remote_api_key: Option<String>,

    /// Maximum number of collection elements per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Lifetime of remote records and chunks, in hours.
    #[serde(default = "default_record_ttl_hours")]
    pub record_ttl_hours: u64,

    /// In-memory cache TTL for generic data, in milliseconds.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// In-memory cache TTL for quote collections, in milliseconds.
    #[serde(default = "default_quote_cache_ttl_ms")]
    pub quote_cache_ttl_ms: u64,

    /// Interval between proactive cache sweeps, in milliseconds.
    #[serde(default = "default_cache_sweep_interval_ms")]
    pub cache_sweep_interval_ms: u64,

    /// Retries made by the retry helper after a transient failure.
    #[serde(default = "default_retry_max_retries")]
    pub retry_max_retries: u32,

    /// Base delay of the retry helper; retry `n` waits `n * base`.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Minimum spacing between the starts of queued operations.
    #[serde(default = "default_queue_min_delay_ms")]
    pub queue_min_delay_ms: u64,

    /// Base of the queue's exponential backoff on resource exhaustion.
    #[serde(default = "default_queue_backoff_base_ms")]
    pub queue_backoff_base_ms: u64,

    /// Upper bound of the queue's backoff.
    #[serde(default = "default_queue_backoff_cap_ms")]
    pub queue_backoff_cap_ms: u64,

    /// Pause after each queued operation settles.
    #[serde(default = "default_queue_yield_ms")]
    pub queue_yield_ms: u64,

    /// Spacing between consecutive chunk writes.
    #[serde(default = "default_chunk_write_delay_ms")]
    pub chunk_write_delay_ms: u64,

    /// Number of stale chunks deleted concurrently per batch.
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,

    /// Pause between delete batches.
    #[serde(default = "default_delete_batch_delay_ms")]
    pub delete_batch_delay_ms: u64,

    /// Timeout for single-record reads.
    #[serde(default = "default_get_timeout_ms")]
    pub get_timeout_ms: u64,

    /// Timeout for chunk queries.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./quotesync-local.sqlite")
}

fn default_chunk_size() -> usize {
    25
}

fn default_record_ttl_hours() -> u64 {
    24
}

fn default_cache_ttl_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_quote_cache_ttl_ms() -> u64 {
    1_800_000 // 30 minutes
}

fn default_cache_sweep_interval_ms() -> u64 {
    60_000
}

fn default_retry_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_queue_min_delay_ms() -> u64 {
    100
}

fn default_queue_backoff_base_ms() -> u64 {
    1_000
}

fn default_queue_backoff_cap_ms() -> u64 {
    30_000
}

fn default_queue_yield_ms() -> u64 {
    10
}

fn default_chunk_write_delay_ms() -> u64 {
    100
}

fn default_delete_batch_size() -> usize {
    5
}

fn default_delete_batch_delay_ms() -> u64 {
    50
}

fn default_get_timeout_ms() -> u64 {
    10_000
}

fn default_query_timeout_ms() -> u64 {
    15_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            remote_url: None,
            remote_api_key: None,
            chunk_size: default_chunk_size(),
            record_ttl_hours: default_record_ttl_hours(),
            cache_ttl_ms: default_cache_ttl_ms(),
            quote_cache_ttl_ms: default_quote_cache_ttl_ms(),
            cache_sweep_interval_ms: default_cache_sweep_interval_ms(),
            retry_max_retries: default_retry_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            queue_min_delay_ms: default_queue_min_delay_ms(),
            queue_backoff_base_ms: default_queue_backoff_base_ms(),
            queue_backoff_cap_ms: default_queue_backoff_cap_ms(),
            queue_yield_ms: default_queue_yield_ms(),
            chunk_write_delay_ms: default_chunk_write_delay_ms(),
            delete_batch_size: default_delete_batch_size(),
            delete_batch_delay_ms: default_delete_batch_delay_ms(),
            get_timeout_ms: default_get_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Lifetime applied to every remote record at write time.
    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_hours * 60 * 60)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn quote_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.quote_cache_ttl_ms)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.cache_sweep_interval_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn queue_min_delay(&self) -> Duration {
        Duration::from_millis(self.queue_min_delay_ms)
    }

    pub fn queue_backoff_base(&self) -> Duration {
        Duration::from_millis(self.queue_backoff_base_ms)
    }

    pub fn queue_backoff_cap(&self) -> Duration {
        Duration::from_millis(self.queue_backoff_cap_ms)
    }

    pub fn queue_yield(&self) -> Duration {
        Duration::from_millis(self.queue_yield_ms)
    }

    pub fn chunk_write_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_write_delay_ms)
    }

    pub fn delete_batch_delay(&self) -> Duration {
        Duration::from_millis(self.delete_batch_delay_ms)
    }

    /// Timeout for single-record gets as Duration for use with tokio.
    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }

    /// Timeout for chunk queries as Duration for use with tokio.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `QUOTESYNC_`
    /// 2. TOML file from `QUOTESYNC_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("QUOTESYNC_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("QUOTESYNC_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Remote store URL, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no remote URL is set.
    pub fn require_remote_url(&self) -> Result<&str, ConfigError> {
        self.remote_url.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "remote_url".into(),
            hint: "Set QUOTESYNC_REMOTE_URL environment variable".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./quotesync-local.sqlite"));
        assert!(config.remote_url.is_none());
        assert_eq!(config.chunk_size, 25);
        assert_eq!(config.record_ttl_hours, 24);
        assert_eq!(config.retry_max_retries, 3);
        assert_eq!(config.get_timeout_ms, 10_000);
        assert_eq!(config.query_timeout_ms, 15_000);
        assert!(config.quote_cache_ttl_ms > config.cache_ttl_ms);
    }

    #[test]
    fn test_duration_accessors() {
        let config = AppConfig::default();
        assert_eq!(config.record_ttl(), Duration::from_secs(24 * 3600));
        assert_eq!(config.get_timeout(), Duration::from_secs(10));
        assert_eq!(config.query_timeout(), Duration::from_secs(15));
        assert_eq!(config.queue_backoff_cap(), Duration::from_secs(30));
    }

    #[test]
    fn test_require_remote_url_missing() {
        let config = AppConfig::default();
        let result = config.require_remote_url();
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_require_remote_url_present() {
        let config = AppConfig { remote_url: Some("https://docs.example.com".into()), ..Default::default() };
        assert_eq!(config.require_remote_url().unwrap(), "https://docs.example.com");
    }
}
