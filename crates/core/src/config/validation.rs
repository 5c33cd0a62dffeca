//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `chunk_size` is 0 or exceeds 500
    /// - `record_ttl_hours` is 0 or exceeds 30 days
    /// - `quote_cache_ttl_ms` is shorter than `cache_ttl_ms`
    /// - `retry_max_retries` exceeds 10
    /// - `delete_batch_size` is 0
    /// - a timeout is below 100ms or above 5 minutes
    /// - `remote_url` is set but not http(s)
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size", "must be greater than 0"));
        }
        if self.chunk_size > 500 {
            return Err(invalid("chunk_size", "must not exceed 500"));
        }

        if self.record_ttl_hours == 0 {
            return Err(invalid("record_ttl_hours", "must be greater than 0"));
        }
        if self.record_ttl_hours > 720 {
            return Err(invalid("record_ttl_hours", "must not exceed 720 (30 days)"));
        }

        if self.cache_ttl_ms == 0 {
            return Err(invalid("cache_ttl_ms", "must be greater than 0"));
        }
        if self.quote_cache_ttl_ms < self.cache_ttl_ms {
            return Err(invalid("quote_cache_ttl_ms", "must not be shorter than cache_ttl_ms"));
        }
        if self.cache_sweep_interval_ms == 0 {
            return Err(invalid("cache_sweep_interval_ms", "must be greater than 0"));
        }

        if self.retry_max_retries > 10 {
            return Err(invalid("retry_max_retries", "must not exceed 10"));
        }

        if self.queue_backoff_cap_ms < self.queue_backoff_base_ms {
            return Err(invalid("queue_backoff_cap_ms", "must not be smaller than queue_backoff_base_ms"));
        }

        if self.delete_batch_size == 0 {
            return Err(invalid("delete_batch_size", "must be greater than 0"));
        }

        for (field, value) in [("get_timeout_ms", self.get_timeout_ms), ("query_timeout_ms", self.query_timeout_ms)] {
            if value < 100 {
                return Err(invalid(field, "must be at least 100ms"));
            }
            if value > 300_000 {
                return Err(invalid(field, "must not exceed 5 minutes (300000ms)"));
            }
        }

        if let Some(url) = &self.remote_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(invalid("remote_url", "must be an http:// or https:// URL"));
        }

        if self.remote_url.is_none() && self.remote_api_key.is_some() {
            tracing::warn!("remote_api_key is set but remote_url is not; the key will be ignored");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_chunk_size_zero() {
        let config = AppConfig { chunk_size: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "chunk_size"));
    }

    #[test]
    fn test_validate_ttl_exceeds_limit() {
        let config = AppConfig { record_ttl_hours: 721, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "record_ttl_hours"));
    }

    #[test]
    fn test_validate_quote_ttl_shorter_than_default() {
        let config = AppConfig { cache_ttl_ms: 10_000, quote_cache_ttl_ms: 5_000, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "quote_cache_ttl_ms"));
    }

    #[test]
    fn test_validate_retry_limit() {
        let config = AppConfig { retry_max_retries: 11, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "retry_max_retries"));
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { query_timeout_ms: 50, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "query_timeout_ms"));
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = AppConfig { get_timeout_ms: 301_000, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "get_timeout_ms"));
    }

    #[test]
    fn test_validate_remote_url_scheme() {
        let config = AppConfig { remote_url: Some("ftp://docs.example.com".into()), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "remote_url"));
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig {
            chunk_size: 1,
            record_ttl_hours: 1,
            retry_max_retries: 0,
            get_timeout_ms: 100,
            query_timeout_ms: 300_000,
            delete_batch_size: 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
