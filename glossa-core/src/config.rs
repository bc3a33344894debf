//! Configuration types
//!
//! Loaded from TOML. Every section has defaults so a config file only needs
//! to name what differs, but unknown keys are rejected.

use crate::{ConfigError, GlossaError, GlossaResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Content cache tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Skip a refresh when the watermark was written less than this ago.
    pub refresh_debounce_secs: u64,
    /// How far before the watermark change discovery starts looking.
    pub discovery_skew_secs: u64,
    /// Subtracted from the newest observed timestamp before it becomes the
    /// watermark, since change feeds lag slightly.
    pub trailing_margin_secs: u64,
    /// Titles per local lookup round in `get_multiple`.
    pub lookup_batch_size: usize,
    /// Unresolved titles held before escalating to the source.
    pub fetch_flush_threshold: usize,
    /// Records per write transaction.
    pub save_batch_size: usize,
    pub max_redirect_hops: usize,
    /// Root directory for on-disk stores.
    pub cache_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_debounce_secs: 60,
            discovery_skew_secs: 5,
            trailing_margin_secs: 300,
            lookup_batch_size: 500,
            fetch_flush_threshold: 10_000,
            save_batch_size: 200,
            max_redirect_hops: 10,
            cache_dir: PathBuf::from("_cache"),
        }
    }
}

impl CacheConfig {
    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_secs(self.refresh_debounce_secs)
    }

    pub fn discovery_skew(&self) -> Duration {
        Duration::from_secs(self.discovery_skew_secs)
    }

    pub fn trailing_margin(&self) -> Duration {
        Duration::from_secs(self.trailing_margin_secs)
    }

    pub fn with_refresh_debounce(mut self, debounce: Duration) -> Self {
        self.refresh_debounce_secs = debounce.as_secs();
        self
    }

    pub fn with_trailing_margin(mut self, margin: Duration) -> Self {
        self.trailing_margin_secs = margin.as_secs();
        self
    }

    pub fn with_lookup_batch_size(mut self, size: usize) -> Self {
        self.lookup_batch_size = size;
        self
    }

    pub fn with_fetch_flush_threshold(mut self, threshold: usize) -> Self {
        self.fetch_flush_threshold = threshold;
        self
    }

    pub fn with_save_batch_size(mut self, size: usize) -> Self {
        self.save_batch_size = size;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }
}

/// Retry configuration for remote requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Remote wiki endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    /// Minimum spacing between two requests.
    pub rate_limit_ms: u64,
    pub titles_per_request: usize,
    pub retry: RetryConfig,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: "https://ru.wiktionary.org/w/api.php".to_string(),
            user_agent: concat!("glossa/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_ms: 30_000,
            rate_limit_ms: 100,
            titles_per_request: 50,
            retry: RetryConfig::default(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

/// Master configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlossaConfig {
    pub cache: CacheConfig,
    pub remote: RemoteConfig,
    /// Namespace of the pages being parsed.
    pub content_namespace: i32,
    pub template_namespace: i32,
    /// Title prefix under which template bodies are stored.
    pub template_prefix: String,
}

impl Default for GlossaConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            remote: RemoteConfig::default(),
            content_namespace: 0,
            template_namespace: 10,
            template_prefix: "Шаблон:".to_string(),
        }
    }
}

impl GlossaConfig {
    pub fn from_toml_str(source: &str) -> GlossaResult<Self> {
        let config: GlossaConfig = toml::from_str(source).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            value: String::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> GlossaResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    /// Validate the configuration.
    ///
    /// Batch sizes must be positive, the API URL must be http(s), and the
    /// backoff multiplier must not shrink delays.
    pub fn validate(&self) -> GlossaResult<()> {
        let positive = [
            ("cache.lookup_batch_size", self.cache.lookup_batch_size),
            ("cache.fetch_flush_threshold", self.cache.fetch_flush_threshold),
            ("cache.save_batch_size", self.cache.save_batch_size),
            ("cache.max_redirect_hops", self.cache.max_redirect_hops),
            ("remote.titles_per_request", self.remote.titles_per_request),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, value.to_string(), "must be greater than 0"));
            }
        }

        if self.remote.api_url.is_empty() {
            return Err(GlossaError::Config(ConfigError::MissingRequired {
                field: "remote.api_url".to_string(),
            }));
        }
        if !self.remote.api_url.starts_with("http://") && !self.remote.api_url.starts_with("https://") {
            return Err(invalid(
                "remote.api_url",
                self.remote.api_url.clone(),
                "must be an http(s) URL",
            ));
        }

        let retry = &self.remote.retry;
        if retry.backoff_multiplier < 1.0 {
            return Err(invalid(
                "remote.retry.backoff_multiplier",
                retry.backoff_multiplier.to_string(),
                "must be at least 1.0",
            ));
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(invalid(
                "remote.retry.initial_backoff_ms",
                retry.initial_backoff_ms.to_string(),
                "must not exceed max_backoff_ms",
            ));
        }

        if self.template_prefix.is_empty() {
            return Err(GlossaError::Config(ConfigError::MissingRequired {
                field: "template_prefix".to_string(),
            }));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: String, reason: &str) -> GlossaError {
    GlossaError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}
