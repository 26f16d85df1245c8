//! Configuration loading.
//!
//! Settings live in a TOML file. Every key is optional; anything missing falls
//! back to the defaults shown below.
//!
//! ```toml
//! [api]
//! base_url = "https://coda.io/apis/v1"
//! token = "..."            # or PAGETREE_API_TOKEN
//! timeout_secs = 30
//!
//! [nested]
//! include_nested = true
//! depth = 3                # 0..=10 or "unlimited"
//!
//! [export]
//! output_format = "markdown"
//! poll_interval_ms = 2000
//! max_poll_attempts = 30
//! settle_delay_ms = 3000
//! retry_max_attempts = 3
//! retry_base_delay_ms = 1000
//! job_ttl_secs = 600
//! content_freshness_secs = 300
//!
//! [limits.write_content]   # read, write, write_content, list_docs, analytics
//! max_concurrent = 2
//! min_spacing_ms = 250
//! reservoir = 5
//! refresh_interval_ms = 10000
//! ```
//!
//! ## Resolution
//!
//! 1. An explicit path (the CLI's `--config`); it must exist.
//! 2. `$PAGETREE_CONFIG`.
//! 3. `<config dir>/pagetree/config.toml` from the platform's project
//!    directories.
//!
//! A missing file at step 2 or 3 yields the defaults. `PAGETREE_API_TOKEN` and
//! `PAGETREE_API_BASE_URL` override the file.
//!
//! ```rust
//! use pagetree_core::{Config, MaxDepth};
//!
//! let config = Config::from_toml_str("[nested]\ndepth = \"unlimited\"\n")?;
//! assert_eq!(config.nested.depth, MaxDepth::Unlimited);
//! assert!(config.nested.include_nested);
//! # Ok::<(), pagetree_core::Error>(())
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::{DEFAULT_BASE_URL, HttpExportApi};
use crate::cache::{DEFAULT_CONTENT_FRESHNESS_SECS, DEFAULT_JOB_TTL_SECS};
use crate::limiter::{RateLimitCategory, RateLimitQuota, RateLimits};
use crate::orchestrator::OrchestratorSettings;
use crate::retry::RetryPolicy;
use crate::types::{NestedExportSettings, OutputFormat};
use crate::workflow::WorkflowSettings;
use crate::{Error, Result};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PAGETREE_CONFIG";
/// Environment variable overriding `[api].token`.
pub const TOKEN_ENV: &str = "PAGETREE_API_TOKEN";
/// Environment variable overriding `[api].base_url`.
pub const BASE_URL_ENV: &str = "PAGETREE_API_BASE_URL";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote API access.
    pub api: ApiConfig,
    /// Which pages to include.
    pub nested: NestedExportSettings,
    /// Export timing and caching.
    pub export: ExportConfig,
    /// Per-category quota overrides.
    pub limits: BTreeMap<RateLimitCategory, LimitOverride>,
}

/// `[api]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API root URL.
    pub base_url: String,
    /// Bearer token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

/// `[export]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Format requested from the export endpoint.
    pub output_format: OutputFormat,
    /// Pause between status checks.
    pub poll_interval_ms: u64,
    /// Status checks per job before giving up.
    pub max_poll_attempts: u32,
    /// Pause between submitting and polling.
    pub settle_delay_ms: u64,
    /// Retries for submission, download, and metadata fetches.
    pub retry_max_attempts: u32,
    /// Delay before the first retry; doubles each time.
    pub retry_base_delay_ms: u64,
    /// Lifetime of a remembered job id.
    pub job_ttl_secs: u64,
    /// Lifetime of content without a modification marker.
    pub content_freshness_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Markdown,
            poll_interval_ms: 2_000,
            max_poll_attempts: 30,
            settle_delay_ms: 3_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 1_000,
            job_ttl_secs: DEFAULT_JOB_TTL_SECS.unsigned_abs(),
            content_freshness_secs: DEFAULT_CONTENT_FRESHNESS_SECS.unsigned_abs(),
        }
    }
}

/// `[limits.<category>]` section; unset keys keep the category default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitOverride {
    /// Maximum admitted operations in flight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,
    /// Minimum time between admissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_spacing_ms: Option<u64>,
    /// Admissions per window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservoir: Option<u32>,
    /// Window length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_interval_ms: Option<u64>,
}

impl LimitOverride {
    fn apply(&self, base: RateLimitQuota) -> RateLimitQuota {
        RateLimitQuota {
            max_concurrent: self.max_concurrent.unwrap_or(base.max_concurrent),
            min_spacing: self
                .min_spacing_ms
                .map_or(base.min_spacing, Duration::from_millis),
            reservoir: self.reservoir.unwrap_or(base.reservoir),
            refresh_interval: self
                .refresh_interval_ms
                .map_or(base.refresh_interval, Duration::from_millis),
        }
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

impl Config {
    /// Load configuration, apply environment overrides, and validate.
    ///
    /// See the module docs for how the file is located.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::config_path()?;
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {e}")))
    }

    /// Path used when no explicit path is given.
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        let dirs = directories::ProjectDirs::from("", "", "pagetree")
            .ok_or_else(|| Error::Config("Failed to determine project directories".into()))?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Apply token and base-URL overrides from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            self.api.token = Some(token);
        }
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.api.base_url = base_url;
        }
    }

    /// Reject settings that cannot work.
    ///
    /// A missing token is not checked here; the API client rejects it when
    /// built, so commands that never talk to the service still run.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api.base_url).map_err(|e| {
            Error::Config(format!("api.base_url '{}' is invalid: {e}", self.api.base_url))
        })?;
        if self.api.timeout_secs == 0 {
            return Err(Error::Config("api.timeout_secs must be positive".into()));
        }
        self.nested.depth.validate()?;
        if self.export.max_poll_attempts == 0 {
            return Err(Error::Config("export.max_poll_attempts must be at least 1".into()));
        }
        self.rate_limits().validate()
    }

    /// Quotas after applying `[limits.*]` overrides.
    pub fn rate_limits(&self) -> RateLimits {
        self.limits
            .iter()
            .fold(RateLimits::default(), |limits, (category, overrides)| {
                let quota = overrides.apply(limits.get(*category));
                limits.with(*category, quota)
            })
    }

    /// Orchestrator settings derived from `[export]`.
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        let export = &self.export;
        let retry = RetryPolicy::new(
            export.retry_max_attempts,
            Duration::from_millis(export.retry_base_delay_ms),
        );
        OrchestratorSettings {
            workflow: WorkflowSettings {
                format: export.output_format,
                poll_interval: Duration::from_millis(export.poll_interval_ms),
                max_poll_attempts: export.max_poll_attempts,
                retry,
            },
            discovery_retry: retry,
            settle_delay: Duration::from_millis(export.settle_delay_ms),
            job_ttl: seconds(export.job_ttl_secs),
            content_freshness: seconds(export.content_freshness_secs),
        }
    }

    /// Build the HTTP client; fails if no token is configured.
    pub fn api_client(&self) -> Result<HttpExportApi> {
        HttpExportApi::new(
            &self.api.base_url,
            self.api.token.as_deref(),
            Duration::from_secs(self.api.timeout_secs),
        )
    }
}
