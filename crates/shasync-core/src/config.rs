//! Configuration module for shasync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! Credentials never live here; adapters read them from the environment.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::Prefix;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for shasync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    pub cdn: CdnConfig,
    pub logging: LoggingConfig,
}

/// Reconciliation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local directory to publish.
    pub directory: Option<PathBuf>,
    /// Remote key prefix; empty means the bucket root.
    pub prefix: String,
    /// Default document name, e.g. `index.html`.
    pub directory_index: Option<String>,
    /// Maximum number of in-flight hash, metadata and upload operations.
    pub concurrency: usize,
    /// Cap on the number of keys listed under the prefix.
    pub max_keys: usize,
}

/// Which object store implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    /// A local directory standing in for a bucket.
    Fs,
}

/// Object storage settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Bucket name (`s3` backend).
    pub bucket: Option<String>,
    /// Region override; the AWS environment chain is used when unset.
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    pub endpoint: Option<String>,
    /// Use path-style addressing (needed by most S3-compatible stores).
    pub force_path_style: bool,
    /// Root directory (`fs` backend).
    pub root: Option<PathBuf>,
}

/// Which CDN implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CdnBackend {
    Cloudflare,
    Cloudfront,
    /// Skip invalidation entirely.
    #[default]
    None,
}

/// CDN settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdnConfig {
    pub backend: CdnBackend,
    /// Public origin prepended to purged paths, e.g. `https://example.com`.
    pub site: Option<String>,
    /// Cloudflare zone identifier.
    pub zone_id: Option<String>,
    /// CloudFront distribution identifier.
    pub distribution_id: Option<String>,
    /// Paths per purge call.
    pub batch_size: usize,
    /// Base URL of the Cloudflare v4 API.
    pub api_base: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/shasync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("shasync")
            .join("config.yaml")
    }

    /// Fill CDN fields the file leaves empty from `CF_ZONE_ID`, `CF_SITE`
    /// and `AWS_DISTRIBUTION`.
    ///
    /// `lookup` is normally `|k| std::env::var(k).ok()`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.cdn.zone_id.as_deref().map_or(true, str::is_empty) {
            if let Some(zone) = lookup("CF_ZONE_ID") {
                self.cdn.zone_id = Some(zone);
            }
        }
        if self.cdn.site.as_deref().map_or(true, str::is_empty) {
            if let Some(site) = lookup("CF_SITE") {
                self.cdn.site = Some(site);
            }
        }
        if is_blank(&self.cdn.distribution_id) {
            if let Some(distribution) = lookup("AWS_DISTRIBUTION") {
                self.cdn.distribution_id = Some(distribution);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default `sync.concurrency`.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Default `sync.max_keys`.
pub const DEFAULT_MAX_KEYS: usize = 100_000;

/// Default `cdn.batch_size` (Cloudflare's per-call purge limit).
pub const DEFAULT_PURGE_BATCH_SIZE: usize = 500;

/// Default `cdn.api_base`.
pub const DEFAULT_CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            directory: None,
            prefix: String::new(),
            directory_index: None,
            concurrency: DEFAULT_CONCURRENCY,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            backend: CdnBackend::None,
            site: None,
            zone_id: None,
            distribution_id: None,
            batch_size: DEFAULT_PURGE_BATCH_SIZE,
            api_base: DEFAULT_CLOUDFLARE_API_BASE.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend selectors from CLI strings
// ---------------------------------------------------------------------------

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "fs" => Ok(StorageBackend::Fs),
            other => Err(format!("unknown storage backend: {other} (expected s3 or fs)")),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Fs => write!(f, "fs"),
        }
    }
}

impl FromStr for CdnBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cloudflare" | "cf" => Ok(CdnBackend::Cloudflare),
            "cloudfront" | "aws" => Ok(CdnBackend::Cloudfront),
            "none" => Ok(CdnBackend::None),
            other => Err(format!(
                "unknown CDN backend: {other} (expected cloudflare, cloudfront or none)"
            )),
        }
    }
}

impl fmt::Display for CdnBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdnBackend::Cloudflare => write!(f, "cloudflare"),
            CdnBackend::Cloudfront => write!(f, "cloudfront"),
            CdnBackend::None => write!(f, "none"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.concurrency"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for `sync.concurrency`.
const MAX_CONCURRENCY: usize = 256;

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. Backend-specific
    /// fields are only checked for the selected backend.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if let Err(e) = Prefix::new(self.sync.prefix.clone()) {
            errors.push(ValidationError {
                field: "sync.prefix".into(),
                message: format!(
                    "{e}; prefixes must not start or end with '/', contain '//' or contain '\\'"
                ),
            });
        }
        if let Some(dir) = &self.sync.directory {
            if !dir.is_dir() {
                errors.push(ValidationError {
                    field: "sync.directory".into(),
                    message: format!("directory does not exist: {}", dir.display()),
                });
            }
        }
        if let Some(index) = &self.sync.directory_index {
            if index.is_empty() || index.contains('/') || index.contains('\\') {
                errors.push(ValidationError {
                    field: "sync.directory_index".into(),
                    message: "must be a bare file name".into(),
                });
            }
        }
        if self.sync.concurrency == 0 || self.sync.concurrency > MAX_CONCURRENCY {
            errors.push(ValidationError {
                field: "sync.concurrency".into(),
                message: format!("must be between 1 and {MAX_CONCURRENCY}"),
            });
        }
        if self.sync.max_keys == 0 {
            errors.push(ValidationError {
                field: "sync.max_keys".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- storage ---
        match self.storage.backend {
            StorageBackend::S3 => {
                if is_blank(&self.storage.bucket) {
                    errors.push(ValidationError {
                        field: "storage.bucket".into(),
                        message: "required for the s3 backend".into(),
                    });
                }
                if let Some(endpoint) = &self.storage.endpoint {
                    if !is_http_url(endpoint) {
                        errors.push(ValidationError {
                            field: "storage.endpoint".into(),
                            message: format!("not an http(s) URL: {endpoint}"),
                        });
                    }
                }
            }
            StorageBackend::Fs => {
                if self.storage.root.is_none() {
                    errors.push(ValidationError {
                        field: "storage.root".into(),
                        message: "required for the fs backend".into(),
                    });
                }
            }
        }

        // --- cdn ---
        if self.cdn.backend == CdnBackend::Cloudflare {
            if is_blank(&self.cdn.zone_id) {
                errors.push(ValidationError {
                    field: "cdn.zone_id".into(),
                    message: "required for the cloudflare backend".into(),
                });
            }
            match &self.cdn.site {
                Some(site) if is_http_url(site) => {}
                Some(site) => errors.push(ValidationError {
                    field: "cdn.site".into(),
                    message: format!("not an http(s) URL: {site}"),
                }),
                None => errors.push(ValidationError {
                    field: "cdn.site".into(),
                    message: "required for the cloudflare backend".into(),
                }),
            }
            if !is_http_url(&self.cdn.api_base) {
                errors.push(ValidationError {
                    field: "cdn.api_base".into(),
                    message: format!("not an http(s) URL: {}", self.cdn.api_base),
                });
            }
        }
        if self.cdn.backend == CdnBackend::Cloudfront && is_blank(&self.cdn.distribution_id) {
            errors.push(ValidationError {
                field: "cdn.distribution_id".into(),
                message: "required for the cloudfront backend".into(),
            });
        }
        if self.cdn.batch_size == 0 {
            errors.push(ValidationError {
                field: "cdn.batch_size".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`]. The CLI uses it to layer flags over the
/// file.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder seeded with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Create a builder seeded with an existing configuration.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    // --- sync ---

    pub fn directory(mut self, directory: PathBuf) -> Self {
        self.config.sync.directory = Some(directory);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.sync.prefix = prefix.into();
        self
    }

    pub fn directory_index(mut self, index: impl Into<String>) -> Self {
        self.config.sync.directory_index = Some(index.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.sync.concurrency = n;
        self
    }

    pub fn max_keys(mut self, n: usize) -> Self {
        self.config.sync.max_keys = n;
        self
    }

    // --- storage ---

    pub fn storage_backend(mut self, backend: StorageBackend) -> Self {
        self.config.storage.backend = backend;
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.storage.bucket = Some(bucket.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.storage.region = Some(region.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.storage.endpoint = Some(endpoint.into());
        self
    }

    pub fn storage_root(mut self, root: PathBuf) -> Self {
        self.config.storage.root = Some(root);
        self
    }

    // --- cdn ---

    pub fn cdn_backend(mut self, backend: CdnBackend) -> Self {
        self.config.cdn.backend = backend;
        self
    }

    pub fn cdn_site(mut self, site: impl Into<String>) -> Self {
        self.config.cdn.site = Some(site.into());
        self
    }

    pub fn cdn_zone_id(mut self, zone_id: impl Into<String>) -> Self {
        self.config.cdn.zone_id = Some(zone_id.into());
        self
    }

    pub fn cdn_distribution_id(mut self, distribution_id: impl Into<String>) -> Self {
        self.config.cdn.distribution_id = Some(distribution_id.into());
        self
    }

    pub fn cdn_batch_size(mut self, n: usize) -> Self {
        self.config.cdn.batch_size = n;
        self
    }

    pub fn cdn_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.config.cdn.api_base = api_base.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
