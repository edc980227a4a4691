//! CLI subcommands

pub mod config;
pub mod diff;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use shasync_core::config::{CdnBackend, Config, ConfigBuilder, StorageBackend};
use shasync_core::domain::SyncPlan;
use shasync_sync::Reconciliation;

use crate::output::{plural, OutputFormat, OutputFormatter};

/// Flags shared by `sync` and `diff`; each overrides the config file
#[derive(Debug, Clone, Default, Args)]
pub struct PlanArgs {
    /// Path to local folder to synchronise
    #[arg(short = 'd', long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Prefix of cloud storage object keys
    #[arg(short = 'p', long, value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Cloud storage backend
    #[arg(short = 's', long, value_name = "s3|fs")]
    pub storage: Option<StorageBackend>,

    /// Cloud storage bucket
    #[arg(short = 'b', long, value_name = "BUCKET")]
    pub bucket: Option<String>,

    /// CDN backend
    #[arg(short = 'c', long, value_name = "cloudflare|cloudfront|none")]
    pub cdn: Option<CdnBackend>,

    /// Directory index file name to invalidate along with its directory
    #[arg(short = 'i', long, value_name = "INDEX")]
    pub index: Option<String>,

    /// Storage region (s3)
    #[arg(long)]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Mirror directory (fs storage)
    #[arg(long, value_name = "DIR")]
    pub storage_root: Option<PathBuf>,

    /// Concurrent hashing and upload operations
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl PlanArgs {
    /// Layers the flags that were given over `builder`
    pub fn apply(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(v) = &self.directory {
            builder = builder.directory(v.clone());
        }
        if let Some(v) = &self.prefix {
            builder = builder.prefix(v.clone());
        }
        if let Some(v) = self.storage {
            builder = builder.storage_backend(v);
        }
        if let Some(v) = &self.bucket {
            builder = builder.bucket(v.clone());
        }
        if let Some(v) = self.cdn {
            builder = builder.cdn_backend(v);
        }
        if let Some(v) = &self.index {
            builder = builder.directory_index(v.clone());
        }
        if let Some(v) = &self.region {
            builder = builder.region(v.clone());
        }
        if let Some(v) = &self.endpoint {
            builder = builder.endpoint(v.clone());
        }
        if let Some(v) = &self.storage_root {
            builder = builder.storage_root(v.clone());
        }
        if let Some(v) = self.concurrency {
            builder = builder.concurrency(v);
        }
        builder
    }
}

/// Reads the config file at `path`, or defaults if there is none
pub fn load_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("Failed to parse configuration {}", path.display()))
}

/// File, then flags, then environment; validated
pub fn resolve_config<F>(path: &Path, args: &PlanArgs, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let file = load_config_file(path)?;
    let mut config = args.apply(ConfigBuilder::from_config(file)).build();
    config.apply_env(lookup);

    let errors = config.validate();
    if !errors.is_empty() {
        let lines: Vec<String> = errors.iter().map(ToString::to_string).collect();
        bail!("Invalid configuration:\n  {}", lines.join("\n  "));
    }
    if config.sync.directory.is_none() {
        bail!("No local directory given (use -d or set sync.directory)");
    }
    Ok(config)
}

/// Prints the classification lists
pub fn print_plan(formatter: &dyn OutputFormatter, format: OutputFormat, plan: &SyncPlan) {
    if format.is_json() {
        return;
    }
    for line in plan.render_report().lines() {
        formatter.info(line);
    }
    if !plan.is_empty() {
        formatter.info(&format!(
            "{} to invalidate",
            plural(plan.invalidation_paths().len(), "path")
        ));
    }
}

/// Warns about digests that were computed but could not be cached
pub fn warn_persist_failures(formatter: &dyn OutputFormatter, reconciliation: &Reconciliation) {
    for failure in &reconciliation.persist_failures {
        formatter.warn(&format!(
            "Could not cache digest for {}: {}",
            failure.key, failure.reason
        ));
    }
}
