//! Config command - View and manage shasync configuration
//!
//! Provides the `shasync config` CLI command which:
//! 1. Shows the configuration file contents (YAML or JSON)
//! 2. Sets individual values via dot-notation keys
//! 3. Validates the file and reports errors

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use shasync_core::config::Config;
use tracing::info;

use super::load_config_file;
use crate::output::{get_formatter, OutputFormat};

/// Keys accepted by `config set`, with a short description each
const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("sync.directory", "Local directory to publish"),
    ("sync.prefix", "Remote key prefix"),
    ("sync.directory_index", "Directory index file name (empty to unset)"),
    ("sync.concurrency", "Concurrent hash and upload operations"),
    ("sync.max_keys", "Maximum remote objects listed"),
    ("storage.backend", "s3|fs"),
    ("storage.bucket", "Bucket name (s3)"),
    ("storage.region", "Region (s3)"),
    ("storage.endpoint", "S3-compatible endpoint URL"),
    ("storage.force_path_style", "true|false"),
    ("storage.root", "Mirror directory (fs)"),
    ("cdn.backend", "cloudflare|cloudfront|none"),
    ("cdn.site", "Site URL prefixed to purged paths"),
    ("cdn.zone_id", "Cloudflare zone id"),
    ("cdn.distribution_id", "CloudFront distribution id"),
    ("cdn.batch_size", "Paths per purge call"),
    ("cdn.api_base", "Cloudflare API base URL"),
    ("logging.level", "trace|debug|info|warn|error"),
];

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.prefix")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(format, config_path),
            ConfigCommand::Set { key, value } => execute_set(key, value, format, config_path),
            ConfigCommand::Validate => execute_validate(format, config_path),
            ConfigCommand::Path => {
                let formatter = get_formatter(format);
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "config_path": config_path.display().to_string(),
                        "exists": config_path.exists(),
                    }));
                } else {
                    formatter.info(&config_path.display().to_string());
                }
                Ok(())
            }
        }
    }
}

fn execute_show(format: OutputFormat, config_path: &Path) -> Result<()> {
    let formatter = get_formatter(format);
    let config = load_config_file(config_path)?;

    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        formatter.info("");
        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_set(key: &str, value: &str, format: OutputFormat, config_path: &Path) -> Result<()> {
    let formatter = get_formatter(format);
    let mut config = load_config_file(config_path)?;

    info!(key = %key, value = %value, "Setting configuration value");

    if let Err(e) = apply_config_value(&mut config, key, value) {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "value": value,
                "error": e.to_string(),
            }));
        } else {
            formatter.error(&format!("Failed to set '{}': {}", key, e));
            formatter.info("");
            formatter.info("Supported keys:");
            for (name, description) in SUPPORTED_KEYS {
                formatter.info(&format!("  {name:<26} - {description}"));
            }
        }
        return Ok(());
    }

    // Only errors about the key being set block the write; other sections
    // may still be incomplete
    let errors: Vec<String> = config
        .validate()
        .into_iter()
        .filter(|e| e.field == key)
        .map(|e| e.message)
        .collect();
    if !errors.is_empty() {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "value": value,
                "errors": errors,
            }));
        } else {
            formatter.error(&format!("Invalid value for '{}': {}", key, errors.join("; ")));
        }
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    std::fs::write(config_path, yaml).context("Failed to write configuration file")?;

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "key": key,
            "value": value,
            "config_path": config_path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Set {} = {}", key, value));
        formatter.info(&format!("Saved to {}", config_path.display()));
    }
    Ok(())
}

fn execute_validate(format: OutputFormat, config_path: &Path) -> Result<()> {
    let formatter = get_formatter(format);

    if !config_path.exists() {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "valid": false,
                "config_path": config_path.display().to_string(),
                "errors": ["Configuration file not found"],
            }));
        } else {
            formatter.info(&format!(
                "Configuration file not found at {}",
                config_path.display()
            ));
            formatter.info("Run 'shasync config set <key> <value>' to create one.");
        }
        return Ok(());
    }

    let config = match Config::load(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [format!("Failed to parse configuration: {}", e)],
                }));
            } else {
                formatter.error(&format!("Failed to parse configuration: {}", e));
                formatter.info(&format!("File: {}", config_path.display()));
            }
            return Ok(());
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");
    let errors = config.validate();

    if format.is_json() {
        let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }
    Ok(())
}

/// `None` for an empty value, so `config set key ""` unsets optional fields
fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- sync ---
        "sync.directory" => config.sync.directory = optional(value).map(PathBuf::from),
        "sync.prefix" => config.sync.prefix = value.to_string(),
        "sync.directory_index" => config.sync.directory_index = optional(value),
        "sync.concurrency" => {
            config.sync.concurrency = value
                .parse::<usize>()
                .context("Expected a positive integer for sync.concurrency")?;
        }
        "sync.max_keys" => {
            config.sync.max_keys = value
                .parse::<usize>()
                .context("Expected a positive integer for sync.max_keys")?;
        }

        // --- storage ---
        "storage.backend" => {
            config.storage.backend = value.parse().map_err(anyhow::Error::msg)?;
        }
        "storage.bucket" => config.storage.bucket = optional(value),
        "storage.region" => config.storage.region = optional(value),
        "storage.endpoint" => config.storage.endpoint = optional(value),
        "storage.force_path_style" => {
            config.storage.force_path_style = value
                .parse::<bool>()
                .context("Expected true or false")?;
        }
        "storage.root" => config.storage.root = optional(value).map(PathBuf::from),

        // --- cdn ---
        "cdn.backend" => {
            config.cdn.backend = value.parse().map_err(anyhow::Error::msg)?;
        }
        "cdn.site" => config.cdn.site = optional(value),
        "cdn.zone_id" => config.cdn.zone_id = optional(value),
        "cdn.distribution_id" => config.cdn.distribution_id = optional(value),
        "cdn.batch_size" => {
            config.cdn.batch_size = value
                .parse::<usize>()
                .context("Expected a positive integer for cdn.batch_size")?;
        }
        "cdn.api_base" => config.cdn.api_base = value.to_string(),

        // --- logging ---
        "logging.level" => config.logging.level = value.to_string(),

        _ => anyhow::bail!("Unknown configuration key: '{}'", key),
    }
    Ok(())
}
