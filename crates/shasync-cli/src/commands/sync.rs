//! Sync command - push a local directory to object storage
//!
//! Provides the `shasync sync` CLI command which:
//! 1. Resolves configuration (file, flags, environment)
//! 2. Builds the storage and CDN backends
//! 3. Computes the plan and prints the classification lists
//! 4. Asks for confirmation, then deletes, uploads and invalidates

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use shasync_core::ports::IConfirmationPrompt;
use shasync_sync::{ReconcileOptions, Reconciler, SyncError, SyncExecutor, SyncReport};
use tracing::info;

use super::{print_plan, resolve_config, warn_persist_failures, PlanArgs};
use crate::backends;
use crate::output::{duration_display, get_formatter, plural, OutputFormat, OutputFormatter};
use crate::prompt::{AssumeYes, StdinPrompt};

#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Answer yes to the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let config = resolve_config(config_path, &self.plan, backends::env_lookup)?;
        let Some(directory) = config.sync.directory.clone() else {
            anyhow::bail!("No local directory given");
        };

        info!(
            directory = %directory.display(),
            prefix = %config.sync.prefix,
            storage = %config.storage.backend,
            cdn = %config.cdn.backend,
            "Starting sync"
        );

        let storage = backends::storage(&config, backends::env_lookup).await?;
        let cdn = backends::cdn(&config, backends::env_lookup).await?;

        let reconciler = Reconciler::new(
            Arc::clone(&storage),
            ReconcileOptions::from_config(&config.sync),
        );
        let reconciliation = reconciler.plan(&directory).await?;

        print_plan(formatter.as_ref(), format, &reconciliation.plan);
        warn_persist_failures(formatter.as_ref(), &reconciliation);

        if self.dry_run {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "dry_run": true,
                    "plan": reconciliation.plan,
                }));
            } else {
                formatter.success("Dry run completed (no changes)");
            }
            return Ok(());
        }

        let prompt: Arc<dyn IConfirmationPrompt> = if self.yes {
            Arc::new(AssumeYes)
        } else {
            Arc::new(StdinPrompt::new(format.is_json()))
        };
        let executor = SyncExecutor::new(storage, cdn, prompt, directory, config.sync.concurrency);

        match executor.execute(&reconciliation).await {
            Ok(report) => {
                print_report(formatter.as_ref(), format, &report);
                Ok(())
            }
            Err(SyncError::Apply(apply)) => {
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": false,
                        "failed_phase": apply,
                    }));
                }
                Err(SyncError::Apply(apply).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn print_report(formatter: &dyn OutputFormatter, format: OutputFormat, report: &SyncReport) {
    if format.is_json() {
        formatter.print_json(&serde_json::json!({ "success": true, "report": report }));
        return;
    }

    let total = report.deleted.len() + report.uploaded.len();
    if total == 0 && report.invalidated.is_empty() {
        // the plan listing already said so
        return;
    }

    formatter.success(&format!(
        "Sync completed in {}",
        duration_display(report.duration_ms)
    ));
    if !report.deleted.is_empty() {
        formatter.info(&format!("Deleted:     {}", plural(report.deleted.len(), "file")));
    }
    if !report.uploaded.is_empty() {
        formatter.info(&format!("Uploaded:    {}", plural(report.uploaded.len(), "file")));
    }
    if !report.invalidated.is_empty() {
        formatter.info(&format!(
            "Invalidated: {}",
            plural(report.invalidated.len(), "path")
        ));
    }
}
