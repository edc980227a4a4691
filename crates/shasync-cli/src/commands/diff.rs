//! Diff command - show what a sync would do
//!
//! Computes the plan exactly as `sync` does (including writing freshly
//! computed digests back to remote metadata) but never deletes, uploads or
//! invalidates.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use shasync_sync::{ReconcileOptions, Reconciler};
use tracing::info;

use super::{print_plan, resolve_config, warn_persist_failures, PlanArgs};
use crate::backends;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct DiffCommand {
    #[command(flatten)]
    pub plan: PlanArgs,
}

impl DiffCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let config = resolve_config(config_path, &self.plan, backends::env_lookup)?;
        let Some(directory) = config.sync.directory.clone() else {
            anyhow::bail!("No local directory given");
        };

        info!(directory = %directory.display(), prefix = %config.sync.prefix, "Computing diff");

        let storage = backends::storage(&config, backends::env_lookup).await?;
        let reconciler = Reconciler::new(storage, ReconcileOptions::from_config(&config.sync));
        let reconciliation = reconciler.plan(&directory).await?;

        print_plan(formatter.as_ref(), format, &reconciliation.plan);
        warn_persist_failures(formatter.as_ref(), &reconciliation);

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "prefix": reconciliation.prefix.to_string(),
                "plan": reconciliation.plan,
                "persist_failures": reconciliation.persist_failures,
            }));
        }
        Ok(())
    }
}
