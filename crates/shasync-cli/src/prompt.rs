//! Confirmation prompt adapters

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use shasync_core::domain::SyncPlan;
use shasync_core::ports::IConfirmationPrompt;

/// Question shown before any destructive call
pub const CONFIRM_QUESTION: &str = "Are you sure you want to sync? (y) ";

/// Asks on stderr and reads one line from stdin
///
/// With `show_plan` the classification lists are written to stderr first,
/// for modes where stdout carries JSON.
pub struct StdinPrompt {
    show_plan: bool,
}

impl StdinPrompt {
    pub fn new(show_plan: bool) -> Self {
        Self { show_plan }
    }
}

#[async_trait::async_trait]
impl IConfirmationPrompt for StdinPrompt {
    async fn ask(&self, plan: &SyncPlan) -> Result<String> {
        let preamble = if self.show_plan {
            plan.render_report()
        } else {
            String::new()
        };

        tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr().lock();
            write!(stderr, "{preamble}\n{CONFIRM_QUESTION}")?;
            stderr.flush()?;

            let mut answer = String::new();
            std::io::stdin().lock().read_line(&mut answer)?;
            Ok::<_, std::io::Error>(answer)
        })
        .await
        .context("Prompt task panicked")?
        .context("Failed to read confirmation from stdin")
    }
}

/// Answers yes without asking (`--yes`)
pub struct AssumeYes;

#[async_trait::async_trait]
impl IConfirmationPrompt for AssumeYes {
    async fn ask(&self, _plan: &SyncPlan) -> Result<String> {
        tracing::info!("Confirmation skipped (--yes)");
        Ok("y".to_string())
    }
}
