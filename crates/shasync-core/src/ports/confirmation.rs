//! Confirmation gate port (driving side)
//!
//! Before any destructive action the executor shows the plan and asks a
//! single yes/no question. Only the answer's contract lives here; how the
//! question is asked (stdin, `--yes`, a test double) is up to the adapter.

use crate::domain::SyncPlan;

/// Asks the user to confirm a non-empty plan
#[async_trait::async_trait]
pub trait IConfirmationPrompt: Send + Sync {
    /// Presents `plan` and returns the raw answer
    async fn ask(&self, plan: &SyncPlan) -> anyhow::Result<String>;
}

/// Returns true when `answer`, trimmed and lowercased, is `y` or `yes`
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
