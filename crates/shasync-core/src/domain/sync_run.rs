//! SyncRun domain entity
//!
//! Tracks one application of a [`SyncPlan`] through its states:
//!
//! ```text
//! Planned ──(empty plan)──────────────────────────────► Done
//!    │
//!    ▼
//! AwaitingConfirmation ──(declined)──► Cancelled
//!    │
//!    ▼ (affirmed)
//! Applying(Delete) ─► Applying(Upload) ─► Applying(Invalidate) ─► Done
//!    │                     │                     │
//!    └─────────────────────┴─────────────────────┴──► Failed
//! ```
//!
//! Phases whose list is empty may be skipped, but never reordered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Apply phase, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPhase {
    Delete,
    Upload,
    Invalidate,
}

impl std::fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyPhase::Delete => write!(f, "delete"),
            ApplyPhase::Upload => write!(f, "upload"),
            ApplyPhase::Invalidate => write!(f, "invalidate"),
        }
    }
}

/// State of a sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunState {
    /// A plan has been computed
    Planned,
    /// Waiting for the user to confirm a non-empty plan
    AwaitingConfirmation,
    /// Executing one of the apply phases
    Applying(ApplyPhase),
    /// Finished (nothing to do, or every phase succeeded)
    Done,
    /// Confirmation was declined; nothing destructive happened
    Cancelled,
    /// An apply phase failed; earlier phases are not rolled back
    Failed(String),
}

impl SyncRunState {
    /// Returns true for Done, Cancelled and Failed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncRunState::Done | SyncRunState::Cancelled | SyncRunState::Failed(_)
        )
    }

    /// Returns true if the run completed successfully
    pub fn is_success(&self) -> bool {
        matches!(self, SyncRunState::Done)
    }

    /// Checks whether `self -> next` is a legal transition
    ///
    /// `plan_is_empty` gates the early exit from `Planned` straight to
    /// `Done`.
    pub fn can_transition_to(&self, next: &SyncRunState, plan_is_empty: bool) -> bool {
        use SyncRunState::*;

        match (self, next) {
            (Planned, Done) => plan_is_empty,
            (Planned, AwaitingConfirmation) => !plan_is_empty,
            (AwaitingConfirmation, Cancelled) => true,
            (AwaitingConfirmation, Applying(_)) => true,
            (Applying(current), Applying(following)) => following > current,
            (Applying(_), Done) => true,
            (Applying(_), Failed(_)) => true,
            _ => false,
        }
    }
}

impl Default for SyncRunState {
    fn default() -> Self {
        SyncRunState::Planned
    }
}

impl std::fmt::Display for SyncRunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncRunState::Planned => write!(f, "planned"),
            SyncRunState::AwaitingConfirmation => write!(f, "awaiting_confirmation"),
            SyncRunState::Applying(phase) => write!(f, "applying({phase})"),
            SyncRunState::Done => write!(f, "done"),
            SyncRunState::Cancelled => write!(f, "cancelled"),
            SyncRunState::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

/// One pass of the executor over a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    state: SyncRunState,
    plan_is_empty: bool,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    /// Starts a run in the `Planned` state
    pub fn new(plan_is_empty: bool) -> Self {
        Self {
            state: SyncRunState::Planned,
            plan_is_empty,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn state(&self) -> &SyncRunState {
        &self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Moves to `next`, stamping `finished_at` on terminal states
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` for an illegal transition
    pub fn transition_to(&mut self, next: SyncRunState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(&next, self.plan_is_empty) {
            return Err(DomainError::InvalidState {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        self.state = next;
        Ok(())
    }

    /// Elapsed time, up to now for an unfinished run
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }
}
