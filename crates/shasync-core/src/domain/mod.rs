//! Domain entities and business logic
//!
//! This module contains the core domain types for shasync:
//! - Newtypes for validated paths, prefixes, keys and digests
//! - The hash index built for each side of a sync
//! - The sync plan produced by diffing two indexes
//! - The sync run state machine
//! - Domain-specific error types

pub mod errors;
pub mod hash_index;
pub mod newtypes;
pub mod sync_plan;
pub mod sync_run;

// Re-export commonly used types
pub use errors::DomainError;
pub use hash_index::HashIndex;
pub use newtypes::*;
pub use sync_plan::SyncPlan;
pub use sync_run::{ApplyPhase, SyncRun, SyncRunState};
