//! shasync Sync - Reconciliation engine
//!
//! Provides:
//! - SHA-512 content hashing over byte streams
//! - Local directory indexing
//! - A read-through, write-back cache of remote content digests
//! - Diffing of local and remote indexes into a [`SyncPlan`]
//! - Confirmed, phased application of a plan
//!
//! ## Modules
//!
//! - [`hasher`] - Streaming content digests
//! - [`local_index`] - Local tree walk and hashing
//! - [`remote_cache`] - Remote digest resolution with metadata write-back
//! - [`diff`] - Plan classification and invalidation paths
//! - [`engine`] - The `Reconciler` entry point (validate, index, diff)
//! - [`executor`] - The confirmation gate and delete/upload/invalidate phases
//!
//! [`SyncPlan`]: shasync_core::domain::SyncPlan

pub mod diff;
pub mod engine;
pub mod executor;
pub mod hasher;
pub mod local_index;
pub mod remote_cache;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use shasync_core::domain::{ApplyPhase, DomainError};
use thiserror::Error;

pub use diff::DiffEngine;
pub use engine::{ReconcileOptions, Reconciler, Reconciliation};
pub use executor::{SyncExecutor, SyncReport};
pub use hasher::ContentHasher;
pub use local_index::LocalIndexBuilder;
pub use remote_cache::{CachePersistFailure, RemoteHashCache, RemoteIndex};

/// Errors that can occur while reconciling or applying a plan
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed prefix or key; raised before any I/O
    #[error("Validation error: {0}")]
    Validation(#[from] DomainError),

    /// Local enumeration or read failure
    #[error("File system error at {}: {source}", .path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Listing, metadata read or content hash failure on the remote side
    #[error("Remote read error for '{key}': {source:#}")]
    RemoteRead {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Confirmation declined
    #[error("Sync cancelled by user")]
    Cancelled,

    /// A delete, upload or invalidate phase failed
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl SyncError {
    /// Shorthand for a local I/O failure
    pub fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for a remote read failure
    pub fn remote_read(key: impl Into<String>, source: anyhow::Error) -> Self {
        SyncError::RemoteRead {
            key: key.into(),
            source,
        }
    }

    /// Returns true for a declined confirmation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

/// One key or path that an apply phase could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub item: String,
    pub reason: String,
}

/// Outcome of the apply phase that failed
///
/// Every phase before `phase` completed fully; no later phase was started.
/// Nothing is rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub struct ApplyError {
    pub phase: ApplyPhase,
    /// Keys or paths the failing phase did process
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedItem>,
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} phase failed for {} of {} item(s)",
            self.phase,
            self.failed.len(),
            self.failed.len() + self.succeeded.len()
        )?;
        for failure in &self.failed {
            write!(f, "\n  {}: {}", failure.item, failure.reason)?;
        }
        Ok(())
    }
}
