//! Reconciler - validate, index both sides, diff
//!
//! The prefix is validated before any I/O. The local index is built first;
//! the remote index is only resolved once the local side is known to be
//! readable, because resolving it writes digests back to remote metadata.

use std::path::Path;
use std::sync::Arc;

use shasync_core::config::SyncConfig;
use shasync_core::domain::{Prefix, SyncPlan};
use shasync_core::ports::IStorageService;
use tracing::{info, instrument};

use crate::diff::DiffEngine;
use crate::local_index::LocalIndexBuilder;
use crate::remote_cache::{CachePersistFailure, RemoteHashCache};
use crate::SyncError;

/// Inputs that shape a reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Remote prefix, unvalidated
    pub prefix: String,
    pub directory_index: Option<String>,
    pub concurrency: usize,
    pub max_keys: usize,
}

impl ReconcileOptions {
    /// Takes the reconciliation fields of the `sync` config section
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            directory_index: config.directory_index.clone(),
            concurrency: config.concurrency,
            max_keys: config.max_keys,
        }
    }
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// A computed plan plus what the remote pass reported along the way
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub prefix: Prefix,
    pub plan: SyncPlan,
    pub persist_failures: Vec<CachePersistFailure>,
}

/// Entry point that turns a directory and a remote prefix into a plan
pub struct Reconciler {
    storage: Arc<dyn IStorageService>,
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(storage: Arc<dyn IStorageService>, options: ReconcileOptions) -> Self {
        Self { storage, options }
    }

    /// Builds both indexes and diffs them
    ///
    /// # Errors
    /// - `SyncError::Validation` for a malformed prefix (no I/O performed)
    /// - `SyncError::FileSystem` if the local tree cannot be fully read
    /// - `SyncError::RemoteRead` if the remote index cannot be fully built
    #[instrument(skip(self), fields(directory = %directory.display(), prefix = %self.options.prefix))]
    pub async fn plan(&self, directory: &Path) -> Result<Reconciliation, SyncError> {
        let prefix = Prefix::new(self.options.prefix.clone())?;

        let local = LocalIndexBuilder::new(self.options.concurrency)
            .build(directory)
            .await?;

        let remote = RemoteHashCache::new(
            Arc::clone(&self.storage),
            self.options.concurrency,
            self.options.max_keys,
        )
        .resolve(&prefix)
        .await?;

        let engine = DiffEngine::new(prefix.clone(), self.options.directory_index.clone());
        let plan = engine.diff(Arc::new(local), &remote.index);

        info!(
            uploads = plan.upload_count(),
            deletes = plan.extra_remote().len(),
            invalidations = plan.invalidation_paths().len(),
            "Reconciliation complete"
        );

        Ok(Reconciliation {
            prefix,
            plan,
            persist_failures: remote.persist_failures,
        })
    }
}
