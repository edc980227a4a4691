//! SyncExecutor - confirmation gate and phased apply
//!
//! A non-empty plan is shown to the confirmation prompt first. On an
//! affirmative answer the executor deletes extra objects, uploads missing
//! and different files, then purges the CDN, strictly in that order. The
//! first failing phase stops the run; earlier phases are not rolled back.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures_util::{stream, StreamExt};
use serde::Serialize;
use shasync_core::domain::{
    ApplyPhase, ObjectKey, Prefix, RelativePath, SyncPlan, SyncRun, SyncRunState,
};
use shasync_core::ports::{
    is_affirmative, ICdnService, IConfirmationPrompt, IStorageService, ObjectMetadata,
    UploadRequest, CONTENT_DIGEST_METADATA_KEY,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument, warn};

use crate::engine::Reconciliation;
use crate::remote_cache::CachePersistFailure;
use crate::{ApplyError, FailedItem, SyncError};

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub state: SyncRunState,
    pub deleted: Vec<String>,
    pub uploaded: Vec<String>,
    pub invalidated: Vec<String>,
    pub persist_failures: Vec<CachePersistFailure>,
    pub duration_ms: i64,
}

/// Applies a [`SyncPlan`] against storage and CDN backends
pub struct SyncExecutor {
    storage: Arc<dyn IStorageService>,
    cdn: Arc<dyn ICdnService>,
    prompt: Arc<dyn IConfirmationPrompt>,
    local_root: PathBuf,
    concurrency: usize,
}

impl SyncExecutor {
    /// `local_root` is the directory the plan was computed from
    pub fn new(
        storage: Arc<dyn IStorageService>,
        cdn: Arc<dyn ICdnService>,
        prompt: Arc<dyn IConfirmationPrompt>,
        local_root: impl Into<PathBuf>,
        concurrency: usize,
    ) -> Self {
        Self {
            storage,
            cdn,
            prompt,
            local_root: local_root.into(),
            concurrency: concurrency.max(1),
        }
    }

    /// Runs the plan through the state machine
    ///
    /// # Errors
    /// - `SyncError::Cancelled` if confirmation is declined
    /// - `SyncError::Apply` for the first phase that fails
    #[instrument(skip(self, reconciliation), fields(prefix = %reconciliation.prefix))]
    pub async fn execute(&self, reconciliation: &Reconciliation) -> Result<SyncReport, SyncError> {
        let plan = &reconciliation.plan;
        let prefix = &reconciliation.prefix;
        let mut run = SyncRun::new(plan.is_empty());
        let mut report = SyncReport {
            state: SyncRunState::Planned,
            deleted: Vec::new(),
            uploaded: Vec::new(),
            invalidated: Vec::new(),
            persist_failures: reconciliation.persist_failures.clone(),
            duration_ms: 0,
        };

        if plan.is_empty() {
            run.transition_to(SyncRunState::Done)?;
            info!("Nothing to do, sync complete");
            return Ok(finish(report, &run));
        }

        run.transition_to(SyncRunState::AwaitingConfirmation)?;
        let answer = match self.prompt.ask(plan).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "Confirmation prompt failed; treating as declined");
                String::new()
            }
        };
        if !is_affirmative(&answer) {
            run.transition_to(SyncRunState::Cancelled)?;
            info!("Sync cancelled by user");
            return Err(SyncError::Cancelled);
        }

        if !plan.extra_remote().is_empty() {
            run.transition_to(SyncRunState::Applying(ApplyPhase::Delete))?;
            match self.delete_phase(prefix, plan).await {
                Ok(deleted) => report.deleted = deleted,
                Err(e) => return Err(fail(&mut run, e)),
            }
        }

        if plan.upload_count() > 0 {
            run.transition_to(SyncRunState::Applying(ApplyPhase::Upload))?;
            match self.upload_phase(prefix, plan).await {
                Ok(uploaded) => report.uploaded = uploaded,
                Err(e) => return Err(fail(&mut run, e)),
            }
        }

        if !plan.invalidation_paths().is_empty() {
            run.transition_to(SyncRunState::Applying(ApplyPhase::Invalidate))?;
            match self.invalidate_phase(plan).await {
                Ok(invalidated) => report.invalidated = invalidated,
                Err(e) => return Err(fail(&mut run, e)),
            }
        }

        run.transition_to(SyncRunState::Done)?;
        info!(
            deleted = report.deleted.len(),
            uploaded = report.uploaded.len(),
            invalidated = report.invalidated.len(),
            "Sync complete"
        );
        Ok(finish(report, &run))
    }

    async fn delete_phase(&self, prefix: &Prefix, plan: &SyncPlan) -> Result<Vec<String>, ApplyError> {
        let keys = keys_for(prefix, plan.extra_remote(), ApplyPhase::Delete)?;
        info!(count = keys.len(), "Deleting extra remote objects");

        match self.storage.delete(&keys).await {
            Ok(result) if result.is_complete() => Ok(result.deleted),
            Ok(result) => Err(ApplyError {
                phase: ApplyPhase::Delete,
                succeeded: result.deleted,
                failed: result
                    .failed
                    .into_iter()
                    .map(|f| FailedItem {
                        item: f.key,
                        reason: f.reason,
                    })
                    .collect(),
            }),
            Err(e) => Err(all_failed(
                ApplyPhase::Delete,
                keys.iter().map(ObjectKey::to_string),
                &e,
            )),
        }
    }

    async fn upload_phase(&self, prefix: &Prefix, plan: &SyncPlan) -> Result<Vec<String>, ApplyError> {
        let uploads: Vec<&RelativePath> = plan.uploads().collect();
        info!(count = uploads.len(), "Uploading files");

        // Every upload runs to completion before results are inspected.
        let results: Vec<(String, Result<(), String>)> = stream::iter(uploads)
            .map(|path| async move {
                let label = match prefix.key_for(path) {
                    Ok(key) => key.to_string(),
                    Err(_) => path.to_string(),
                };
                let result = self.upload_one(prefix, plan, path).await;
                (label, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (key, result) in results {
            match result {
                Ok(()) => succeeded.push(key),
                Err(reason) => {
                    warn!(key = %key, reason = %reason, "Upload failed");
                    failed.push(FailedItem { item: key, reason });
                }
            }
        }
        succeeded.sort();

        if failed.is_empty() {
            Ok(succeeded)
        } else {
            failed.sort_by(|a, b| a.item.cmp(&b.item));
            Err(ApplyError {
                phase: ApplyPhase::Upload,
                succeeded,
                failed,
            })
        }
    }

    async fn upload_one(&self, prefix: &Prefix, plan: &SyncPlan, path: &RelativePath) -> Result<(), String> {
        let key = prefix.key_for(path).map_err(|e| e.to_string())?;
        let digest = plan
            .digest_for(path)
            .ok_or_else(|| format!("no local digest for {path}"))?;

        let local_path = self.local_root.join(path.as_str());
        let file = tokio::fs::File::open(&local_path)
            .await
            .map_err(|e| format!("{}: {e}", local_path.display()))?;
        let content_length = file.metadata().await.ok().map(|m| m.len());

        let content_type = mime_guess::from_path(path.as_str())
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        let mut metadata = ObjectMetadata::new();
        metadata.insert(
            CONTENT_DIGEST_METADATA_KEY.to_string(),
            digest.as_str().to_string(),
        );

        debug!(key = %key, content_type = %content_type, "Uploading");
        self.storage
            .upload(UploadRequest {
                key,
                body: Box::pin(ReaderStream::new(file)),
                content_length,
                content_type,
                metadata,
            })
            .await
            .map_err(|e| format!("{e:#}"))
    }

    async fn invalidate_phase(&self, plan: &SyncPlan) -> Result<Vec<String>, ApplyError> {
        let paths = plan.invalidation_paths();
        info!(count = paths.len(), cdn = self.cdn.name(), "Invalidating CDN paths");

        match self.cdn.invalidate(paths).await {
            Ok(()) => Ok(paths.to_vec()),
            Err(e) => Err(all_failed(ApplyPhase::Invalidate, paths.iter().cloned(), &e)),
        }
    }
}

fn keys_for(prefix: &Prefix, paths: &[RelativePath], phase: ApplyPhase) -> Result<Vec<ObjectKey>, ApplyError> {
    let mut keys = Vec::with_capacity(paths.len());
    let mut failed = Vec::new();
    for path in paths {
        match prefix.key_for(path) {
            Ok(key) => keys.push(key),
            Err(e) => failed.push(FailedItem {
                item: path.to_string(),
                reason: e.to_string(),
            }),
        }
    }
    if failed.is_empty() {
        Ok(keys)
    } else {
        Err(ApplyError {
            phase,
            succeeded: Vec::new(),
            failed,
        })
    }
}

fn all_failed(phase: ApplyPhase, items: impl Iterator<Item = String>, error: &anyhow::Error) -> ApplyError {
    let reason = format!("{error:#}");
    ApplyError {
        phase,
        succeeded: Vec::new(),
        failed: items
            .map(|item| FailedItem {
                item,
                reason: reason.clone(),
            })
            .collect(),
    }
}

fn fail(run: &mut SyncRun, error: ApplyError) -> SyncError {
    warn!(phase = %error.phase, failed = error.failed.len(), "Apply phase failed");
    if let Err(e) = run.transition_to(SyncRunState::Failed(error.to_string())) {
        warn!(error = %e, "Unexpected state transition failure");
    }
    SyncError::Apply(error)
}

fn finish(mut report: SyncReport, run: &SyncRun) -> SyncReport {
    report.state = run.state().clone();
    report.duration_ms = run
        .finished_at()
        .unwrap_or_else(Utc::now)
        .signed_duration_since(run.started_at())
        .num_milliseconds();
    report
}
