//! Remote digest resolution
//!
//! Every object under the prefix gets a digest. An object whose metadata
//! already carries one is read from metadata alone; any other object is
//! streamed, hashed, and has the digest written back to its metadata so the
//! next run skips the download.
//!
//! A digest written here is trusted on later runs without revalidation. If
//! something rewrites an object's bytes without clearing or updating the
//! digest entry, the stale digest wins and the object looks unchanged.

use std::sync::Arc;

use futures_util::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use shasync_core::domain::{ContentDigest, HashIndex, ObjectKey, Prefix, RelativePath};
use shasync_core::ports::{cached_digest, with_digest, IStorageService};
use tracing::{debug, info, instrument, warn};

use crate::hasher::ContentHasher;
use crate::SyncError;

/// A digest that was computed but could not be written back
///
/// Non-fatal: the digest is still in the returned index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachePersistFailure {
    pub key: String,
    pub reason: String,
}

/// Result of resolving the remote side
#[derive(Debug, Clone, Default)]
pub struct RemoteIndex {
    pub index: HashIndex,
    pub persist_failures: Vec<CachePersistFailure>,
    /// Objects whose digest came from metadata
    pub cached: usize,
    /// Objects that were downloaded and hashed
    pub computed: usize,
}

/// How one object's digest was obtained
enum Resolution {
    Cached,
    Computed { persist_failure: Option<CachePersistFailure> },
}

/// Read-through, write-back cache of remote content digests
pub struct RemoteHashCache {
    storage: Arc<dyn IStorageService>,
    concurrency: usize,
    max_keys: usize,
}

impl RemoteHashCache {
    pub fn new(storage: Arc<dyn IStorageService>, concurrency: usize, max_keys: usize) -> Self {
        Self {
            storage,
            concurrency: concurrency.max(1),
            max_keys,
        }
    }

    /// Resolves a digest for every object under `prefix`
    ///
    /// # Errors
    /// `SyncError::RemoteRead` if the listing, any metadata read, or any
    /// content hash fails. Write-back failures are reported in
    /// [`RemoteIndex::persist_failures`] instead.
    #[instrument(skip(self), fields(prefix = %prefix))]
    pub async fn resolve(&self, prefix: &Prefix) -> Result<RemoteIndex, SyncError> {
        let listing_prefix = prefix.listing_prefix();
        let summaries = self
            .storage
            .list(&listing_prefix, self.max_keys)
            .await
            .map_err(|e| SyncError::remote_read(listing_prefix.clone(), e))?;

        if summaries.len() >= self.max_keys {
            warn!(
                max_keys = self.max_keys,
                "Listing reached the key limit; objects beyond it will be treated as missing"
            );
        }

        let mut objects = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if prefix.is_folder_marker(&summary.key) {
                debug!(key = %summary.key, "Skipping the prefix folder marker");
                continue;
            }
            let Some(relative) = prefix.relative_path_of(&summary.key) else {
                warn!(key = %summary.key, "Skipping listed key outside the prefix");
                continue;
            };
            match ObjectKey::new(summary.key.clone()) {
                Ok(key) => objects.push((key, relative)),
                Err(e) => warn!(key = %summary.key, error = %e, "Skipping unusable key"),
            }
        }
        debug!(objects = objects.len(), "Remote listing complete");

        let resolved: Vec<(RelativePath, ContentDigest, Resolution)> = stream::iter(objects)
            .map(|(key, relative)| async move {
                let (digest, resolution) = self.resolve_one(&key).await?;
                Ok::<_, SyncError>((relative, digest, resolution))
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let mut remote = RemoteIndex {
            index: HashIndex::with_capacity(resolved.len()),
            ..RemoteIndex::default()
        };
        for (relative, digest, resolution) in resolved {
            match resolution {
                Resolution::Cached => remote.cached += 1,
                Resolution::Computed { persist_failure } => {
                    remote.computed += 1;
                    remote.persist_failures.extend(persist_failure);
                }
            }
            if remote.index.insert(relative.clone(), digest).is_some() {
                warn!(path = %relative, "Several remote keys normalize to the same path");
            }
        }

        info!(
            objects = remote.index.len(),
            cached = remote.cached,
            computed = remote.computed,
            persist_failures = remote.persist_failures.len(),
            "Remote index built"
        );
        Ok(remote)
    }

    async fn resolve_one(&self, key: &ObjectKey) -> Result<(ContentDigest, Resolution), SyncError> {
        let record = self
            .storage
            .get_metadata(key)
            .await
            .map_err(|e| SyncError::remote_read(key.as_str(), e))?;

        if let Some(value) = cached_digest(&record.metadata) {
            match ContentDigest::new(value) {
                Ok(digest) => {
                    debug!(key = %key, "Using cached digest");
                    return Ok((digest, Resolution::Cached));
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Ignoring malformed cached digest, re-hashing");
                }
            }
        }

        debug!(key = %key, "Hashing remote content");
        let body = self
            .storage
            .stream(key)
            .await
            .map_err(|e| SyncError::remote_read(key.as_str(), e))?;
        let digest = ContentHasher::digest_stream(body)
            .await
            .map_err(|e| SyncError::remote_read(key.as_str(), e.into()))?;

        let metadata = with_digest(&record.metadata, digest.as_str());
        let persist_failure = match self.storage.set_metadata(key, &metadata).await {
            Ok(()) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to persist digest to remote metadata");
                Some(CachePersistFailure {
                    key: key.to_string(),
                    reason: format!("{e:#}"),
                })
            }
        };

        Ok((digest, Resolution::Computed { persist_failure }))
    }
}
