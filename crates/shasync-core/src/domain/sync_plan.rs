//! SyncPlan - the result of reconciling a local and a remote index
//!
//! A plan is immutable once produced. It lists the paths to delete remotely,
//! the paths to upload (missing or different), and the logical URL paths to
//! purge from the CDN afterwards.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::hash_index::HashIndex;
use super::newtypes::{ContentDigest, RelativePath};

/// Deletions, uploads and invalidations needed to bring the remote side in
/// line with the local side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPlan {
    /// Paths present remotely but absent locally
    extra_remote: Vec<RelativePath>,
    /// Paths present locally but absent remotely
    missing_remote: Vec<RelativePath>,
    /// Paths present on both sides with mismatched digests
    different_remote: Vec<RelativePath>,
    /// Logical URL paths to purge, without duplicates
    invalidation_paths: Vec<String>,
    /// Local digests, attached as metadata to uploads
    #[serde(skip)]
    local_hashes: Arc<HashIndex>,
}

impl SyncPlan {
    /// Creates a plan from already classified lists
    ///
    /// Duplicates in `invalidation_paths` are dropped, keeping the first
    /// occurrence.
    pub fn new(
        extra_remote: Vec<RelativePath>,
        missing_remote: Vec<RelativePath>,
        different_remote: Vec<RelativePath>,
        invalidation_paths: Vec<String>,
        local_hashes: Arc<HashIndex>,
    ) -> Self {
        let mut seen = std::collections::HashSet::new();
        let invalidation_paths = invalidation_paths
            .into_iter()
            .filter(|path| seen.insert(path.clone()))
            .collect();

        Self {
            extra_remote,
            missing_remote,
            different_remote,
            invalidation_paths,
            local_hashes,
        }
    }

    pub fn extra_remote(&self) -> &[RelativePath] {
        &self.extra_remote
    }

    pub fn missing_remote(&self) -> &[RelativePath] {
        &self.missing_remote
    }

    pub fn different_remote(&self) -> &[RelativePath] {
        &self.different_remote
    }

    pub fn invalidation_paths(&self) -> &[String] {
        &self.invalidation_paths
    }

    /// The local index the plan was computed from
    pub fn local_hashes(&self) -> &HashIndex {
        &self.local_hashes
    }

    /// Returns true when there is nothing to delete or upload
    pub fn is_empty(&self) -> bool {
        self.extra_remote.is_empty()
            && self.missing_remote.is_empty()
            && self.different_remote.is_empty()
    }

    /// Every path that must be uploaded (missing, then different)
    pub fn uploads(&self) -> impl Iterator<Item = &RelativePath> {
        self.missing_remote.iter().chain(self.different_remote.iter())
    }

    /// Number of paths that must be uploaded
    pub fn upload_count(&self) -> usize {
        self.missing_remote.len() + self.different_remote.len()
    }

    /// Locally computed digest for an upload path
    pub fn digest_for(&self, path: &RelativePath) -> Option<&ContentDigest> {
        self.local_hashes.get(path)
    }

    /// Human-readable classification lists shown before confirmation
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        write_section(
            &mut out,
            &self.extra_remote,
            "No extra files",
            "Extra files found remotely to delete",
        );
        write_section(
            &mut out,
            &self.missing_remote,
            "No missing files",
            "Missing files not found remotely to upload",
        );
        write_section(
            &mut out,
            &self.different_remote,
            "No different files",
            "Files different remotely to upload",
        );

        if self.is_empty() {
            let _ = writeln!(out, "Nothing to do, sync complete");
        }

        out
    }
}

fn write_section(out: &mut String, paths: &[RelativePath], empty: &str, heading: &str) {
    if paths.is_empty() {
        let _ = writeln!(out, "{empty}");
        return;
    }
    let _ = writeln!(out, "{heading} ({}):", paths.len());
    for path in paths {
        let _ = writeln!(out, "  {path}");
    }
}
