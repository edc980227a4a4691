//! Plan classification
//!
//! Compares a local and a remote [`HashIndex`] and classifies every path as
//! extra (remote only), missing (local only) or different (digest
//! mismatch). Every classified path yields its logical URL path for CDN
//! invalidation; a changed directory index file also yields its parent
//! directory, with and without a trailing slash.

use std::sync::Arc;

use shasync_core::domain::{HashIndex, Prefix, RelativePath, SyncPlan};
use tracing::info;

/// Pure diff over two indexes
#[derive(Debug, Clone)]
pub struct DiffEngine {
    prefix: Prefix,
    directory_index: Option<String>,
}

impl DiffEngine {
    /// `directory_index` is the default document name (e.g. `index.html`);
    /// an empty name is treated as unset.
    pub fn new(prefix: Prefix, directory_index: Option<String>) -> Self {
        Self {
            prefix,
            directory_index: directory_index.filter(|name| !name.is_empty()),
        }
    }

    /// Classifies every path and derives invalidation paths
    ///
    /// Output lists are sorted, so the plan does not depend on hash map
    /// iteration order.
    pub fn diff(&self, local: Arc<HashIndex>, remote: &HashIndex) -> SyncPlan {
        let mut extra_remote: Vec<RelativePath> = remote
            .paths()
            .filter(|path| !local.contains(path))
            .cloned()
            .collect();

        let mut missing_remote = Vec::new();
        let mut different_remote = Vec::new();
        for (path, local_digest) in local.iter() {
            match remote.get(path) {
                None => missing_remote.push(path.clone()),
                Some(remote_digest) if remote_digest != local_digest => {
                    different_remote.push(path.clone())
                }
                Some(_) => {}
            }
        }

        extra_remote.sort();
        missing_remote.sort();
        different_remote.sort();

        let invalidation_paths = extra_remote
            .iter()
            .chain(&missing_remote)
            .chain(&different_remote)
            .flat_map(|path| self.invalidation_paths_for(path))
            .collect();

        info!(
            extra = extra_remote.len(),
            missing = missing_remote.len(),
            different = different_remote.len(),
            "Sync plan computed"
        );

        SyncPlan::new(
            extra_remote,
            missing_remote,
            different_remote,
            invalidation_paths,
            local,
        )
    }

    /// Logical URL paths to purge when `path` changes
    pub fn invalidation_paths_for(&self, path: &RelativePath) -> Vec<String> {
        let logical = self.prefix.logical_path(path);
        let mut paths = Vec::with_capacity(3);

        if let Some(index) = &self.directory_index {
            let suffix = format!("/{index}");
            if let Some(parent) = logical.strip_suffix(suffix.as_str()) {
                if parent.is_empty() {
                    paths.push(logical.clone());
                    paths.push("/".to_string());
                    return paths;
                }
                let parent = parent.to_string();
                let parent_with_slash = format!("{parent}/");
                paths.push(logical);
                paths.push(parent);
                paths.push(parent_with_slash);
                return paths;
            }
        }

        paths.push(logical);
        paths
    }
}
