//! Local directory indexing
//!
//! Walks a directory tree, hashes every regular file and keys the digest by
//! the file's normalized path relative to the root. Any unreadable entry
//! fails the whole build: a partial index would show up as false deletions.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use futures_util::{stream, StreamExt, TryStreamExt};
use shasync_core::domain::{HashIndex, RelativePath};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument};

use crate::hasher::ContentHasher;
use crate::SyncError;

/// A file found by the walk
#[derive(Debug, Clone)]
struct LocalFile {
    absolute: PathBuf,
    relative: RelativePath,
}

/// Builds the local [`HashIndex`]
#[derive(Debug, Clone)]
pub struct LocalIndexBuilder {
    concurrency: usize,
}

impl LocalIndexBuilder {
    /// Creates a builder hashing at most `concurrency` files at once
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Indexes every regular file under `root`
    ///
    /// Symlinks to files are followed; symlinks to directories are not
    /// descended into.
    ///
    /// # Errors
    /// `SyncError::FileSystem` if `root` is missing, not a directory, or any
    /// entry beneath it cannot be read.
    #[instrument(skip(self), fields(root = %root.display()))]
    pub async fn build(&self, root: &Path) -> Result<HashIndex, SyncError> {
        let metadata = tokio::fs::metadata(root)
            .await
            .map_err(|e| SyncError::file_system(root, e))?;
        if !metadata.is_dir() {
            return Err(SyncError::file_system(
                root,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let mut files = Vec::new();
        walk_directory(root, root, &mut files).await?;
        debug!(files = files.len(), "Local walk complete");

        let index: HashIndex = stream::iter(files)
            .map(|file| async move {
                let digest = hash_file(&file.absolute)
                    .await
                    .map_err(|e| SyncError::file_system(&file.absolute, e))?;
                Ok::<_, SyncError>((file.relative, digest))
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        info!(files = index.len(), "Local index built");
        Ok(index)
    }
}

/// Hashes one file through a read stream
async fn hash_file(path: &Path) -> std::io::Result<shasync_core::domain::ContentDigest> {
    let file = tokio::fs::File::open(path).await?;
    ContentHasher::digest_stream(ReaderStream::new(file)).await
}

/// Path of `path` relative to `root`, normalized
fn relative_to(root: &Path, path: &Path) -> Result<RelativePath, SyncError> {
    let invalid = |msg: &str| {
        SyncError::file_system(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string()),
        )
    };

    let relative = path
        .strip_prefix(root)
        .map_err(|_| invalid("path escapes the sync root"))?;
    let relative = relative
        .to_str()
        .ok_or_else(|| invalid("file name is not valid UTF-8"))?;
    RelativePath::new(relative).map_err(|e| invalid(&e.to_string()))
}

/// Recursively collects regular files below `dir`
fn walk_directory<'a>(
    dir: &'a Path,
    root: &'a Path,
    files: &'a mut Vec<LocalFile>,
) -> Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| SyncError::file_system(dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SyncError::file_system(dir, e))?
        {
            let entry_path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| SyncError::file_system(&entry_path, e))?;

            if file_type.is_dir() {
                walk_directory(&entry_path, root, files).await?;
            } else if file_type.is_file() {
                let relative = relative_to(root, &entry_path)?;
                files.push(LocalFile {
                    absolute: entry_path,
                    relative,
                });
            } else if file_type.is_symlink() {
                // Follows the link; a dangling link fails the build
                let target = tokio::fs::metadata(&entry_path)
                    .await
                    .map_err(|e| SyncError::file_system(&entry_path, e))?;
                if target.is_file() {
                    let relative = relative_to(root, &entry_path)?;
                    files.push(LocalFile {
                        absolute: entry_path,
                        relative,
                    });
                } else {
                    debug!(path = %entry_path.display(), "Skipping symlinked directory");
                }
            } else {
                debug!(path = %entry_path.display(), "Skipping special file");
            }
        }

        Ok(())
    })
}
