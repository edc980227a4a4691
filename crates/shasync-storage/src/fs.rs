//! Local directory standing in for a bucket.
//!
//! Object `a/b.css` lives at `<root>/a/b.css`. Its content type and user
//! metadata live in a JSON sidecar at `<root>/.shasync-meta/a/b.css.json`,
//! which listings never return. Useful for publishing to a mounted share
//! and for exercising the engine without a cloud account.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use shasync_core::domain::ObjectKey;
use shasync_core::ports::{
    ByteStream, CopyRequest, DeleteFailure, DeleteReport, IStorageService, ObjectMetadata,
    ObjectSummary, RemoteObjectRecord, UploadRequest,
};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};

/// Directory under the root that holds metadata sidecars.
const META_DIR: &str = ".shasync-meta";

/// Content type recorded when none is known.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Sidecar contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Sidecar {
    content_type: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Filesystem-backed object store.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Opens (creating if needed) a store rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a key's content, rejecting anything that could leave the root.
    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn sidecar_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(META_DIR).join(format!("{key}.json")))
    }

    async fn read_sidecar(&self, key: &str) -> StorageResult<Sidecar> {
        match tokio::fs::read(self.sidecar_path(key)?).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Sidecar::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_sidecar(&self, key: &str, sidecar: &Sidecar) -> StorageResult<()> {
        let data = serde_json::to_vec_pretty(sidecar)?;
        write_atomic(&self.sidecar_path(key)?, &data).await
    }

    async fn ensure_exists(&self, key: &str) -> StorageResult<PathBuf> {
        let path = self.object_path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(StorageError::NotFound(key.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_one(&self, key: &str) -> StorageResult<()> {
        let meta_root = self.root.join(META_DIR);
        let targets = [
            (self.object_path(key)?, self.root.as_path()),
            (self.sidecar_path(key)?, meta_root.as_path()),
        ];
        for (path, stop) in targets {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                // Deleting a missing object succeeds, as on S3
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            prune_empty_parents(&path, stop).await;
        }
        Ok(())
    }

    /// Recursively collects object keys below `dir`, skipping the sidecar tree.
    fn walk<'a>(
        &'a self,
        dir: PathBuf,
        out: &'a mut Vec<ObjectSummary>,
    ) -> Pin<Box<dyn Future<Output = StorageResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    if dir == self.root && entry.file_name() == META_DIR {
                        continue;
                    }
                    self.walk(path, &mut *out).await?;
                } else if file_type.is_file() {
                    if is_temp_file(&path) {
                        continue;
                    }
                    let Some(key) = key_of(&self.root, &path) else {
                        debug!(path = %path.display(), "Skipping non UTF-8 file name");
                        continue;
                    };
                    let meta = entry.metadata().await?;
                    out.push(ObjectSummary {
                        key,
                        last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                        size: meta.len(),
                    });
                }
            }
            Ok(())
        })
    }
}

/// Rejects empty keys, absolute keys and any `.`/`..` component.
fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    let safe = Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !safe || key.split('/').any(|segment| segment == META_DIR) {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn key_of(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    Some(parts?.join("/"))
}

fn temp_path(target: &Path) -> PathBuf {
    let mut p = target.as_os_str().to_owned();
    p.push(".shasync-tmp");
    PathBuf::from(p)
}

fn is_temp_file(path: &Path) -> bool {
    path.to_str().map_or(false, |p| p.ends_with(".shasync-tmp"))
}

/// Write to a temporary file in the same directory, then rename over the target.
/// Removes the now-empty directories between `path` and `stop`.
///
/// Buckets have no directories, so a leftover one would block a later
/// upload of an object with the same key.
async fn prune_empty_parents(path: &Path, stop: &Path) {
    let mut dir = path.parent();
    while let Some(current) = dir {
        if current == stop || !current.starts_with(stop) {
            break;
        }
        if tokio::fs::remove_dir(current).await.is_err() {
            break;
        }
        dir = current.parent();
    }
}

async fn write_atomic(target: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = temp_path(target);
    tokio::fs::write(&tmp_path, data).await?;
    tokio::fs::rename(&tmp_path, target).await?;
    Ok(())
}

#[async_trait]
impl IStorageService for FsStorage {
    #[instrument(skip(self), fields(backend = "fs"))]
    async fn list(&self, prefix: &str, max_keys: usize) -> anyhow::Result<Vec<ObjectSummary>> {
        let mut all = Vec::new();
        self.walk(self.root.clone(), &mut all).await?;

        let mut matching: Vec<ObjectSummary> = all
            .into_iter()
            .filter(|summary| summary.key.starts_with(prefix))
            .collect();
        matching.sort_by(|a, b| a.key.cmp(&b.key));
        matching.truncate(max_keys);

        debug!(count = matching.len(), "Listed objects");
        Ok(matching)
    }

    #[instrument(skip(self), fields(backend = "fs", key = %key))]
    async fn get_metadata(&self, key: &ObjectKey) -> anyhow::Result<RemoteObjectRecord> {
        self.ensure_exists(key.as_str()).await?;
        let sidecar = self.read_sidecar(key.as_str()).await?;
        Ok(RemoteObjectRecord {
            key: key.clone(),
            metadata: sidecar.metadata,
        })
    }

    #[instrument(skip(self, metadata), fields(backend = "fs", key = %key))]
    async fn set_metadata(&self, key: &ObjectKey, metadata: &ObjectMetadata) -> anyhow::Result<()> {
        self.ensure_exists(key.as_str()).await?;
        let mut sidecar = self.read_sidecar(key.as_str()).await?;
        sidecar.metadata = metadata.clone();
        self.write_sidecar(key.as_str(), &sidecar).await?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(backend = "fs", from = %request.from, to = %request.to))]
    async fn copy(&self, request: &CopyRequest) -> anyhow::Result<()> {
        let source = self.ensure_exists(request.from.as_str()).await?;
        let source_sidecar = self.read_sidecar(request.from.as_str()).await?;
        let target = self.object_path(request.to.as_str())?;

        if source != target {
            let data = tokio::fs::read(&source).await?;
            write_atomic(&target, &data).await?;
        }

        let sidecar = Sidecar {
            content_type: request
                .content_type
                .clone()
                .or(source_sidecar.content_type),
            metadata: request.metadata.clone(),
        };
        self.write_sidecar(request.to.as_str(), &sidecar).await?;
        Ok(())
    }

    #[instrument(skip(self, keys), fields(backend = "fs", count = keys.len()))]
    async fn delete(&self, keys: &[ObjectKey]) -> anyhow::Result<DeleteReport> {
        let mut report = DeleteReport::default();
        for key in keys {
            match self.delete_one(key.as_str()).await {
                Ok(()) => report.deleted.push(key.to_string()),
                Err(e) => report.failed.push(DeleteFailure {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            }
        }
        Ok(report)
    }

    #[instrument(skip(self, request), fields(backend = "fs", key = %request.key))]
    async fn upload(&self, request: UploadRequest) -> anyhow::Result<()> {
        let target = self.object_path(request.key.as_str())?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = temp_path(&target);
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        let mut body = request.body;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    return Err(e.into());
                }
            };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, &target).await?;

        let content_type = if request.content_type.is_empty() {
            DEFAULT_CONTENT_TYPE.to_string()
        } else {
            request.content_type
        };
        self.write_sidecar(
            request.key.as_str(),
            &Sidecar {
                content_type: Some(content_type),
                metadata: request.metadata,
            },
        )
        .await?;

        debug!(bytes = written, "Upload complete");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "fs", key = %key))]
    async fn stream(&self, key: &ObjectKey) -> anyhow::Result<ByteStream> {
        let path = self.ensure_exists(key.as_str()).await?;
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::pin(ReaderStream::new(file)))
    }
}
