//! Shared test doubles for the scenario tests
//!
//! All three doubles write into one [`EventLog`] so tests can assert the
//! order of destructive calls across storage and CDN.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use tempfile::TempDir;

use shasync_core::domain::{ObjectKey, SyncPlan};
use shasync_core::ports::{
    cached_digest, ByteStream, CopyRequest, DeleteFailure, DeleteReport, ICdnService,
    IConfirmationPrompt, IStorageService, ObjectMetadata, ObjectSummary, RemoteObjectRecord,
    UploadRequest, CONTENT_DIGEST_METADATA_KEY,
};
use shasync_sync::{ContentHasher, ReconcileOptions, Reconciler, SyncExecutor};

/// Ordered record of side-effecting calls, e.g. `delete:site/a.css`
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

// ============================================================================
// In-memory storage
// ============================================================================

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content: Vec<u8>,
    pub content_type: String,
    pub metadata: ObjectMetadata,
}

/// Object store double
///
/// Panics if `stream` is called for an object whose metadata already holds
/// a digest: that object must be resolved from metadata alone.
#[derive(Default)]
pub struct InMemoryStorage {
    pub objects: Mutex<BTreeMap<String, StoredObject>>,
    pub log: EventLog,
    pub list_calls: AtomicUsize,
    /// Keys whose deletion is refused, with the reason
    pub delete_failures: HashMap<String, String>,
    /// Keys whose upload fails
    pub upload_failures: HashSet<String>,
    pub fail_set_metadata: bool,
}

impl InMemoryStorage {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Seeds an object; `cached` stores its digest in metadata
    pub fn seed(&self, key: &str, content: &[u8], cached: bool) {
        let mut metadata = ObjectMetadata::new();
        if cached {
            metadata.insert(
                // stored lowercased, the way S3 returns user metadata
                CONTENT_DIGEST_METADATA_KEY.to_ascii_lowercase(),
                ContentHasher::digest_bytes(content).to_string(),
            );
        }
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                content: content.to_vec(),
                content_type: "application/octet-stream".to_string(),
                metadata,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

#[async_trait::async_trait]
impl IStorageService for InMemoryStorage {
    async fn list(&self, prefix: &str, max_keys: usize) -> anyhow::Result<Vec<ObjectSummary>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .take(max_keys)
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                last_modified: None,
                size: object.content.len() as u64,
            })
            .collect())
    }

    async fn get_metadata(&self, key: &ObjectKey) -> anyhow::Result<RemoteObjectRecord> {
        let object = self
            .get(key.as_str())
            .ok_or_else(|| anyhow::anyhow!("NoSuchKey: {key}"))?;
        Ok(RemoteObjectRecord {
            key: key.clone(),
            metadata: object.metadata,
        })
    }

    async fn set_metadata(&self, key: &ObjectKey, metadata: &ObjectMetadata) -> anyhow::Result<()> {
        self.record(format!("set_metadata:{key}"));
        if self.fail_set_metadata {
            anyhow::bail!("AccessDenied");
        }
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(key.as_str())
            .ok_or_else(|| anyhow::anyhow!("NoSuchKey: {key}"))?;
        object.metadata = metadata.clone();
        Ok(())
    }

    async fn copy(&self, request: &CopyRequest) -> anyhow::Result<()> {
        let mut objects = self.objects.lock().unwrap();
        let mut object = objects
            .get(request.from.as_str())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("NoSuchKey: {}", request.from))?;
        if let Some(content_type) = &request.content_type {
            object.content_type = content_type.clone();
        }
        object.metadata = request.metadata.clone();
        objects.insert(request.to.to_string(), object);
        Ok(())
    }

    async fn delete(&self, keys: &[ObjectKey]) -> anyhow::Result<DeleteReport> {
        let mut report = DeleteReport::default();
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            self.record(format!("delete:{key}"));
            match self.delete_failures.get(key.as_str()) {
                Some(reason) => report.failed.push(DeleteFailure {
                    key: key.to_string(),
                    reason: reason.clone(),
                }),
                None => {
                    objects.remove(key.as_str());
                    report.deleted.push(key.to_string());
                }
            }
        }
        Ok(report)
    }

    async fn upload(&self, request: UploadRequest) -> anyhow::Result<()> {
        self.record(format!("upload:{}", request.key));
        if self.upload_failures.contains(request.key.as_str()) {
            anyhow::bail!("SlowDown: upload rejected");
        }

        let mut content = Vec::new();
        let mut body = request.body;
        while let Some(chunk) = body.next().await {
            content.extend_from_slice(&chunk?);
        }

        self.objects.lock().unwrap().insert(
            request.key.to_string(),
            StoredObject {
                content,
                content_type: request.content_type,
                metadata: request.metadata,
            },
        );
        Ok(())
    }

    async fn stream(&self, key: &ObjectKey) -> anyhow::Result<ByteStream> {
        let object = self
            .get(key.as_str())
            .ok_or_else(|| anyhow::anyhow!("NoSuchKey: {key}"))?;
        if cached_digest(&object.metadata).is_some() {
            panic!("stream called for cached key {key}");
        }
        self.record(format!("stream:{key}"));
        let chunks: Vec<std::io::Result<Bytes>> = object
            .content
            .chunks(3)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

// ============================================================================
// Recording CDN
// ============================================================================

#[derive(Default)]
pub struct RecordingCdn {
    pub log: EventLog,
    pub fail: bool,
}

impl RecordingCdn {
    pub fn with_log(log: EventLog) -> Self {
        Self { log, fail: false }
    }
}

#[async_trait::async_trait]
impl ICdnService for RecordingCdn {
    async fn invalidate(&self, paths: &[String]) -> anyhow::Result<()> {
        let mut sorted = paths.to_vec();
        sorted.sort();
        self.log
            .lock()
            .unwrap()
            .push(format!("invalidate:{}", sorted.join(",")));
        if self.fail {
            anyhow::bail!("purge_cache returned success=false");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ============================================================================
// Scripted prompt
// ============================================================================

pub struct ScriptedPrompt {
    answer: String,
    pub asked: AtomicUsize,
}

impl ScriptedPrompt {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            asked: AtomicUsize::new(0),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IConfirmationPrompt for ScriptedPrompt {
    async fn ask(&self, _plan: &SyncPlan) -> anyhow::Result<String> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Creates a temp directory holding `files`
pub fn local_tree(files: &[(&str, &[u8])]) -> TempDir {
    let dir = TempDir::new().expect("create temp dir");
    for (rel, content) in files {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    dir
}

pub fn options(prefix: &str, directory_index: Option<&str>) -> ReconcileOptions {
    ReconcileOptions {
        prefix: prefix.to_string(),
        directory_index: directory_index.map(str::to_string),
        concurrency: 4,
        max_keys: 1000,
    }
}

/// Everything one scenario needs, wired together
pub struct Harness {
    pub log: EventLog,
    pub storage: Arc<InMemoryStorage>,
    pub cdn: Arc<RecordingCdn>,
    pub prompt: Arc<ScriptedPrompt>,
}

impl Harness {
    pub fn new(storage: InMemoryStorage, cdn: RecordingCdn, answer: &str) -> Self {
        let log = storage.log.clone();
        Self {
            log,
            storage: Arc::new(storage),
            cdn: Arc::new(cdn),
            prompt: Arc::new(ScriptedPrompt::answering(answer)),
        }
    }

    /// Storage and CDN sharing one fresh log
    pub fn answering(answer: &str) -> Self {
        let log = EventLog::default();
        Self::new(
            InMemoryStorage::with_log(log.clone()),
            RecordingCdn::with_log(log),
            answer,
        )
    }

    pub fn reconciler(&self, prefix: &str, directory_index: Option<&str>) -> Reconciler {
        Reconciler::new(self.storage.clone(), options(prefix, directory_index))
    }

    pub fn executor(&self, root: &Path) -> SyncExecutor {
        SyncExecutor::new(
            self.storage.clone(),
            self.cdn.clone(),
            self.prompt.clone(),
            root,
            4,
        )
    }

    /// Log entries that changed remote state or the CDN
    pub fn destructive_events(&self) -> Vec<String> {
        events(&self.log)
            .into_iter()
            .filter(|e| {
                e.starts_with("delete:") || e.starts_with("upload:") || e.starts_with("invalidate:")
            })
            .collect()
    }
}
