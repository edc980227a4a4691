//! Object storage port (driven/secondary port)
//!
//! This module defines the interface the reconciliation engine uses to talk
//! to a remote object store. Implementations live in `shasync-storage`
//! (S3 and a local directory mirror).
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific.
//! - Object content crosses the port as a [`ByteStream`], never as a full buffer.
//! - Keys are validated [`ObjectKey`]s and never begin with `/`.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::domain::newtypes::ObjectKey;

/// Metadata field that carries the cached content digest of an object
///
/// Part of the contract between runs: changing it invalidates every cache
/// entry written by earlier versions.
pub const CONTENT_DIGEST_METADATA_KEY: &str = "SHASYNC_HASH";

/// User metadata attached to a stored object
pub type ObjectMetadata = HashMap<String, String>;

/// Streamed object content
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Looks up the cached digest in `metadata`
///
/// Some stores lowercase metadata names, so the match ignores ASCII case.
pub fn cached_digest(metadata: &ObjectMetadata) -> Option<&str> {
    metadata
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(CONTENT_DIGEST_METADATA_KEY))
        .map(|(_, value)| value.as_str())
}

/// Returns `metadata` with the digest entry replaced by `digest`
///
/// Any differently-cased spelling of the reserved key is removed first so
/// the result carries exactly one digest entry.
pub fn with_digest(metadata: &ObjectMetadata, digest: &str) -> ObjectMetadata {
    let mut merged: ObjectMetadata = metadata
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(CONTENT_DIGEST_METADATA_KEY))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    merged.insert(CONTENT_DIGEST_METADATA_KEY.to_string(), digest.to_string());
    merged
}

// ============================================================================
// Listing and metadata DTOs
// ============================================================================

/// One entry of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Full key, including the prefix
    pub key: String,
    /// Last modification time, if the backend reports one
    pub last_modified: Option<DateTime<Utc>>,
    /// Size in bytes
    pub size: u64,
}

/// A stored object's key and user metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObjectRecord {
    pub key: ObjectKey,
    pub metadata: ObjectMetadata,
}

// ============================================================================
// Write requests
// ============================================================================

/// Server-side copy of one object onto another key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub from: ObjectKey,
    pub to: ObjectKey,
    /// Content type of the destination; backends keep the source's when `None`
    pub content_type: Option<String>,
    /// Replaces the destination's user metadata
    pub metadata: ObjectMetadata,
}

/// Upload of new object content
pub struct UploadRequest {
    pub key: ObjectKey,
    pub body: ByteStream,
    /// Body length, when known up front
    pub content_length: Option<u64>,
    pub content_type: String,
    pub metadata: ObjectMetadata,
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("key", &self.key)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Delete report
// ============================================================================

/// A key the backend refused to delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    pub key: String,
    pub reason: String,
}

/// Per-key outcome of a batch delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<DeleteFailure>,
}

impl DeleteReport {
    /// Returns true when every key was deleted
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Appends another batch's outcome
    pub fn merge(&mut self, other: DeleteReport) {
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
    }
}

// ============================================================================
// IStorageService trait
// ============================================================================

/// Port for a remote object store
#[async_trait::async_trait]
pub trait IStorageService: Send + Sync {
    /// Lists up to `max_keys` objects whose key starts with `prefix`
    ///
    /// `prefix` is a raw key prefix (e.g. `"site/"`), not a [`crate::domain::Prefix`].
    async fn list(&self, prefix: &str, max_keys: usize) -> anyhow::Result<Vec<ObjectSummary>>;

    /// Reads an object's user metadata without touching its content
    async fn get_metadata(&self, key: &ObjectKey) -> anyhow::Result<RemoteObjectRecord>;

    /// Replaces an object's user metadata, preserving content and content type
    async fn set_metadata(&self, key: &ObjectKey, metadata: &ObjectMetadata) -> anyhow::Result<()>;

    /// Server-side copy
    async fn copy(&self, request: &CopyRequest) -> anyhow::Result<()>;

    /// Deletes a batch of keys
    ///
    /// Partial failure is reported through [`DeleteReport::failed`]; an
    /// `Err` means the call as a whole could not be made.
    async fn delete(&self, keys: &[ObjectKey]) -> anyhow::Result<DeleteReport>;

    /// Uploads new content under `request.key`
    async fn upload(&self, request: UploadRequest) -> anyhow::Result<()>;

    /// Opens a stream over an object's content
    async fn stream(&self, key: &ObjectKey) -> anyhow::Result<ByteStream>;
}
