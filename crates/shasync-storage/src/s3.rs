//! S3-compatible object store using the AWS SDK.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, Delete, MetadataDirective, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use shasync_core::domain::ObjectKey;
use shasync_core::ports::{
    ByteStream, CopyRequest, DeleteFailure, DeleteReport, IStorageService, ObjectMetadata,
    ObjectSummary, RemoteObjectRecord, UploadRequest,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument, warn};

use crate::error::{StorageError, StorageResult};

/// Largest page `ListObjectsV2` returns.
const LIST_PAGE_SIZE: usize = 1000;

/// Largest batch `DeleteObjects` accepts.
const DELETE_BATCH_SIZE: usize = 1000;

/// Smallest part S3 accepts, except for the last one.
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Most parts one multipart upload may have.
const MAX_PARTS: u64 = 10_000;

const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for [`S3Storage`].
#[derive(Clone, Default)]
pub struct S3Options {
    pub bucket: String,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...).
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    /// Explicit credentials. When absent the ambient AWS chain is used.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for S3Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Options")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("force_path_style", &self.force_path_style)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "<set>"))
            .finish_non_exhaustive()
    }
}

/// Bucket-backed implementation of [`IStorageService`].
pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3Storage {
    /// Builds a client for `options.bucket`.
    ///
    /// Access key and secret must be given together. Without them the
    /// default provider chain (environment, profile, IMDS) is loaded.
    pub async fn new(options: S3Options) -> StorageResult<Self> {
        if options.bucket.is_empty() {
            return Err(StorageError::Config("bucket name is required".to_string()));
        }
        if options.access_key_id.is_some() ^ options.secret_access_key.is_some() {
            return Err(StorageError::Config(
                "access key id and secret access key must be set together".to_string(),
            ));
        }

        let region = options
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let sdk_region = aws_config::Region::new(region.clone());

        let mut builder = match (options.access_key_id, options.secret_access_key) {
            (Some(key_id), Some(secret)) => {
                let credentials = aws_sdk_s3::config::Credentials::new(
                    key_id,
                    secret,
                    None,
                    None,
                    "shasync-config",
                );
                aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(sdk_region)
                    .credentials_provider(credentials)
            }
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(sdk_region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };

        if let Some(endpoint) = &options.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if options.force_path_style {
            builder = builder.force_path_style(true);
        }

        debug!(bucket = %options.bucket, region = %region, "S3 client configured");
        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: options.bucket,
            region,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Maps an SDK error, turning HTTP 404 into [`StorageError::NotFound`].
    fn map_sdk_error<E>(err: SdkError<E>, key: &str) -> StorageError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let SdkError::ServiceError(ref service_err) = err {
            if service_err.raw().status().as_u16() == 404 {
                return StorageError::NotFound(key.to_string());
            }
        }
        StorageError::S3(Box::new(err))
    }

    fn copy_source(&self, key: &ObjectKey) -> String {
        format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(key.as_str(), NON_ALPHANUMERIC)
        )
    }

    /// Sends the body as numbered parts, starting with what is already in
    /// `buffer`.
    async fn upload_parts(
        &self,
        key: &ObjectKey,
        upload_id: &str,
        mut body: ByteStream,
        mut buffer: BytesMut,
        part_size: usize,
    ) -> StorageResult<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        loop {
            let full = fill_part(&mut body, &mut buffer, part_size).await?;
            let data = if full {
                buffer.split_to(part_size).freeze()
            } else if buffer.is_empty() {
                break;
            } else {
                std::mem::take(&mut buffer).freeze()
            };

            let part_number = parts.len() as i32 + 1;
            let output = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key.as_str())
                .upload_id(upload_id)
                .part_number(part_number)
                .content_length(data.len() as i64)
                .body(aws_sdk_s3::primitives::ByteStream::from(data))
                .send()
                .await
                .map_err(|e| StorageError::S3(Box::new(e)))?;

            parts.push(
                CompletedPart::builder()
                    .e_tag(output.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );
            if !full {
                break;
            }
        }
        Ok(parts)
    }

    async fn abort_upload(&self, key: &ObjectKey, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key.as_str())
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!(
                key = %key,
                upload_id = %upload_id,
                error = %e,
                "Failed to abort multipart upload, orphaned parts may remain"
            );
        }
    }

    async fn delete_batch(&self, keys: &[ObjectKey]) -> StorageResult<DeleteReport> {
        let ids = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k.as_str()).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::S3(Box::new(e)))?;
        let delete = Delete::builder()
            .set_objects(Some(ids))
            .quiet(false)
            .build()
            .map_err(|e| StorageError::S3(Box::new(e)))?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?;

        let deleted = output
            .deleted()
            .iter()
            .filter_map(|d| d.key().map(str::to_string))
            .collect();
        let failed = output
            .errors()
            .iter()
            .map(|e| DeleteFailure {
                key: e.key().unwrap_or_default().to_string(),
                reason: match (e.code(), e.message()) {
                    (Some(code), Some(message)) => format!("{code}: {message}"),
                    (Some(code), None) => code.to_string(),
                    (None, Some(message)) => message.to_string(),
                    (None, None) => "unknown error".to_string(),
                },
            })
            .collect();
        Ok(DeleteReport { deleted, failed })
    }
}

/// Part size for a body of `content_length` bytes.
///
/// Grows past the S3 minimum only when the body would otherwise need more
/// than [`MAX_PARTS`] parts.
fn part_size_for(content_length: Option<u64>) -> usize {
    let needed = content_length.unwrap_or(0).div_ceil(MAX_PARTS) as usize;
    needed.max(MIN_PART_SIZE)
}

/// Reads from `body` until `buffer` holds at least `part_size` bytes.
///
/// Returns `false` when the body ended first.
async fn fill_part(
    body: &mut ByteStream,
    buffer: &mut BytesMut,
    part_size: usize,
) -> std::io::Result<bool> {
    while buffer.len() < part_size {
        match body.next().await {
            Some(chunk) => buffer.extend_from_slice(&chunk?),
            None => return Ok(false),
        }
    }
    Ok(true)
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

/// Page size for the next listing request given what is still wanted.
fn page_size(remaining: usize) -> i32 {
    remaining.min(LIST_PAGE_SIZE) as i32
}

#[async_trait]
impl IStorageService for S3Storage {
    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn list(&self, prefix: &str, max_keys: usize) -> anyhow::Result<Vec<ObjectSummary>> {
        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        while results.len() < max_keys {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .max_keys(page_size(max_keys - results.len()));
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|e| StorageError::S3(Box::new(e)))?;

            for object in output.contents() {
                let Some(key) = object.key() else { continue };
                results.push(ObjectSummary {
                    key: key.to_string(),
                    last_modified: object.last_modified().and_then(to_chrono),
                    size: object.size().unwrap_or(0).max(0) as u64,
                });
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        results.truncate(max_keys);
        debug!(count = results.len(), "Listed objects");
        Ok(results)
    }

    #[instrument(skip(self), fields(backend = "s3", key = %key))]
    async fn get_metadata(&self, key: &ObjectKey) -> anyhow::Result<RemoteObjectRecord> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key.as_str()))?;

        Ok(RemoteObjectRecord {
            key: key.clone(),
            metadata: output.metadata().cloned().unwrap_or_default(),
        })
    }

    /// Rewrites user metadata with a self-copy, keeping the content type.
    #[instrument(skip(self, metadata), fields(backend = "s3", key = %key))]
    async fn set_metadata(&self, key: &ObjectKey, metadata: &ObjectMetadata) -> anyhow::Result<()> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key.as_str()))?;

        self.copy(&CopyRequest {
            from: key.clone(),
            to: key.clone(),
            content_type: head.content_type().map(str::to_string),
            metadata: metadata.clone(),
        })
        .await
    }

    #[instrument(skip(self, request), fields(backend = "s3", from = %request.from, to = %request.to))]
    async fn copy(&self, request: &CopyRequest) -> anyhow::Result<()> {
        let metadata: HashMap<String, String> = request.metadata.clone();
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(request.to.as_str())
            .copy_source(self.copy_source(&request.from))
            .metadata_directive(MetadataDirective::Replace)
            .set_content_type(request.content_type.clone())
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, request.from.as_str()))?;
        Ok(())
    }

    #[instrument(skip(self, keys), fields(backend = "s3", count = keys.len()))]
    async fn delete(&self, keys: &[ObjectKey]) -> anyhow::Result<DeleteReport> {
        let mut report = DeleteReport::default();
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            match self.delete_batch(batch).await {
                Ok(partial) => report.merge(partial),
                Err(e) => {
                    warn!(error = %e, batch = batch.len(), "Delete request failed");
                    let reason = e.to_string();
                    report.failed.extend(batch.iter().map(|k| DeleteFailure {
                        key: k.to_string(),
                        reason: reason.clone(),
                    }));
                }
            }
        }
        Ok(report)
    }

    /// Streams the body in parts of bounded size.
    ///
    /// A body that fits in one part is sent with a single `PutObject`;
    /// anything larger goes through a multipart upload, which is aborted if
    /// a part fails.
    #[instrument(skip(self, request), fields(backend = "s3", key = %request.key))]
    async fn upload(&self, request: UploadRequest) -> anyhow::Result<()> {
        let part_size = part_size_for(request.content_length);
        let mut body = request.body;
        let mut buffer = BytesMut::new();

        if !fill_part(&mut body, &mut buffer, part_size).await? {
            let size = buffer.len();
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(request.key.as_str())
                .content_type(request.content_type)
                .content_length(size as i64)
                .set_metadata(Some(request.metadata))
                .body(aws_sdk_s3::primitives::ByteStream::from(buffer.freeze()))
                .send()
                .await
                .map_err(|e| StorageError::S3(Box::new(e)))?;
            debug!(bytes = size, "Upload complete");
            return Ok(());
        }

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(request.key.as_str())
            .content_type(request.content_type)
            .set_metadata(Some(request.metadata))
            .send()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::Config("S3 did not return an upload id".to_string()))?
            .to_string();

        let parts = match self
            .upload_parts(&request.key, &upload_id, body, buffer, part_size)
            .await
        {
            Ok(parts) => parts,
            Err(e) => {
                self.abort_upload(&request.key, &upload_id).await;
                return Err(e.into());
            }
        };
        let count = parts.len();

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(request.key.as_str())
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await;
        if let Err(e) = completed {
            self.abort_upload(&request.key, &upload_id).await;
            return Err(StorageError::S3(Box::new(e)).into());
        }

        debug!(parts = count, "Multipart upload complete");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3", key = %key))]
    async fn stream(&self, key: &ObjectKey) -> anyhow::Result<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key.as_str()))?;

        Ok(Box::pin(ReaderStream::new(output.body.into_async_read())))
    }
}
