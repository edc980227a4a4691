//! Shared helpers for S3 adapter tests

use std::collections::HashMap;

use bytes::Bytes;
use shasync_core::domain::ObjectKey;
use shasync_core::ports::{ByteStream, UploadRequest};
use shasync_storage::{S3Options, S3Storage};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const BUCKET: &str = "assets";
pub const KEY: &str = "site/big.bin";
pub const OBJECT_PATH: &str = "/assets/site/big.bin";
pub const UPLOAD_ID: &str = "upload-001";

pub const MIB: usize = 1024 * 1024;

/// Starts a mock server and returns a path-style client pointing at it.
pub async fn setup_s3_mock() -> (MockServer, S3Storage) {
    let server = MockServer::start().await;
    let storage = S3Storage::new(S3Options {
        bucket: BUCKET.to_string(),
        region: Some("eu-west-1".to_string()),
        endpoint: Some(server.uri()),
        force_path_style: true,
        access_key_id: Some("AKIDEXAMPLE".to_string()),
        secret_access_key: Some("secret".to_string()),
    })
    .await
    .unwrap();
    (server, storage)
}

/// Mounts `PutObject`.
pub async fn mount_put_object(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path(OBJECT_PATH))
        .and(query_param_is_missing("uploadId"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"etag-put\""))
        .mount(server)
        .await;
}

/// Mounts `CreateMultipartUpload` and `CompleteMultipartUpload`.
pub async fn mount_multipart(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(OBJECT_PATH))
        .and(query_param_is_missing("uploadId"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <InitiateMultipartUploadResult>\
                 <Bucket>{BUCKET}</Bucket><Key>{KEY}</Key><UploadId>{UPLOAD_ID}</UploadId>\
                 </InitiateMultipartUploadResult>"
            ),
            "application/xml",
        ))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(OBJECT_PATH))
        .and(query_param("uploadId", UPLOAD_ID))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <CompleteMultipartUploadResult>\
                 <Bucket>{BUCKET}</Bucket><Key>{KEY}</Key><ETag>\"etag-final\"</ETag>\
                 </CompleteMultipartUploadResult>"
            ),
            "application/xml",
        ))
        .mount(server)
        .await;
}

/// Mounts `UploadPart`, answering every part with `status`.
pub async fn mount_upload_part(server: &MockServer, status: u16) {
    Mock::given(method("PUT"))
        .and(path(OBJECT_PATH))
        .and(query_param("uploadId", UPLOAD_ID))
        .respond_with(ResponseTemplate::new(status).insert_header("ETag", "\"etag-part\""))
        .mount(server)
        .await;
}

/// An upload of `total` bytes delivered in `chunk`-sized pieces.
pub fn upload_request(total: usize, chunk: usize) -> UploadRequest {
    let mut pieces = Vec::new();
    let mut remaining = total;
    while remaining > 0 {
        let n = remaining.min(chunk);
        pieces.push(Ok(Bytes::from(vec![b'x'; n])));
        remaining -= n;
    }
    let body: ByteStream = Box::pin(futures_util::stream::iter(pieces));
    UploadRequest {
        key: ObjectKey::new(KEY).unwrap(),
        body,
        content_length: Some(total as u64),
        content_type: "application/octet-stream".to_string(),
        metadata: HashMap::from([("SHASYNC_HASH".to_string(), "ab".repeat(64))]),
    }
}

/// Requests with the given method whose query carries `name`.
pub fn with_query<'a>(requests: &'a [Request], verb: &str, name: &str) -> Vec<&'a Request> {
    requests
        .iter()
        .filter(|r| r.method.as_str() == verb)
        .filter(|r| r.url.query_pairs().any(|(k, _)| k == name))
        .collect()
}
