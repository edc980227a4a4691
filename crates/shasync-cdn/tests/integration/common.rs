//! Shared helpers for CDN adapter tests

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shasync_cdn::{CloudFrontCdn, CloudFrontOptions, CloudflareCdn, CloudflareCredentials};

pub const ZONE: &str = "zone-test-001";
pub const SITE: &str = "https://static.example.com";
pub const PURGE_PATH: &str = "/client/v4/zones/zone-test-001/purge_cache";

/// Starts a mock server and returns a client pointing at it.
pub async fn setup_cloudflare_mock() -> (MockServer, CloudflareCdn) {
    let server = MockServer::start().await;
    let cdn = CloudflareCdn::with_base_url(
        ZONE,
        SITE,
        CloudflareCredentials::new("ops@example.com", "global-key"),
        format!("{}/client/v4", server.uri()),
    );
    (server, cdn)
}

/// Mounts a purge endpoint that always reports success.
pub async fn mount_purge_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(PURGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "errors": [],
            "messages": [],
            "result": { "id": "purge-001" }
        })))
        .mount(server)
        .await;
}

/// `n` absolute paths `/f0.html`, `/f1.html`, ...
pub fn paths(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("/f{i}.html")).collect()
}

/// The `files` array of every purge request the server received.
pub async fn received_files(server: &MockServer) -> Vec<Vec<String>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|req| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            body["files"]
                .as_array()
                .unwrap()
                .iter()
                .map(|f| f.as_str().unwrap().to_string())
                .collect()
        })
        .collect()
}

// ============================================================================
// CloudFront
// ============================================================================

pub const DISTRIBUTION: &str = "E2EXAMPLE";
pub const INVALIDATION_PATH: &str = "/2020-05-31/distribution/E2EXAMPLE/invalidation";

/// Starts a mock server and returns a CloudFront client pointing at it.
pub async fn setup_cloudfront_mock() -> (MockServer, CloudFrontCdn) {
    let server = MockServer::start().await;
    let cdn = CloudFrontCdn::new(CloudFrontOptions {
        distribution_id: DISTRIBUTION.to_string(),
        endpoint: Some(server.uri()),
        access_key_id: Some("AKIDEXAMPLE".to_string()),
        secret_access_key: Some("secret".to_string()),
    })
    .await
    .unwrap();
    (server, cdn)
}

/// Mounts an invalidation endpoint that accepts every batch.
pub async fn mount_invalidation_created(server: &MockServer) {
    let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Invalidation xmlns="http://cloudfront.amazonaws.com/doc/2020-05-31/">
  <Id>I2J0I21PCUYOIK</Id>
  <Status>InProgress</Status>
  <CreateTime>2024-01-01T00:00:00Z</CreateTime>
  <InvalidationBatch>
    <Paths><Quantity>1</Quantity><Items><Path>/a.html</Path></Items></Paths>
    <CallerReference>ref</CallerReference>
  </InvalidationBatch>
</Invalidation>"#;
    Mock::given(method("POST"))
        .and(path(INVALIDATION_PATH))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header(
                    "Location",
                    "https://cloudfront.amazonaws.com/2020-05-31/distribution/E2EXAMPLE/invalidation/I2J0I21PCUYOIK",
                )
                .set_body_raw(body, "text/xml"),
        )
        .mount(server)
        .await;
}

/// Bodies of every request the server received, as text.
pub async fn received_bodies(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|req| String::from_utf8_lossy(&req.body).into_owned())
        .collect()
}
