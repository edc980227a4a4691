//! CloudFront invalidation request shape and error handling

use shasync_core::ports::ICdnService;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, INVALIDATION_PATH};

#[tokio::test]
async fn test_invalidation_sends_all_paths_in_one_batch() {
    let (server, cdn) = common::setup_cloudfront_mock().await;
    common::mount_invalidation_created(&server).await;

    let paths = vec![
        "/site/a.html".to_string(),
        "/site/dir".to_string(),
        "/site/dir/".to_string(),
    ];
    cdn.invalidate(&paths).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let auth = requests[0]
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(auth.starts_with("AWS4-HMAC-SHA256"), "{auth}");

    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("<Quantity>3</Quantity>"), "{body}");
    for p in &paths {
        assert!(body.contains(&format!("<Path>{p}</Path>")), "{body}");
    }
    assert!(body.contains("<CallerReference>shasync_cf_E2EXAMPLE_invalidation_"));
}

#[tokio::test]
async fn test_each_call_uses_a_fresh_caller_reference() {
    let (server, cdn) = common::setup_cloudfront_mock().await;
    common::mount_invalidation_created(&server).await;

    cdn.invalidate(&["/a.html".to_string()]).await.unwrap();
    cdn.invalidate(&["/a.html".to_string()]).await.unwrap();

    let references: Vec<String> = common::received_bodies(&server)
        .await
        .iter()
        .filter_map(|body| {
            let start = body.find("<CallerReference>")? + "<CallerReference>".len();
            let end = body.find("</CallerReference>")?;
            Some(body[start..end].to_string())
        })
        .collect();
    assert_eq!(references.len(), 2);
    assert_ne!(references[0], references[1]);
}

#[tokio::test]
async fn test_api_error_fails_the_call() {
    let (server, cdn) = common::setup_cloudfront_mock().await;

    Mock::given(method("POST"))
        .and(path(INVALIDATION_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_raw(
            r#"<?xml version="1.0"?>
<ErrorResponse xmlns="http://cloudfront.amazonaws.com/doc/2020-05-31/">
  <Error><Type>Sender</Type><Code>InvalidArgument</Code><Message>bad path</Message></Error>
  <RequestId>req-1</RequestId>
</ErrorResponse>"#,
            "text/xml",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let err = cdn.invalidate(&["/a.html".to_string()]).await.unwrap_err();
    assert!(err.to_string().contains("CloudFront"), "{err}");
}

#[tokio::test]
async fn test_relative_path_sends_nothing() {
    let (server, cdn) = common::setup_cloudfront_mock().await;
    common::mount_invalidation_created(&server).await;

    let result = cdn
        .invalidate(&["/ok.html".to_string(), "bad.html".to_string()])
        .await;
    assert!(result.is_err());
    assert!(common::received_bodies(&server).await.is_empty());
}
