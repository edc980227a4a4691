//! Planning scenarios: validation, indexing and the remote hash cache

use std::sync::atomic::Ordering;

use shasync_core::domain::RelativePath;
use shasync_core::ports::CONTENT_DIGEST_METADATA_KEY;
use shasync_sync::{ContentHasher, SyncError};

use crate::common::{local_tree, Harness, InMemoryStorage, RecordingCdn};

fn strs(paths: &[RelativePath]) -> Vec<&str> {
    paths.iter().map(RelativePath::as_str).collect()
}

#[tokio::test]
async fn test_no_changes_requests_nothing() {
    let harness = Harness::answering("y");
    harness.storage.seed("prefix/x.html", b"h1", true);
    let dir = local_tree(&[("x.html", b"h1")]);

    let reconciliation = harness
        .reconciler("prefix", None)
        .plan(dir.path())
        .await
        .unwrap();
    assert!(reconciliation.plan.is_empty());

    let report = harness
        .executor(dir.path())
        .execute(&reconciliation)
        .await
        .unwrap();

    assert!(report.state.is_success());
    assert_eq!(harness.prompt.times_asked(), 0);
    assert!(harness.destructive_events().is_empty());
}

#[tokio::test]
async fn test_planning_twice_is_idempotent() {
    let harness = Harness::answering("y");
    harness.storage.seed("site/a.css", b"a", true);
    harness.storage.seed("site/b/c.js", b"c", false);
    let dir = local_tree(&[("a.css", b"a"), ("b/c.js", b"c")]);
    let reconciler = harness.reconciler("site", None);

    let first = reconciler.plan(dir.path()).await.unwrap();
    let second = reconciler.plan(dir.path()).await.unwrap();

    assert!(first.plan.is_empty());
    assert!(second.plan.is_empty());
}

#[tokio::test]
async fn test_invalid_prefix_fails_before_any_io() {
    let harness = Harness::answering("y");
    let dir = local_tree(&[("x.html", b"h1")]);

    for prefix in ["/a", "a/", "a\\b"] {
        let err = harness
            .reconciler(prefix, None)
            .plan(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)), "prefix {prefix:?}");
    }
    assert_eq!(harness.storage.list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreadable_local_root_fails_before_remote_pass() {
    let harness = Harness::answering("y");
    harness.storage.seed("x.html", b"h1", false);
    let dir = local_tree(&[]);

    let err = harness
        .reconciler("", None)
        .plan(&dir.path().join("missing"))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::FileSystem { .. }));
    assert_eq!(harness.storage.list_calls.load(Ordering::SeqCst), 0);
    assert!(harness.storage.get("x.html").unwrap().metadata.is_empty());
}

#[tokio::test]
async fn test_cached_objects_are_never_streamed() {
    // InMemoryStorage panics if a cached key is streamed
    let harness = Harness::answering("y");
    harness.storage.seed("p/cached.html", b"old", true);
    harness.storage.seed("p/fresh.html", b"new", false);
    let dir = local_tree(&[("cached.html", b"old"), ("fresh.html", b"new")]);

    let reconciliation = harness.reconciler("p", None).plan(dir.path()).await.unwrap();

    assert!(reconciliation.plan.is_empty());
    let log = crate::common::events(&harness.log);
    assert!(log.contains(&"stream:p/fresh.html".to_string()));
    assert!(!log.iter().any(|e| e.contains("cached.html")));
}

#[tokio::test]
async fn test_computed_digest_is_written_back() {
    let harness = Harness::answering("y");
    harness.storage.seed("p/page.html", b"content", false);
    let dir = local_tree(&[("page.html", b"content")]);

    harness.reconciler("p", None).plan(dir.path()).await.unwrap();

    let stored = harness.storage.get("p/page.html").unwrap();
    assert_eq!(
        stored
            .metadata
            .get(CONTENT_DIGEST_METADATA_KEY)
            .map(String::as_str),
        Some(ContentHasher::digest_bytes(b"content").as_str())
    );

    // second run resolves from metadata; stream would now panic
    let again = harness.reconciler("p", None).plan(dir.path()).await.unwrap();
    assert!(again.plan.is_empty());
}

#[tokio::test]
async fn test_persist_failure_is_reported_not_fatal() {
    let log = crate::common::EventLog::default();
    let storage = InMemoryStorage {
        fail_set_metadata: true,
        ..InMemoryStorage::with_log(log.clone())
    };
    let harness = Harness::new(storage, RecordingCdn::with_log(log), "y");
    harness.storage.seed("x.html", b"same", false);
    let dir = local_tree(&[("x.html", b"same")]);

    let reconciliation = harness.reconciler("", None).plan(dir.path()).await.unwrap();

    assert!(reconciliation.plan.is_empty());
    assert_eq!(reconciliation.persist_failures.len(), 1);
    assert_eq!(reconciliation.persist_failures[0].key, "x.html");

    let report = harness
        .executor(dir.path())
        .execute(&reconciliation)
        .await
        .unwrap();
    assert_eq!(report.persist_failures.len(), 1);
}

#[tokio::test]
async fn test_empty_prefix_uses_bare_keys() {
    let harness = Harness::answering("y");
    harness.storage.seed("a/b.css", b"b", true);
    let dir = local_tree(&[("a/b.css", b"b"), ("c.txt", b"c")]);

    let reconciliation = harness.reconciler("", None).plan(dir.path()).await.unwrap();

    assert_eq!(strs(reconciliation.plan.missing_remote()), vec!["c.txt"]);
    assert_eq!(reconciliation.plan.invalidation_paths(), &["/c.txt"]);
}

#[tokio::test]
async fn test_sibling_prefix_is_not_listed() {
    let harness = Harness::answering("y");
    harness.storage.seed("site/x.html", b"x", true);
    harness.storage.seed("site-old/y.html", b"y", true);
    let dir = local_tree(&[("x.html", b"x")]);

    let reconciliation = harness.reconciler("site", None).plan(dir.path()).await.unwrap();

    assert!(reconciliation.plan.is_empty());
}

#[tokio::test]
async fn test_prefix_folder_marker_is_left_alone() {
    let harness = Harness::answering("y");
    harness.storage.seed("site/", b"", false);
    harness.storage.seed("site/x.html", b"x", true);
    let dir = local_tree(&[("x.html", b"x")]);

    let reconciliation = harness.reconciler("site", None).plan(dir.path()).await.unwrap();

    assert!(reconciliation.plan.is_empty());
    assert!(reconciliation.persist_failures.is_empty());
    assert!(harness.storage.keys().contains(&"site/".to_string()));
}
