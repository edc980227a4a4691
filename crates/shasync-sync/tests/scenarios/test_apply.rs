//! Apply scenarios: confirmation gate, phase ordering and failure reporting

use shasync_core::domain::{ApplyPhase, SyncRunState};
use shasync_core::ports::CONTENT_DIGEST_METADATA_KEY;
use shasync_sync::{ContentHasher, SyncError};

use crate::common::{local_tree, EventLog, Harness, InMemoryStorage, RecordingCdn};

#[tokio::test]
async fn test_mixed_diff_deletes_then_uploads_then_invalidates() {
    let harness = Harness::answering("y");
    harness.storage.seed("prefix/x.html", b"h1", true);
    harness.storage.seed("prefix/z.css", b"h3", true);
    let dir = local_tree(&[("x.html", b"h1"), ("y.js", b"h2")]);

    let reconciliation = harness
        .reconciler("prefix", None)
        .plan(dir.path())
        .await
        .unwrap();
    let report = harness
        .executor(dir.path())
        .execute(&reconciliation)
        .await
        .unwrap();

    assert_eq!(harness.prompt.times_asked(), 1);
    assert_eq!(
        harness.destructive_events(),
        vec![
            "delete:prefix/z.css",
            "upload:prefix/y.js",
            "invalidate:/prefix/y.js,/prefix/z.css",
        ]
    );
    assert_eq!(report.state, SyncRunState::Done);
    assert_eq!(report.deleted, vec!["prefix/z.css"]);
    assert_eq!(report.uploaded, vec!["prefix/y.js"]);
    assert_eq!(report.invalidated.len(), 2);

    assert!(harness.storage.get("prefix/z.css").is_none());
    let uploaded = harness.storage.get("prefix/y.js").unwrap();
    assert_eq!(uploaded.content, b"h2");
    assert_eq!(
        uploaded
            .metadata
            .get(CONTENT_DIGEST_METADATA_KEY)
            .map(String::as_str),
        Some(ContentHasher::digest_bytes(b"h2").as_str())
    );
}

#[tokio::test]
async fn test_different_file_is_reuploaded() {
    let harness = Harness::answering("yes");
    harness.storage.seed("page.html", b"old", true);
    let dir = local_tree(&[("page.html", b"new")]);

    let reconciliation = harness.reconciler("", None).plan(dir.path()).await.unwrap();
    assert_eq!(reconciliation.plan.different_remote().len(), 1);

    harness
        .executor(dir.path())
        .execute(&reconciliation)
        .await
        .unwrap();

    let stored = harness.storage.get("page.html").unwrap();
    assert_eq!(stored.content, b"new");
    assert_eq!(stored.content_type, "text/html");
}

#[tokio::test]
async fn test_unknown_extension_uploads_as_octet_stream() {
    let harness = Harness::answering("y");
    let dir = local_tree(&[("blob.shasyncdata", b"\x00\x01")]);

    let reconciliation = harness.reconciler("", None).plan(dir.path()).await.unwrap();
    harness
        .executor(dir.path())
        .execute(&reconciliation)
        .await
        .unwrap();

    let stored = harness.storage.get("blob.shasyncdata").unwrap();
    assert_eq!(stored.content_type, "application/octet-stream");
}

#[tokio::test]
async fn test_index_file_change_invalidates_directory() {
    let harness = Harness::answering("y");
    harness.storage.seed("prefix/dir/index.html", b"v1", true);
    let dir = local_tree(&[("dir/index.html", b"v2")]);

    let reconciliation = harness
        .reconciler("prefix", Some("index.html"))
        .plan(dir.path())
        .await
        .unwrap();
    let report = harness
        .executor(dir.path())
        .execute(&reconciliation)
        .await
        .unwrap();

    for expected in ["/prefix/dir/index.html", "/prefix/dir", "/prefix/dir/"] {
        assert!(
            report.invalidated.contains(&expected.to_string()),
            "missing {expected}"
        );
    }
}

#[tokio::test]
async fn test_declined_confirmation_changes_nothing() {
    for answer in ["n", "", "nope", "maybe"] {
        let harness = Harness::answering(answer);
        harness.storage.seed("prefix/z.css", b"h3", true);
        let dir = local_tree(&[("y.js", b"h2")]);

        let reconciliation = harness
            .reconciler("prefix", None)
            .plan(dir.path())
            .await
            .unwrap();
        let err = harness
            .executor(dir.path())
            .execute(&reconciliation)
            .await
            .unwrap_err();

        assert!(err.is_cancelled(), "answer {answer:?}");
        assert_eq!(harness.prompt.times_asked(), 1);
        assert!(harness.destructive_events().is_empty());
        assert!(harness.storage.get("prefix/z.css").is_some());
    }
}

#[tokio::test]
async fn test_partial_delete_reports_failed_keys_and_stops() {
    let log = EventLog::default();
    let mut storage = InMemoryStorage::with_log(log.clone());
    storage
        .delete_failures
        .insert("p/b.css".to_string(), "AccessDenied".to_string());
    let harness = Harness::new(storage, RecordingCdn::with_log(log), "y");
    harness.storage.seed("p/a.css", b"a", true);
    harness.storage.seed("p/b.css", b"b", true);
    let dir = local_tree(&[("new.html", b"n")]);

    let reconciliation = harness.reconciler("p", None).plan(dir.path()).await.unwrap();
    let err = harness
        .executor(dir.path())
        .execute(&reconciliation)
        .await
        .unwrap_err();

    let apply = match err {
        SyncError::Apply(apply) => apply,
        other => panic!("expected apply error, got {other:?}"),
    };
    assert_eq!(apply.phase, ApplyPhase::Delete);
    assert_eq!(apply.succeeded, vec!["p/a.css"]);
    assert_eq!(apply.failed.len(), 1);
    assert_eq!(apply.failed[0].item, "p/b.css");
    assert_eq!(apply.failed[0].reason, "AccessDenied");

    // no upload, no invalidation
    assert!(!harness
        .destructive_events()
        .iter()
        .any(|e| e.starts_with("upload:") || e.starts_with("invalidate:")));
}

#[tokio::test]
async fn test_one_failed_upload_does_not_cancel_the_others() {
    let log = EventLog::default();
    let mut storage = InMemoryStorage::with_log(log.clone());
    storage.upload_failures.insert("bad.txt".to_string());
    let harness = Harness::new(storage, RecordingCdn::with_log(log), "y");
    let dir = local_tree(&[("bad.txt", b"x"), ("good1.txt", b"y"), ("good2.txt", b"z")]);

    let reconciliation = harness.reconciler("", None).plan(dir.path()).await.unwrap();
    let err = harness
        .executor(dir.path())
        .execute(&reconciliation)
        .await
        .unwrap_err();

    let apply = match err {
        SyncError::Apply(apply) => apply,
        other => panic!("expected apply error, got {other:?}"),
    };
    assert_eq!(apply.phase, ApplyPhase::Upload);
    assert_eq!(apply.succeeded, vec!["good1.txt", "good2.txt"]);
    assert_eq!(apply.failed[0].item, "bad.txt");
    assert!(apply.failed[0].reason.contains("SlowDown"));

    assert!(harness.storage.get("good1.txt").is_some());
    assert!(harness.storage.get("good2.txt").is_some());
    assert!(!harness
        .destructive_events()
        .iter()
        .any(|e| e.starts_with("invalidate:")));
}

#[tokio::test]
async fn test_cdn_failure_is_an_invalidate_apply_error() {
    let log = EventLog::default();
    let cdn = RecordingCdn {
        log: log.clone(),
        fail: true,
    };
    let harness = Harness::new(InMemoryStorage::with_log(log), cdn, "y");
    let dir = local_tree(&[("a.html", b"a")]);

    let reconciliation = harness.reconciler("s", None).plan(dir.path()).await.unwrap();
    let err = harness
        .executor(dir.path())
        .execute(&reconciliation)
        .await
        .unwrap_err();

    let apply = match err {
        SyncError::Apply(apply) => apply,
        other => panic!("expected apply error, got {other:?}"),
    };
    assert_eq!(apply.phase, ApplyPhase::Invalidate);
    assert_eq!(apply.failed[0].item, "/s/a.html");
    // the upload already happened and is not rolled back
    assert!(harness.storage.get("s/a.html").is_some());
}

#[tokio::test]
async fn test_delete_only_plan_skips_upload_phase() {
    let harness = Harness::answering("Y");
    harness.storage.seed("gone.txt", b"g", true);
    let dir = local_tree(&[]);

    let reconciliation = harness.reconciler("", None).plan(dir.path()).await.unwrap();
    let report = harness
        .executor(dir.path())
        .execute(&reconciliation)
        .await
        .unwrap();

    assert_eq!(
        harness.destructive_events(),
        vec!["delete:gone.txt", "invalidate:/gone.txt"]
    );
    assert!(report.uploaded.is_empty());
    assert!(harness.storage.keys().is_empty());
}
