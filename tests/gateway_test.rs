mod common;

use common::*;
use rust_blog_storage::config::StorageConfig;
use rust_blog_storage::error::StorageError;
use rust_blog_storage::models::{OperationKind, TransferState, UploadRequest};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const VENDOR_HOST: &str = "s-cd-1234-blog.cos.ap-chengdu.myqcloud.com";

#[tokio::test]
async fn test_upload_then_delete_round_trip() {
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::default());
    let (gateway, credentials, connector) =
        gateway_with(test_config(staging.path().into()), store.clone(), VENDOR_HOST);

    // 1. Upload
    let request = UploadRequest::new("cat.png")
        .with_path("images/cat.png")
        .with_content_type("image/png");
    let result = gateway.upload(b"meow".to_vec(), request).await.unwrap();

    assert_eq!(result.path, "images/cat.png");
    assert_eq!(result.size, 4);
    assert_eq!(result.filename, "cat.png");
    assert_eq!(
        result.url,
        "https://cos.ap-chengdu.myqcloud.com/images/cat.png"
    );
    assert_eq!(store.get("images/cat.png").unwrap(), b"meow");
    assert_eq!(store.content_type("images/cat.png").as_deref(), Some("image/png"));

    // 2. Delete what was returned
    let outcome = gateway.delete(&result.path).await.unwrap();
    assert_eq!(outcome.deleted, vec!["images/cat.png".to_string()]);
    assert!(outcome.is_clean());
    assert!(store.get("images/cat.png").is_none());

    // 3. One narrowly scoped credential per operation
    assert_eq!(
        credentials.issued(),
        vec![
            ("images/cat.png".to_string(), OperationKind::Write),
            ("images/cat.png".to_string(), OperationKind::FullControl),
        ]
    );
    assert!(
        connector
            .endpoints()
            .iter()
            .all(|e| e == "https://cos.ap-chengdu.myqcloud.com")
    );
}

#[tokio::test]
async fn test_delete_missing_object_is_not_an_error() {
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::default());
    let (gateway, _, _) = gateway_with(test_config(staging.path().into()), store.clone(), VENDOR_HOST);

    gateway
        .upload(b"x".to_vec(), UploadRequest::new("a.txt").with_path("docs/a.txt"))
        .await
        .unwrap();

    let existing = gateway.delete("docs/a.txt").await;
    let missing = gateway.delete("docs/never-uploaded.txt").await;

    assert!(existing.is_ok());
    let missing = missing.unwrap();
    assert!(missing.deleted.is_empty());
    assert_eq!(missing.errors.len(), 1);
    assert_eq!(missing.errors[0].code, "NoSuchKey");

    // Callers that want per-object errors escalated opt in
    assert!(matches!(
        missing.into_strict(),
        Err(StorageError::PartialDelete(_))
    ));
}

#[tokio::test]
async fn test_generated_path_uses_default_prefix() {
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::default());
    let (gateway, _, _) = gateway_with(test_config(staging.path().into()), store.clone(), VENDOR_HOST);

    let result = gateway
        .upload(b"gif".to_vec(), UploadRequest::new("party.gif"))
        .await
        .unwrap();

    assert!(result.path.starts_with("images/"));
    assert!(result.path.ends_with(".gif"));
    // "images/" + 32 hex chars + ".gif"
    assert_eq!(result.path.len(), "images/".len() + 32 + ".gif".len());
    assert!(store.get(&result.path).is_some());
}

#[tokio::test]
async fn test_custom_domain_replaces_endpoint_in_urls() {
    let staging = TempDir::new().unwrap();
    let config = StorageConfig {
        custom_domain: Some("cdn.example.com".to_string()),
        ..test_config(staging.path().into())
    };
    let store = Arc::new(MemoryObjectStore::default());
    let (gateway, _, _) = gateway_with(config, store, VENDOR_HOST);

    let result = gateway
        .upload(b"a".to_vec(), UploadRequest::new("a.png").with_path("images/a.png"))
        .await
        .unwrap();
    assert_eq!(result.url, "https://cdn.example.com/images/a.png");
}

#[tokio::test]
async fn test_progress_upload_emits_full_sequence() {
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::default());
    let (gateway, _, _) = gateway_with(test_config(staging.path().into()), store.clone(), VENDOR_HOST);
    let publisher = Arc::new(RecordingPublisher::default());

    // 250 bytes read back in 100-byte chunks
    let payload = vec![7u8; 250];
    let mut reporter = gateway
        .start_progress(publisher.clone(), "big.bin", "alice")
        .await;
    let result = gateway
        .upload_with_progress(
            &payload[..],
            UploadRequest::new("big.bin").with_path("files/big.bin"),
            &mut reporter,
        )
        .await
        .unwrap();

    assert_eq!(result.size, 250);
    assert_eq!(store.get("files/big.bin").unwrap(), payload);
    assert_eq!(
        publisher.statuses(),
        vec![
            TransferState::Started,
            TransferState::Initiated,
            TransferState::InProgress,
            TransferState::InProgress,
            TransferState::InProgress,
            TransferState::Completed,
        ]
    );

    let events = publisher.events();
    let transfer_id = reporter.transfer_id().to_string();
    assert!(events.iter().all(|e| e.transfer_id == transfer_id));
    assert_eq!(events[1].total_bytes, 250);
    assert_eq!(events[2].bytes_transferred, 100);
    assert_eq!(events[4].percentage, 100.0);
    assert_eq!(events[5].bytes_transferred, 250);

    let topics: Vec<String> = publisher
        .events
        .lock()
        .unwrap()
        .iter()
        .map(|(t, _)| t.clone())
        .collect();
    assert!(topics.iter().all(|t| t == "/topic/upload-progress/alice"));
}

#[tokio::test]
async fn test_network_failure_emits_exactly_one_failed_event() {
    let staging = TempDir::new().unwrap();
    let (gateway, _, _) = gateway_with(
        test_config(staging.path().into()),
        Arc::new(FailingObjectStore),
        VENDOR_HOST,
    );
    let publisher = Arc::new(RecordingPublisher::default());

    let mut reporter = gateway
        .start_progress(publisher.clone(), "a.png", "bob")
        .await;
    let err = gateway
        .upload_with_progress(
            &b"0123456789"[..],
            UploadRequest::new("a.png").with_path("images/a.png"),
            &mut reporter,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UploadTransport(_)));

    // A late completion attempt must not produce a COMPLETED event
    assert!(!reporter.complete().await);

    let events = publisher.events();
    let failed: Vec<_> = events
        .iter()
        .filter(|e| e.status == TransferState::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(!failed[0].error_message.as_deref().unwrap_or("").is_empty());
    assert!(events.iter().all(|e| e.status != TransferState::Completed));
    assert_eq!(reporter.state(), TransferState::Failed);
}

#[tokio::test]
async fn test_credential_failure_fails_reporter() {
    let staging = TempDir::new().unwrap();
    let gateway = rust_blog_storage::StorageGateway::new(
        test_config(staging.path().into()),
        Arc::new(RefusingCredentialSource),
        Arc::new(StaticConnector::new(Arc::new(MemoryObjectStore::default()))),
    );
    let publisher = Arc::new(RecordingPublisher::default());

    let mut reporter = gateway
        .start_progress(publisher.clone(), "a.png", "carol")
        .await;
    let err = gateway
        .upload_with_progress(&b"abc"[..], UploadRequest::new("a.png"), &mut reporter)
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::CredentialIssuance(_)));
    assert_eq!(
        publisher.statuses().last().copied(),
        Some(TransferState::Failed)
    );
    assert!(matches!(
        gateway.delete("images/a.png").await,
        Err(StorageError::CredentialIssuance(_))
    ));
}

#[tokio::test]
async fn test_staging_files_are_removed_on_every_exit_path() {
    let staging = TempDir::new().unwrap();

    // 1. Success
    let (gateway, _, _) = gateway_with(
        test_config(staging.path().into()),
        Arc::new(MemoryObjectStore::default()),
        VENDOR_HOST,
    );
    let mut reporter = gateway
        .start_progress(Arc::new(RecordingPublisher::default()), "ok.png", "u")
        .await;
    gateway
        .upload_with_progress(&b"ok"[..], UploadRequest::new("ok.png"), &mut reporter)
        .await
        .unwrap();
    assert!(staged_files(staging.path()).is_empty());

    // 2. Failure after staging
    let (gateway, _, _) = gateway_with(
        test_config(staging.path().into()),
        Arc::new(FailingObjectStore),
        VENDOR_HOST,
    );
    let mut reporter = gateway
        .start_progress(Arc::new(RecordingPublisher::default()), "bad.png", "u")
        .await;
    let _ = gateway
        .upload_with_progress(&b"bad"[..], UploadRequest::new("bad.png"), &mut reporter)
        .await;
    assert!(staged_files(staging.path()).is_empty());
}

#[tokio::test]
async fn test_publisher_failures_do_not_fail_the_transfer() {
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::default());
    let (gateway, _, _) = gateway_with(test_config(staging.path().into()), store.clone(), VENDOR_HOST);

    let mut reporter = gateway
        .start_progress(Arc::new(FailingPublisher), "a.png", "dave")
        .await;
    let result = gateway
        .upload_with_progress(
            &b"payload"[..],
            UploadRequest::new("a.png").with_path("images/a.png"),
            &mut reporter,
        )
        .await
        .unwrap();

    assert_eq!(result.size, 7);
    assert_eq!(reporter.state(), TransferState::Completed);
}

#[tokio::test]
async fn test_empty_payload_completes() {
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::default());
    let (gateway, _, _) = gateway_with(test_config(staging.path().into()), store.clone(), VENDOR_HOST);
    let publisher = Arc::new(RecordingPublisher::default());

    let mut reporter = gateway
        .start_progress(publisher.clone(), "empty.txt", "erin")
        .await;
    let result = gateway
        .upload_with_progress(&b""[..], UploadRequest::new("empty.txt"), &mut reporter)
        .await
        .unwrap();

    assert_eq!(result.size, 0);
    assert_eq!(
        publisher.statuses(),
        vec![
            TransferState::Started,
            TransferState::Initiated,
            TransferState::Completed
        ]
    );
}

#[tokio::test]
async fn test_upload_target_carries_credential_and_writer() {
    let staging = TempDir::new().unwrap();
    let config = StorageConfig {
        upload_url: Some("https://upload.example.com/".to_string()),
        ..test_config(staging.path().into())
    };
    let store = Arc::new(MemoryObjectStore::default());
    let (gateway, credentials, _) = gateway_with(config, store.clone(), VENDOR_HOST);

    let target = gateway
        .issue_upload_target(Some("images/dog.jpg"), "dog.jpg")
        .await
        .unwrap();

    assert_eq!(target.upload_url, "https://upload.example.com");
    assert_eq!(target.url, "https://cos.ap-chengdu.myqcloud.com/images/dog.jpg");
    assert_eq!(target.bucket, BUCKET_ID);
    assert_eq!(target.path, "images/dog.jpg");
    assert_eq!(target.file_name, "dog.jpg");
    assert_eq!(target.max_file_size, 10 * 1024 * 1024);
    assert_eq!(target.expires_at, target.credential.expires_at);
    assert_eq!(credentials.issued()[0].1, OperationKind::Write);

    // Serialized for the client without the writer
    let json = serde_json::to_value(&target).unwrap();
    assert_eq!(json["uploadUrl"], "https://upload.example.com");
    assert_eq!(json["fileName"], "dog.jpg");
    assert_eq!(json["credential"]["sessionToken"], "TOKEN");
    assert!(json.get("writer").is_none());

    // The writer is bound to the issued path
    assert_eq!(target.writer.key(), "images/dog.jpg");
    target.writer.write(b"woof".to_vec()).await.unwrap();
    assert_eq!(store.get("images/dog.jpg").unwrap(), b"woof");
}

#[tokio::test]
async fn test_wildcard_paths_are_rejected_before_any_request() {
    let staging = TempDir::new().unwrap();
    let (gateway, credentials, _) = gateway_with(
        test_config(staging.path().into()),
        Arc::new(MemoryObjectStore::default()),
        VENDOR_HOST,
    );

    assert!(matches!(
        gateway.delete("images/*").await,
        Err(StorageError::InvalidPath(_))
    ));
    assert!(matches!(
        gateway
            .upload(b"x".to_vec(), UploadRequest::new("x").with_path("*"))
            .await,
        Err(StorageError::InvalidPath(_))
    ));
    assert!(credentials.issued().is_empty());
}

#[tokio::test]
async fn test_store_calls_that_never_answer_are_cut_off() {
    let staging = TempDir::new().unwrap();
    let config = StorageConfig {
        transfer_timeout: Duration::from_millis(200),
        ..test_config(staging.path().into())
    };
    let (gateway, _, _) = gateway_with(config, Arc::new(HangingObjectStore), VENDOR_HOST);
    let started = Instant::now();

    // 1. Single-shot put
    let err = gateway
        .upload(b"x".to_vec(), UploadRequest::new("a.png").with_path("images/a.png"))
        .await
        .unwrap_err();
    match err {
        StorageError::UploadTransport(msg) => assert!(msg.contains("timed out")),
        other => panic!("unexpected: {:?}", other),
    }

    // 2. Progress put reports FAILED once
    let publisher = Arc::new(RecordingPublisher::default());
    let mut reporter = gateway
        .start_progress(publisher.clone(), "a.png", "frank")
        .await;
    let err = gateway
        .upload_with_progress(
            &b"0123456789"[..],
            UploadRequest::new("a.png").with_path("images/a.png"),
            &mut reporter,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UploadTransport(_)));
    let failed = publisher
        .statuses()
        .into_iter()
        .filter(|s| *s == TransferState::Failed)
        .count();
    assert_eq!(failed, 1);
    assert!(staged_files(staging.path()).is_empty());

    // 3. Batch delete
    assert!(matches!(
        gateway.delete("images/a.png").await,
        Err(StorageError::UploadTransport(_))
    ));

    // 4. Upload target writer
    let target = gateway
        .issue_upload_target(Some("images/b.png"), "b.png")
        .await
        .unwrap();
    assert!(matches!(
        target.writer.write(b"y".to_vec()).await,
        Err(StorageError::UploadTransport(_))
    ));

    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_finished_reporter_is_refused() {
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::default());
    let (gateway, credentials, _) =
        gateway_with(test_config(staging.path().into()), store.clone(), VENDOR_HOST);
    let publisher = Arc::new(RecordingPublisher::default());

    // 1. First transfer completes
    let mut reporter = gateway
        .start_progress(publisher.clone(), "a.png", "gina")
        .await;
    gateway
        .upload_with_progress(
            &b"first"[..],
            UploadRequest::new("a.png").with_path("images/a.png"),
            &mut reporter,
        )
        .await
        .unwrap();
    let events_before = publisher.events().len();

    // 2. Reusing the finished reporter writes nothing and emits nothing
    let err = gateway
        .upload_with_progress(
            &b"second"[..],
            UploadRequest::new("b.png").with_path("images/b.png"),
            &mut reporter,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::ReporterState(_)));
    assert!(store.get("images/b.png").is_none());
    assert_eq!(publisher.events().len(), events_before);
    assert_eq!(credentials.issued().len(), 1);
    assert_eq!(reporter.state(), TransferState::Completed);
}
