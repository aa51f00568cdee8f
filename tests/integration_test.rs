use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Notify;

use hoist::{
    AbuseControl,
    AcceptPolicy,
    Caller,
    DenialReason,
    FileCandidate,
    FixedWindowLimiter,
    GatewayConfig,
    GatewayDecision,
    GatewayError,
    GatewayService,
    LocalGateway,
    MemoryObjectStore,
    ObjectKey,
    ObjectStore,
    PermissiveBotDetector,
    Rejection,
    RequestFingerprint,
    SessionEvent,
    StorageGateway,
    TaskSnapshot,
    UploadError,
    UploadPhase,
    UploadRequest,
    UploadSession,
    WriteCredential,
};
use hoist::session::PreviewRevoker;
use hoist::transfer::{ProgressFn, TransferEngine, TransferError};

/// Gateway stub:  counts calls, optionally denies credentials or fails
/// deletes.
struct MockGateway {
    credential_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    deny_credential: Option<DenialReason>,
    fail_delete: bool,
}

impl MockGateway {
    fn permissive() -> Self {
        Self {
            credential_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            deny_credential: None,
            fail_delete: false,
        }
    }

    fn denying(reason: DenialReason) -> Self {
        Self {
            deny_credential: Some(reason),
            ..Self::permissive()
        }
    }

    fn failing_deletes() -> Self {
        Self {
            fail_delete: true,
            ..Self::permissive()
        }
    }
}

#[async_trait::async_trait]
impl StorageGateway for MockGateway {
    async fn request_write_credential(
        &self,
        request: &UploadRequest,
    ) -> GatewayDecision<WriteCredential> {
        self.credential_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = self.deny_credential {
            return GatewayDecision::Denied(reason);
        }

        GatewayDecision::Granted(WriteCredential {
            presigned_url: format!("https://bucket.example.com/{}", request.filename),
            key: ObjectKey::generate(&request.filename),
            expires_at: Utc::now() + chrono::Duration::seconds(360),
        })
    }

    async fn delete_object(&self, _key: &ObjectKey) -> GatewayDecision<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_delete {
            return GatewayDecision::Failed(GatewayError::Storage(
                "backing store unavailable".to_string(),
            ));
        }

        GatewayDecision::Granted(())
    }
}

/// Transfer stub: replays a fixed progress sequence, optionally waiting on a
/// gate mid-transfer or failing at the end.
struct MockEngine {
    steps: Vec<u8>,
    calls: AtomicUsize,
    fail: bool,
    gate: Option<Arc<Notify>>,
}

impl MockEngine {
    fn with_steps(steps: Vec<u8>) -> Self {
        Self {
            steps,
            calls: AtomicUsize::new(0),
            fail: false,
            gate: None,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with_steps(vec![0, 25])
        }
    }

    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::with_steps(vec![0, 50, 100])
        }
    }
}

#[async_trait::async_trait]
impl TransferEngine for MockEngine {
    async fn transfer(
        &self,
        _source: &hoist::SourceHandle,
        _credential: &WriteCredential,
        progress: ProgressFn,
    ) -> Result<(), TransferError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        for step in &self.steps {
            progress(*step);
        }

        if self.fail {
            return Err(TransferError::status(500, "simulated transfer failure"));
        }

        Ok(())
    }
}

fn counting_revoker() -> (PreviewRevoker, Arc<AtomicUsize>) {
    let revocations = Arc::new(AtomicUsize::new(0));
    let revoker: PreviewRevoker = {
        let revocations = revocations.clone();
        Arc::new(move |_uri: &str| {
            revocations.fetch_add(1, Ordering::SeqCst);
        })
    };
    (revoker, revocations)
}

fn png_candidate(name: &str, size: usize) -> FileCandidate {
    FileCandidate::new(name, "image/png", Bytes::from(vec![0u8; size]))
}

fn drain_events(receiver: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

fn assert_empty(snapshot: &TaskSnapshot) {
    assert_eq!(snapshot.phase, UploadPhase::Empty);
    assert!(snapshot.key.is_none());
    assert!(snapshot.preview_uri.is_none());
    assert!(!snapshot.has_source);
    assert_eq!(snapshot.progress_percent, 0);
}

#[tokio::test]
async fn upload_pipeline_reaches_uploaded_with_key() {
    let gateway = Arc::new(MockGateway::permissive());
    let engine = Arc::new(MockEngine::with_steps(vec![0, 50, 100]));
    let session = UploadSession::new(gateway.clone(), engine, Default::default());

    let mut events = session.subscribe_events();

    session
        .select_file(png_candidate("photo.png", 2 * 1024 * 1024))
        .await
        .unwrap();

    let snapshot = session.snapshot();
    assert_eq!(snapshot.phase, UploadPhase::Uploaded);
    assert_eq!(snapshot.progress_percent, 100);
    assert!(snapshot.key.is_some());
    // The local bytes are released once the object is stored.
    assert!(!snapshot.has_source);
    assert!(snapshot.preview_uri.unwrap().starts_with("mem://"));
    assert_eq!(gateway.credential_calls.load(Ordering::SeqCst), 1);

    let events = drain_events(&mut events);
    let progress: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Progress { percent } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![50, 100]);
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(events
        .iter()
        .any(|event| matches!(event, SessionEvent::Uploaded { .. })));
}

#[tokio::test]
async fn oversize_selection_is_rejected_without_mutation() {
    let gateway = Arc::new(MockGateway::permissive());
    let engine = Arc::new(MockEngine::with_steps(vec![100]));
    let session = UploadSession::new(gateway.clone(), engine, Default::default());

    let result = session
        .select_file(png_candidate("huge.png", 10 * 1024 * 1024))
        .await;

    assert!(matches!(
        result,
        Err(UploadError::Rejected(Rejection::SizeExceeded { .. }))
    ));
    assert_empty(&session.snapshot());
    // Rejections never reach the network.
    assert_eq!(gateway.credential_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn too_many_files_is_rejected_without_mutation() {
    let gateway = Arc::new(MockGateway::permissive());
    let engine = Arc::new(MockEngine::with_steps(vec![100]));
    let session = UploadSession::new(gateway.clone(), engine, Default::default());

    let result = session
        .select_files(vec![png_candidate("a.png", 10), png_candidate("b.png", 10)])
        .await;

    assert!(matches!(
        result,
        Err(UploadError::Rejected(Rejection::TooManyFiles { count: 2 }))
    ));
    assert_empty(&session.snapshot());
    assert_eq!(gateway.credential_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn batch_selection_uploads_every_candidate_in_order() {
    let gateway = Arc::new(MockGateway::permissive());
    let engine = Arc::new(MockEngine::with_steps(vec![100]));
    let (revoker, revocations) = counting_revoker();
    let policy = AcceptPolicy {
        max_files: 2,
        ..Default::default()
    };
    let session =
        UploadSession::new(gateway.clone(), engine, policy).with_preview_revoker(revoker);

    session
        .select_files(vec![
            png_candidate("first.png", 1024),
            png_candidate("second.png", 1024),
        ])
        .await
        .unwrap();

    // Both candidates were uploaded; the slot ends on the last one.
    assert_eq!(gateway.credential_calls.load(Ordering::SeqCst), 2);
    assert_eq!(revocations.load(Ordering::SeqCst), 1);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.phase, UploadPhase::Uploaded);
    assert_eq!(snapshot.file_name.as_deref(), Some("second.png"));
}

#[tokio::test]
async fn denied_credential_errors_without_transfer() {
    let gateway = Arc::new(MockGateway::denying(DenialReason::RateLimited));
    let engine = Arc::new(MockEngine::with_steps(vec![0, 50, 100]));
    let session = UploadSession::new(gateway, engine.clone(), Default::default());

    let result = session.select_file(png_candidate("photo.png", 1024)).await;

    assert!(matches!(
        result,
        Err(UploadError::Denied(DenialReason::RateLimited))
    ));
    let snapshot = session.snapshot();
    assert_eq!(snapshot.phase, UploadPhase::Errored);
    assert_eq!(snapshot.progress_percent, 0);
    assert!(snapshot.key.is_none());
    // No credential, no transfer.
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_transfer_errors_with_progress_cleared() {
    let gateway = Arc::new(MockGateway::permissive());
    let engine = Arc::new(MockEngine::failing());
    let session = UploadSession::new(gateway, engine, Default::default());

    let result = session.select_file(png_candidate("photo.png", 1024)).await;

    assert!(matches!(result, Err(UploadError::Transfer(_))));
    let snapshot = session.snapshot();
    assert_eq!(snapshot.phase, UploadPhase::Errored);
    assert_eq!(snapshot.progress_percent, 0);
    assert!(snapshot.key.is_none());
    assert!(snapshot.error.is_some());
}

#[tokio::test]
async fn remove_deletes_object_and_resets_slot() {
    let gateway = Arc::new(MockGateway::permissive());
    let engine = Arc::new(MockEngine::with_steps(vec![100]));
    let (revoker, revocations) = counting_revoker();
    let session = UploadSession::new(gateway.clone(), engine, Default::default())
        .with_preview_revoker(revoker);

    session
        .select_file(png_candidate("photo.png", 1024))
        .await
        .unwrap();
    assert_eq!(revocations.load(Ordering::SeqCst), 0);

    session.remove_current_file().await.unwrap();

    assert_empty(&session.snapshot());
    assert_eq!(gateway.delete_calls.load(Ordering::SeqCst), 1);
    // Resetting the slot released the local preview.
    assert_eq!(revocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn remove_is_idempotent() {
    let gateway = Arc::new(MockGateway::permissive());
    let engine = Arc::new(MockEngine::with_steps(vec![100]));
    let session = UploadSession::new(gateway.clone(), engine, Default::default());

    // Nothing uploaded: removal is a no-op with no network call.
    session.remove_current_file().await.unwrap();
    assert_eq!(gateway.delete_calls.load(Ordering::SeqCst), 0);

    session
        .select_file(png_candidate("photo.png", 1024))
        .await
        .unwrap();

    session.remove_current_file().await.unwrap();
    session.remove_current_file().await.unwrap();
    assert_eq!(gateway.delete_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_delete_errors_but_retains_key() {
    let gateway = Arc::new(MockGateway::failing_deletes());
    let engine = Arc::new(MockEngine::with_steps(vec![100]));
    let session = UploadSession::new(gateway.clone(), engine, Default::default());

    session
        .select_file(png_candidate("photo.png", 1024))
        .await
        .unwrap();
    let key = session.snapshot().key.unwrap();

    let result = session.remove_current_file().await;

    assert!(matches!(result, Err(UploadError::Gateway(_))));
    let snapshot = session.snapshot();
    assert_eq!(snapshot.phase, UploadPhase::Errored);
    // The key survives a failed delete so removal can be retried.
    assert_eq!(snapshot.key, Some(key));
}

#[tokio::test]
async fn superseding_selection_revokes_previous_preview_first() {
    let gateway = Arc::new(MockGateway::permissive());
    let engine = Arc::new(MockEngine::with_steps(vec![100]));
    let (revoker, revocations) = counting_revoker();
    let session = UploadSession::new(gateway, engine, Default::default())
        .with_preview_revoker(revoker);

    session
        .select_file(png_candidate("first.png", 1024))
        .await
        .unwrap();
    assert_eq!(revocations.load(Ordering::SeqCst), 0);

    session
        .select_file(png_candidate("second.png", 1024))
        .await
        .unwrap();

    assert_eq!(revocations.load(Ordering::SeqCst), 1);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.file_name.as_deref(), Some("second.png"));
    assert!(snapshot.preview_uri.unwrap().contains("second.png"));
}

#[tokio::test]
async fn selection_while_uploading_is_refused() {
    let gateway = Arc::new(MockGateway::permissive());
    let gate = Arc::new(Notify::new());
    let engine = Arc::new(MockEngine::gated(gate.clone()));
    let session = Arc::new(UploadSession::new(gateway, engine, Default::default()));

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.select_file(png_candidate("first.png", 1024)).await })
    };

    // Wait for the first selection to enter the transfer.
    while session.snapshot().phase != UploadPhase::Uploading {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = session.select_file(png_candidate("second.png", 1024)).await;
    assert!(matches!(
        second,
        Err(UploadError::Rejected(Rejection::TransferInFlight))
    ));

    gate.notify_one();
    first.await.unwrap().unwrap();

    let snapshot = session.snapshot();
    assert_eq!(snapshot.phase, UploadPhase::Uploaded);
    assert_eq!(snapshot.file_name.as_deref(), Some("first.png"));
}

#[tokio::test]
async fn existing_object_slot_can_be_removed() {
    let gateway = Arc::new(MockGateway::permissive());
    let engine = Arc::new(MockEngine::with_steps(vec![100]));
    let key = ObjectKey::parse("abc_banner.png").unwrap();
    let session = UploadSession::new(gateway.clone(), engine, Default::default())
        .with_existing_object(key.clone(), "https://cdn.example.com/abc_banner.png");

    let snapshot = session.snapshot();
    assert_eq!(snapshot.phase, UploadPhase::Uploaded);
    assert_eq!(snapshot.key, Some(key));
    assert!(snapshot.preview_uri.unwrap().starts_with("https://"));

    session.remove_current_file().await.unwrap();
    assert_empty(&session.snapshot());
    assert_eq!(gateway.delete_calls.load(Ordering::SeqCst), 1);
}

// ---- Gateway service ----

fn permissive_abuse() -> AbuseControl {
    AbuseControl::permissive()
}

fn browser_caller(identity: &str) -> Caller {
    Caller::new(identity, RequestFingerprint::with_user_agent("Mozilla/5.0"))
}

fn upload_request(filename: &str) -> UploadRequest {
    UploadRequest {
        filename: filename.to_string(),
        content_type: "image/png".to_string(),
        size: 1024,
    }
}

#[tokio::test]
async fn service_issues_credential_with_unique_key_and_expiry() {
    let store = Arc::new(MemoryObjectStore::new("uploads"));
    let service = GatewayService::new(store.clone(), permissive_abuse(), GatewayConfig::default());

    let before = Utc::now();
    let decision = service
        .issue_credential(&browser_caller("user-1"), &upload_request("photo.png"))
        .await;

    let credential = match decision {
        GatewayDecision::Granted(credential) => credential,
        other => panic!("expected Granted, got {:?}", other),
    };

    assert!(credential.key.as_str().ends_with("_photo.png"));
    assert!(credential.presigned_url.contains(credential.key.as_str()));
    // Minutes, not hours: default window is 360 seconds.
    let remaining = credential.expires_at - before;
    assert!(remaining > chrono::Duration::seconds(300));
    assert!(remaining <= chrono::Duration::seconds(400));

    assert!(store.contains(&credential.key));
    assert_eq!(
        store.object_meta(&credential.key),
        Some(("image/png".to_string(), 1024))
    );
}

#[tokio::test]
async fn service_fails_closed_on_bot_detection() {
    let store = Arc::new(MemoryObjectStore::new("uploads"));
    let service = GatewayService::new(store.clone(), AbuseControl::standard(), GatewayConfig::default());

    let caller = Caller::new("user-1", RequestFingerprint::with_user_agent("curl/8.5.0"));
    let decision = service
        .issue_credential(&caller, &upload_request("photo.png"))
        .await;

    assert!(matches!(decision, GatewayDecision::Denied(DenialReason::Bot)));
    // Denied means denied: no credential was registered.
    assert!(store.is_empty());
}

#[tokio::test]
async fn service_rate_limits_after_window_budget() {
    let store = Arc::new(MemoryObjectStore::new("uploads"));
    let abuse = AbuseControl::new(
        Box::new(PermissiveBotDetector),
        FixedWindowLimiter::new(5, Duration::from_secs(60)),
    );
    let service = GatewayService::new(store, abuse, GatewayConfig::default());
    let caller = browser_caller("user-1");

    for _ in 0..5 {
        assert!(service
            .issue_credential(&caller, &upload_request("photo.png"))
            .await
            .is_granted());
    }

    let decision = service
        .issue_credential(&caller, &upload_request("photo.png"))
        .await;
    assert!(matches!(
        decision,
        GatewayDecision::Denied(DenialReason::RateLimited)
    ));
}

#[tokio::test]
async fn service_rejects_malformed_upload_request() {
    let store = Arc::new(MemoryObjectStore::new("uploads"));
    let service = GatewayService::new(store, permissive_abuse(), GatewayConfig::default());

    let mut request = upload_request("photo.png");
    request.filename = String::new();

    let decision = service
        .issue_credential(&browser_caller("user-1"), &request)
        .await;
    assert!(matches!(
        decision,
        GatewayDecision::Failed(GatewayError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn service_rejects_blank_delete_key() {
    let store = Arc::new(MemoryObjectStore::new("uploads"));
    let service = GatewayService::new(store, permissive_abuse(), GatewayConfig::default());

    let decision = service.delete_object(&browser_caller("user-1"), "  ").await;
    assert!(matches!(
        decision,
        GatewayDecision::Failed(GatewayError::InvalidRequest(_))
    ));
}

/// Store stub whose deletes always fail.
struct FailingStore;

#[async_trait::async_trait]
impl ObjectStore for FailingStore {
    async fn presign_put(
        &self,
        key: &ObjectKey,
        _content_type: &str,
        _content_length: u64,
        _expiry: Duration,
    ) -> Result<String, GatewayError> {
        Ok(format!("memory://failing/{}", key))
    }

    async fn delete(&self, _key: &ObjectKey) -> Result<(), GatewayError> {
        Err(GatewayError::Storage("disk on fire".to_string()))
    }
}

#[tokio::test]
async fn service_surfaces_backing_store_failure() {
    let service = GatewayService::new(
        Arc::new(FailingStore),
        permissive_abuse(),
        GatewayConfig::default(),
    );

    let decision = service
        .delete_object(&browser_caller("user-1"), "abc_photo.png")
        .await;
    assert!(matches!(
        decision,
        GatewayDecision::Failed(GatewayError::Storage(_))
    ));
}

#[tokio::test]
async fn local_gateway_runs_full_lifecycle_against_memory_store() {
    let store = Arc::new(MemoryObjectStore::new("uploads"));
    let service = Arc::new(GatewayService::new(
        store.clone(),
        permissive_abuse(),
        GatewayConfig::default(),
    ));
    let gateway = Arc::new(LocalGateway::new(service, browser_caller("admin-1")));
    let engine = Arc::new(MockEngine::with_steps(vec![0, 50, 100]));
    let session = UploadSession::new(gateway, engine, Default::default());

    session
        .select_file(png_candidate("banner.png", 2 * 1024 * 1024))
        .await
        .unwrap();

    let key = session.snapshot().key.unwrap();
    assert!(store.contains(&key));

    session.remove_current_file().await.unwrap();
    assert!(!store.contains(&key));
    assert_empty(&session.snapshot());
}
