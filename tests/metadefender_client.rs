//! End-to-end tests of the MetaDefender client and the orchestrator against
//! a fake MetaDefender API served on an ephemeral local port.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use cachescan::backends::{MetaDefenderClient, MetaDefenderConfig};
use cachescan::prelude::*;

const API_KEY: &str = "test-api-key";

#[derive(Default)]
struct FakeService {
    /// Verdict bodies keyed by SHA-256.
    known: Mutex<HashMap<String, Value>>,
    /// Hash of the file currently being scanned.
    pending: Mutex<Option<String>>,
    /// Progress values returned by successive status checks.
    progress: Mutex<VecDeque<Value>>,
    /// Uploaded files as (file name, bytes).
    uploads: Mutex<Vec<(Option<String>, Vec<u8>)>>,
    /// Status to fail uploads with.
    upload_failure: Mutex<Option<u16>>,
    lookups: AtomicU32,
    statuses: AtomicU32,
}

fn verdict_body(name: &str) -> Value {
    json!({
        "file_info": { "display_name": name },
        "process_info": { "result": "No Threat Detected" },
        "scan_results": {
            "scan_details": {
                "EngineX": { "threat_found": "", "scan_result_i": 0, "def_time": "2024-03-01T06:12:00.000Z" },
                "EngineY": { "threat_found": null, "scan_result_i": 0 }
            }
        }
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(API_KEY)
}

async fn lookup(
    State(state): State<Arc<FakeService>>,
    headers: HeaderMap,
    Path(hash): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid apikey").into_response();
    }
    state.lookups.fetch_add(1, Ordering::SeqCst);

    match state.known.lock().unwrap().get(&hash) {
        Some(body) => Json(body.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": 404003, "messages": ["The hash was not found"] } })),
        )
            .into_response(),
    }
}

async fn upload(
    State(state): State<Arc<FakeService>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid apikey").into_response();
    }
    if let Some(code) = *state.upload_failure.lock().unwrap() {
        let status = StatusCode::from_u16(code).unwrap();
        return (status, "upload rejected").into_response();
    }

    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.unwrap().to_vec();

        let hash = FileHasher::new().hash_bytes(&data).to_string();
        *state.pending.lock().unwrap() = Some(hash);
        state.uploads.lock().unwrap().push((file_name, data));
    }

    Json(json!({ "data_id": "d-1", "status": "inqueue" })).into_response()
}

async fn status(
    State(state): State<Arc<FakeService>>,
    headers: HeaderMap,
    Path(data_id): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid apikey").into_response();
    }
    if data_id != "d-1" {
        return (StatusCode::NOT_FOUND, "unknown data_id").into_response();
    }
    state.statuses.fetch_add(1, Ordering::SeqCst);

    let progress = {
        let mut queue = state.progress.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or(json!(100))
        }
    };

    let done = progress == json!(100) || progress == json!("100");
    if done {
        if let Some(hash) = state.pending.lock().unwrap().take() {
            let name = state
                .uploads
                .lock()
                .unwrap()
                .last()
                .and_then(|(name, _)| name.clone())
                .unwrap_or_default();
            state.known.lock().unwrap().insert(hash, verdict_body(&name));
        }
    }

    Json(json!({ "data_id": data_id, "scan_results": { "progress_percentage": progress } }))
        .into_response()
}

async fn spawn_service(state: Arc<FakeService>) -> String {
    let app = Router::new()
        .route("/v4/hash/:hash", get(lookup))
        .route("/v4/file", post(upload))
        .route("/v4/file/:data_id", get(status))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/v4")
}

fn client(base_url: &str, api_key: &str) -> MetaDefenderClient {
    let config = MetaDefenderConfig::new(api_key)
        .unwrap()
        .with_base_url(base_url)
        .with_timeout(Duration::from_secs(5));
    MetaDefenderClient::new(config).unwrap()
}

fn orchestrator(client: MetaDefenderClient) -> ScanOrchestrator {
    ScanOrchestrator::builder()
        .service(client)
        .with_config(
            OrchestratorConfig::new()
                .with_poll_interval(Duration::from_millis(5))
                .with_max_poll_time(Some(Duration::from_secs(10))),
        )
        .build()
        .unwrap()
}

fn sample_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::File::create(&path)
        .unwrap()
        .write_all(data)
        .unwrap();
    path
}

#[tokio::test]
async fn cached_verdict_is_returned_without_upload() {
    let state = Arc::new(FakeService::default());
    let dir = TempDir::new().unwrap();
    let data = b"already known to the service";
    let path = sample_file(&dir, "known.bin", data);

    let hash = FileHasher::new().hash_bytes(data).to_string();
    state
        .known
        .lock()
        .unwrap()
        .insert(hash, verdict_body("known.bin"));

    let base_url = spawn_service(state.clone()).await;
    let report = orchestrator(client(&base_url, API_KEY))
        .run(&path, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.cached);
    assert_eq!(report.verdict.filename, "known.bin");
    assert_eq!(state.lookups.load(Ordering::SeqCst), 1);
    assert!(state.uploads.lock().unwrap().is_empty());
    assert_eq!(state.statuses.load(Ordering::SeqCst), 0);

    let text = TextFormatter.render(&report.verdict);
    assert!(text.contains("Engine: EngineX\nThreat Found: Clean\n"));
    assert!(text.contains("Engine: EngineY\nThreat Found: Clean\n"));
}

#[tokio::test]
async fn unknown_file_is_uploaded_polled_and_looked_up_again() {
    let state = Arc::new(FakeService::default());
    state
        .progress
        .lock()
        .unwrap()
        .extend([json!(50), json!("100")]);

    let dir = TempDir::new().unwrap();
    let data = b"never seen before";
    let path = sample_file(&dir, "fresh.exe", data);

    let base_url = spawn_service(state.clone()).await;
    let report = orchestrator(client(&base_url, API_KEY))
        .run(&path, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.cached);
    assert_eq!(report.upload_handle, Some(UploadHandle::new("d-1")));
    assert_eq!(report.status_checks, 2);
    assert_eq!(report.verdict.filename, "fresh.exe");
    assert_eq!(state.lookups.load(Ordering::SeqCst), 2);
    assert_eq!(state.statuses.load(Ordering::SeqCst), 2);

    let uploads = state.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0.as_deref(), Some("fresh.exe"));
    assert_eq!(uploads[0].1, data.to_vec());
}

#[tokio::test]
async fn rejected_upload_stops_the_workflow() {
    let state = Arc::new(FakeService::default());
    *state.upload_failure.lock().unwrap() = Some(500);

    let dir = TempDir::new().unwrap();
    let path = sample_file(&dir, "rejected.bin", b"payload");

    let base_url = spawn_service(state.clone()).await;
    let err = orchestrator(client(&base_url, API_KEY))
        .run(&path, &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        ScanError::RemoteService {
            operation,
            subject,
            status,
            body,
        } => {
            assert_eq!(*operation, "upload");
            assert_eq!(subject, "rejected.bin");
            assert_eq!(*status, Some(500));
            assert!(body.contains("upload rejected"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(state.statuses.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wrong_api_key_is_a_remote_error() {
    let state = Arc::new(FakeService::default());
    let base_url = spawn_service(state.clone()).await;

    let fingerprint = FileHasher::new().hash_bytes(b"anything");
    let err = client(&base_url, "wrong-key")
        .lookup_by_hash(&fingerprint)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(err.subject(), Some(fingerprint.as_str()));
    assert!(!err.to_string().contains("wrong-key"));
}

#[tokio::test]
async fn status_accepts_string_and_number_progress() {
    let state = Arc::new(FakeService::default());
    state
        .progress
        .lock()
        .unwrap()
        .extend([json!("45"), json!(100)]);
    let base_url = spawn_service(state.clone()).await;

    let client = client(&base_url, API_KEY);
    let handle = UploadHandle::new("d-1");
    assert_eq!(client.fetch_status(&handle).await.unwrap().percent(), 45);
    assert!(client.fetch_status(&handle).await.unwrap().is_complete());

    let err = client
        .fetch_status(&UploadHandle::new("d-unknown"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn unreachable_service_is_a_remote_error_without_status() {
    // Bind and drop a listener to get a port nobody is listening on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let fingerprint = FileHasher::new().hash_bytes(b"offline");
    let err = client(&format!("http://{addr}/v4"), API_KEY)
        .lookup_by_hash(&fingerprint)
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::RemoteService { status: None, .. }));
}
