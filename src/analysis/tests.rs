use super::*;
use crate::config::{AnalysisConfig, PolyscanConfig};
use crate::error::AnalysisError;
use async_trait::async_trait;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

#[derive(Debug, Clone)]
struct ReceivedField {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    len: usize,
}

#[derive(Default)]
struct Backend {
    uploads: Mutex<Vec<Vec<ReceivedField>>>,
    flaky_calls: AtomicUsize,
}

fn contaminated() -> serde_json::Value {
    json!({
        "status": "Contaminated",
        "detections": 12,
        "confidence": "0.94",
        "color": "danger",
        "timestamp": 1700000000,
        "image_url": "/r/1.png"
    })
}

async fn record_upload(backend: &Backend, mut multipart: Multipart) {
    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.unwrap();
        fields.push(ReceivedField {
            name,
            file_name,
            content_type,
            len: data.len(),
        });
    }
    backend.uploads.lock().unwrap().push(fields);
}

async fn upload(
    State(backend): State<Arc<Backend>>,
    multipart: Multipart,
) -> Json<serde_json::Value> {
    record_upload(&backend, multipart).await;
    Json(contaminated())
}

async fn broken_upload(State(backend): State<Arc<Backend>>, multipart: Multipart) -> Response {
    record_upload(&backend, multipart).await;
    let body = Json(json!({"error": "YOLO model not loaded"}));
    (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
}

async fn flaky_upload(State(backend): State<Arc<Backend>>, multipart: Multipart) -> Response {
    record_upload(&backend, multipart).await;
    if backend.flaky_calls.fetch_add(1, Ordering::SeqCst) == 0 {
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    } else {
        Json(contaminated()).into_response()
    }
}

async fn garbage_upload(State(backend): State<Arc<Backend>>, multipart: Multipart) -> &'static str {
    record_upload(&backend, multipart).await;
    "<html>not json</html>"
}

async fn history() -> Json<serde_json::Value> {
    Json(json!([
        {
            "status": "Microplastics Detected",
            "detections": 4,
            "confidence": 0.61,
            "color": "danger",
            "timestamp": 1700000100,
            "image_url": "/api/static/result_b.jpg",
            "engine": "YOLOv8 + CNN"
        },
        {
            "status": "Clean Water",
            "detections": 0,
            "confidence": 0.0,
            "color": "safe",
            "timestamp": 1700000000,
            "image_url": "/api/static/result_a.jpg",
            "date": "14/11/2023",
            "time": "22:13"
        }
    ]))
}

async fn start_backend() -> (SocketAddr, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let router = Router::new()
        .route("/upload", post(upload))
        .route("/broken", post(broken_upload))
        .route("/flaky", post(flaky_upload))
        .route("/garbage", post(garbage_upload))
        .route("/api/history", get(history))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, backend)
}

fn client_for(addr: SocketAddr, upload_path: &str) -> HttpAnalysisClient {
    let config = AnalysisConfig {
        base_url: format!("http://{}", addr),
        upload_path: upload_path.to_string(),
        timeout_seconds: 5,
        ..PolyscanConfig::default().analysis
    };
    HttpAnalysisClient::new(&config).unwrap()
}

fn sample_payload() -> ImagePayload {
    ImagePayload::new("sample.png", "image/png", Bytes::from_static(PNG_BYTES))
}

fn sample_result() -> AnalysisResult {
    serde_json::from_value(contaminated()).unwrap()
}

/// Client that answers without a network and counts its calls
struct ScriptedClient {
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn new(fail: bool) -> Self {
        Self {
            fail,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisClient for ScriptedClient {
    async fn submit(&self, payload: &ImagePayload) -> Result<AnalysisResult, AnalysisError> {
        assert!(!payload.is_empty());
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(AnalysisError::Status { status: 503 })
        } else {
            Ok(sample_result())
        }
    }

    async fn fetch_history(&self) -> Result<Vec<HistoryRecord>, AnalysisError> {
        Ok(Vec::new())
    }
}

#[test]
fn test_clear_from_idle_is_noop() {
    let mut pipeline = AnalysisRequestPipeline::new();
    assert!(!pipeline.clear());
    assert!(!pipeline.clear());
    assert_eq!(pipeline.state(), RequestState::Idle);
    assert!(pipeline.payload().is_none());
}

#[test]
fn test_select_and_clear() {
    let mut pipeline = AnalysisRequestPipeline::new();
    assert!(pipeline.select_file(sample_payload()));
    assert_eq!(pipeline.state(), RequestState::Selected);
    assert_eq!(pipeline.preview().unwrap().file_name(), "sample.png");

    assert!(pipeline.clear());
    assert_eq!(pipeline.state(), RequestState::Idle);
    assert!(pipeline.preview().is_none());
}

#[test]
fn test_empty_payload_is_not_selected() {
    let mut pipeline = AnalysisRequestPipeline::new();
    assert!(!pipeline.select_file(ImagePayload::new("empty.png", "image/png", Bytes::new())));
    assert_eq!(pipeline.state(), RequestState::Idle);
}

#[test]
fn test_submitting_ignores_further_input() {
    let mut pipeline = AnalysisRequestPipeline::new();
    pipeline.select_file(sample_payload());

    let payload = pipeline.begin_submit().unwrap();
    assert_eq!(payload.bytes().as_ref(), PNG_BYTES);
    assert_eq!(pipeline.state(), RequestState::Submitting);

    assert!(pipeline.begin_submit().is_none());
    assert!(!pipeline.select_file(ImagePayload::new(
        "other.png",
        "image/png",
        Bytes::from_static(PNG_BYTES)
    )));
    assert!(!pipeline.clear());
    assert_eq!(pipeline.state(), RequestState::Submitting);
    assert_eq!(pipeline.payload().unwrap().file_name(), "sample.png");
}

#[test]
fn test_completion_outside_submitting_is_ignored() {
    let mut pipeline = AnalysisRequestPipeline::new();
    assert!(pipeline.complete(Ok(sample_result())).is_none());
    assert_eq!(pipeline.state(), RequestState::Idle);
}

#[test]
fn test_complete_hands_result_to_caller() {
    let mut pipeline = AnalysisRequestPipeline::new();
    pipeline.select_file(sample_payload());
    pipeline.begin_submit().unwrap();

    let result = pipeline.complete(Ok(sample_result())).unwrap();
    assert_eq!(result, sample_result());
    assert_eq!(pipeline.state(), RequestState::Succeeded);

    // A second completion has nothing left to hand out
    assert!(pipeline.complete(Ok(sample_result())).is_none());
    assert_eq!(pipeline.state(), RequestState::Succeeded);
}

#[tokio::test]
async fn test_submit_without_payload_is_noop() {
    let client = ScriptedClient::new(false);
    let mut pipeline = AnalysisRequestPipeline::new();

    assert!(pipeline.submit(&client).await.is_none());
    assert_eq!(client.calls(), 0);
    assert_eq!(pipeline.state(), RequestState::Idle);
}

#[tokio::test]
async fn test_failure_allows_manual_retry() {
    let failing = ScriptedClient::new(true);
    let mut pipeline = AnalysisRequestPipeline::new();
    pipeline.select_file(sample_payload());

    assert!(pipeline.submit(&failing).await.is_none());
    assert_eq!(pipeline.state(), RequestState::Failed);
    assert_eq!(pipeline.error_message(), Some(FAILURE_MESSAGE));
    assert!(pipeline.can_submit());
    assert_eq!(failing.calls(), 1);

    let working = ScriptedClient::new(false);
    let result = pipeline.submit(&working).await.unwrap();
    assert_eq!(result.detections, 12);
    assert_eq!(pipeline.state(), RequestState::Succeeded);
    assert!(pipeline.error_message().is_none());
}

#[tokio::test]
async fn test_http_submit_success() {
    let (addr, backend) = start_backend().await;
    let client = client_for(addr, "/upload");
    let mut pipeline = AnalysisRequestPipeline::new();
    pipeline.select_file(sample_payload());

    let result = pipeline.submit(&client).await.unwrap();

    assert_eq!(pipeline.state(), RequestState::Succeeded);
    assert_eq!(result.status, "Contaminated");
    assert_eq!(result.detections, 12);
    assert_eq!(result.confidence_percent(), "94.0%");
    assert_eq!(result.severity, Severity::Danger);
    assert_eq!(result.timestamp, 1700000000);
    assert_eq!(result.image_url, format!("http://{}/r/1.png", addr));

    let uploads = backend.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].len(), 1);
    let field = &uploads[0][0];
    assert_eq!(field.name, UPLOAD_FIELD);
    assert_eq!(field.file_name.as_deref(), Some("sample.png"));
    assert_eq!(field.content_type.as_deref(), Some("image/png"));
    assert_eq!(field.len, PNG_BYTES.len());
}

#[tokio::test]
async fn test_http_submit_server_error() {
    let (addr, backend) = start_backend().await;
    let client = client_for(addr, "/broken");
    let mut pipeline = AnalysisRequestPipeline::new();
    pipeline.select_file(sample_payload());

    assert!(pipeline.submit(&client).await.is_none());
    assert_eq!(pipeline.state(), RequestState::Failed);
    assert_eq!(pipeline.error_message(), Some(FAILURE_MESSAGE));
    assert!(pipeline.can_submit());
    assert_eq!(backend.uploads.lock().unwrap().len(), 1);

    match client.submit(&sample_payload()).await {
        Err(AnalysisError::Status { status }) => assert_eq!(status, 500),
        other => panic!("Expected HTTP status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_manual_retry_after_failure() {
    let (addr, backend) = start_backend().await;
    let client = client_for(addr, "/flaky");
    let mut pipeline = AnalysisRequestPipeline::new();
    pipeline.select_file(sample_payload());

    assert!(pipeline.submit(&client).await.is_none());
    assert_eq!(pipeline.state(), RequestState::Failed);

    assert!(pipeline.submit(&client).await.is_some());
    assert_eq!(pipeline.state(), RequestState::Succeeded);
    assert_eq!(backend.uploads.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_http_malformed_body() {
    let (addr, _backend) = start_backend().await;
    let client = client_for(addr, "/garbage");

    match client.submit(&sample_payload()).await {
        Err(AnalysisError::MalformedBody { .. }) => {}
        other => panic!("Expected malformed body, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_unreachable_backend() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(addr, "/upload");
    let mut pipeline = AnalysisRequestPipeline::new();
    pipeline.select_file(sample_payload());

    assert!(pipeline.submit(&client).await.is_none());
    assert_eq!(pipeline.state(), RequestState::Failed);
    assert!(matches!(
        client.submit(&sample_payload()).await,
        Err(AnalysisError::Transport(_))
    ));
}

#[tokio::test]
async fn test_http_fetch_history() {
    let (addr, _backend) = start_backend().await;
    let client = client_for(addr, "/upload");

    let records = client.fetch_history().await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].result.engine.as_deref(), Some("YOLOv8 + CNN"));
    assert_eq!(
        records[0].result.image_url,
        format!("http://{}/api/static/result_b.jpg", addr)
    );
    assert_eq!(records[1].result.severity, Severity::Safe);
    assert_eq!(records[1].display_time(), "22:13");
}

#[test]
fn test_client_urls_from_config() {
    let client = HttpAnalysisClient::new(&PolyscanConfig::default().analysis).unwrap();
    assert_eq!(client.upload_url().as_str(), "http://127.0.0.1:5000/upload");
    assert_eq!(
        client.history_url().as_str(),
        "http://127.0.0.1:5000/api/history"
    );
    assert_eq!(
        client.resolve_image_url("/api/static/x.jpg"),
        "http://127.0.0.1:5000/api/static/x.jpg"
    );
    assert_eq!(
        client.resolve_image_url("https://cdn.example.com/x.jpg"),
        "https://cdn.example.com/x.jpg"
    );
}
