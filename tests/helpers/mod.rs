//! Test helper utilities: fake detector, failing stores, in-process app.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use face_detect_cache::{
    app_state::AppState,
    models::detection::DetectionFields,
    models::report::LedgerEntry,
    routes,
    services::{
        aggregator::RequestAggregator,
        cache::{CacheError, MemoryResultCache, ResultCache},
        detector::{Detector, ExecutionError},
        fingerprint::Fingerprint,
        ledger::{JobLedger, LedgerError, MemoryJobLedger},
        pool::{PoolSettings, WorkerPool},
    },
};

const BOUNDARY: &str = "face-detect-test-boundary";

/// Detector that echoes the image bytes back and counts invocations.
/// Images whose bytes start with `corrupt` fail.
pub struct FakeDetector {
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<u8>>>,
    delay: Duration,
}

impl FakeDetector {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, bytes: &[u8]) -> usize {
        self.seen.lock().unwrap().iter().filter(|b| b.as_slice() == bytes).count()
    }
}

#[async_trait]
impl Detector for FakeDetector {
    async fn execute(&self, _image_name: &str, image_bytes: &[u8]) -> Result<DetectionFields, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(image_bytes.to_vec());
        tokio::time::sleep(self.delay).await;

        if image_bytes.starts_with(b"corrupt") {
            return Err(ExecutionError::NotAnObject);
        }
        let content = String::from_utf8_lossy(image_bytes).to_string();
        Ok(json!({
            "success": true,
            "content": content,
            "faces": [{"x": 0, "y": 0, "width": image_bytes.len(), "height": image_bytes.len()}]
        })
        .as_object()
        .cloned()
        .unwrap())
    }
}

/// Cache whose store is unreachable.
pub struct UnreachableCache;

#[async_trait]
impl ResultCache for UnreachableCache {
    async fn lookup(&self, _fingerprint: &Fingerprint) -> Result<Option<DetectionFields>, CacheError> {
        Err(unreachable_redis())
    }

    async fn store(&self, _fingerprint: &Fingerprint, _fields: &DetectionFields, _ttl: Duration) -> Result<(), CacheError> {
        Err(unreachable_redis())
    }

    async fn clear_all(&self) -> Result<(), CacheError> {
        Err(unreachable_redis())
    }

    async fn health_check(&self) -> Result<(), CacheError> {
        Err(unreachable_redis())
    }
}

fn unreachable_redis() -> CacheError {
    CacheError::Redis(redis::RedisError::from(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "connection refused",
    )))
}

/// Ledger that rejects every append.
pub struct UnavailableLedger;

#[async_trait]
impl JobLedger for UnavailableLedger {
    async fn append(&self, _entry: &LedgerEntry) -> Result<(), LedgerError> {
        Err(LedgerError::Redis(redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "ledger unavailable",
        ))))
    }

    async fn fetch(&self, _job_id: Uuid) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(None)
    }
}

/// The full pipeline wired to in-process stores.
pub struct TestApp {
    pub router: Router,
    pub detector: Arc<FakeDetector>,
    pub cache: Arc<dyn ResultCache>,
    pub ledger: Arc<dyn JobLedger>,
    pub pool: Arc<WorkerPool>,
    pub aggregator: RequestAggregator,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_stores(
            Arc::new(MemoryResultCache::new()),
            Arc::new(MemoryJobLedger::new()),
            Duration::from_millis(10),
        )
    }

    pub fn with_stores(cache: Arc<dyn ResultCache>, ledger: Arc<dyn JobLedger>, delay: Duration) -> Self {
        let detector = Arc::new(FakeDetector::new(delay));
        let pool = Arc::new(WorkerPool::start(
            detector.clone(),
            cache.clone(),
            PoolSettings {
                workers: 3,
                queue_capacity: 8,
                cache_ttl: Duration::from_secs(3600),
            },
        ));
        let aggregator = RequestAggregator::new(cache.clone(), pool.clone(), None);
        let state = AppState::new(cache.clone(), pool.clone(), ledger.clone(), aggregator.clone());
        let router = routes::api_router(state, 10 * 1024 * 1024);

        Self {
            router,
            detector,
            cache,
            ledger,
            pool,
            aggregator,
        }
    }

    /// POST /detect with the given (file name, bytes) parts.
    pub async fn detect(&self, files: &[(&str, &str)]) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/detect")
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(multipart_body(files, "image_file")))
            .unwrap();
        self.send(request).await
    }

    pub async fn send_empty(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = if body_bytes.is_empty() {
            json!({})
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(json!({}))
        };
        (status, json)
    }
}

/// Build a multipart/form-data body with one file part per entry.
pub fn multipart_body(files: &[(&str, &str)], field: &str) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, bytes) in files {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(bytes.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Assert the report counters agree with each other and with the faces list.
pub fn assert_consistent(result: &Value) {
    let total = result["totalImages"].as_u64().unwrap();
    let processed = result["processed"].as_u64().unwrap();
    let cached = result["cached"].as_u64().unwrap();
    let faces = result["faces"].as_array().unwrap().len() as u64;
    assert_eq!(total, processed + cached, "total != processed + cached: {result}");
    assert_eq!(total, faces, "total != len(faces): {result}");
}
