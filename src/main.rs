use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use face_detect_cache::{
    app_state::AppState,
    config::{AppConfig, CacheBackend},
    routes,
    services::{
        aggregator::RequestAggregator,
        audit::AuditLog,
        cache::{MemoryResultCache, RedisResultCache, ResultCache},
        detector::ScriptDetector,
        ledger::{JobLedger, MemoryJobLedger, RedisJobLedger},
        pool::{PoolSettings, WorkerPool},
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing face detection server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!(
        "detection_requests_total",
        "Total detection requests accepted"
    );
    metrics::describe_counter!(
        "detection_images_total",
        "Images answered, labelled by provenance (Processed or Cached)"
    );
    metrics::describe_counter!(
        "detection_failures_total",
        "Detector executions that failed"
    );
    metrics::describe_histogram!(
        "detection_execution_seconds",
        "Time spent running the detector on one image"
    );
    metrics::describe_gauge!(
        "detection_queue_depth",
        "Current number of jobs waiting in the worker queue"
    );

    // Result cache and job ledger
    let (cache, ledger): (Arc<dyn ResultCache>, Arc<dyn JobLedger>) = match config.cache_backend {
        CacheBackend::Redis => {
            tracing::info!(host = %config.redis_host, port = config.redis_port, "Connecting to Redis");
            let client = redis::Client::open(config.redis_url()).expect("Invalid Redis address");
            let conn = client
                .get_multiplexed_async_connection()
                .await
                .expect("Failed to connect to Redis");
            let cache = RedisResultCache::new(conn.clone());
            cache.health_check().await.expect("Redis did not answer PING");
            let cache: Arc<dyn ResultCache> = Arc::new(cache);
            let ledger: Arc<dyn JobLedger> = Arc::new(RedisJobLedger::new(conn));
            (cache, ledger)
        }
        CacheBackend::Memory => {
            tracing::warn!("Using in-memory result cache and job ledger");
            let cache: Arc<dyn ResultCache> = Arc::new(MemoryResultCache::new());
            let ledger: Arc<dyn JobLedger> = Arc::new(MemoryJobLedger::new());
            (cache, ledger)
        }
    };

    // Outcome audit trail
    let audit = AuditLog::open(&config.audit_log_path)
        .await
        .expect("Failed to open the audit log");
    tracing::info!(path = %config.audit_log_path, "Audit log opened");

    // Detection workers
    if !std::path::Path::new(&config.detector_script).is_file() {
        tracing::warn!(
            script = %config.detector_script,
            "Detector script not found; every detection will fail until DETECTOR_SCRIPT points at it"
        );
    }
    let detector = ScriptDetector::new(
        config.detector_program.clone(),
        config.detector_script.clone(),
        config.detector_timeout(),
    );
    let pool = Arc::new(WorkerPool::start(
        Arc::new(detector),
        cache.clone(),
        PoolSettings {
            workers: config.worker_count,
            queue_capacity: config.queue_capacity,
            cache_ttl: config.cache_ttl(),
        },
    ));

    let aggregator = RequestAggregator::new(cache.clone(), pool.clone(), Some(Arc::new(audit)));
    let state = AppState::new(cache, pool.clone(), ledger, aggregator);

    // Build API routes
    let app = routes::api_router(state, config.max_upload_bytes)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting face detection server on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    pool.shutdown().await;
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
