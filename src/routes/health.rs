use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub cache: ComponentHealth,
    pub workers: PoolHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct PoolHealth {
    pub status: String,
    pub workers: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
}

/// GET /health: cache store connectivity and worker pool status.
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let cache_check = match state.cache.health_check().await {
        Ok(_) => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Cache health check failed");
            ComponentHealth {
                status: "error".to_string(),
                latency_ms: None,
            }
        }
    };

    let settings = state.pool.settings();
    let queue_depth = state.pool.queue_depth();
    metrics::gauge!("detection_queue_depth").set(queue_depth as f64);
    let pool_status = if state.pool.is_running() { "ok" } else { "stopped" };
    let pool_check = PoolHealth {
        status: pool_status.to_string(),
        workers: settings.workers,
        queue_depth,
        queue_capacity: settings.queue_capacity,
    };

    let all_healthy = cache_check.status == "ok" && pool_check.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            cache: cache_check,
            workers: pool_check,
        },
    };

    (status_code, Json(response))
}
