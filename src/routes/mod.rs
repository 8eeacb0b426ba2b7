pub mod cache;
pub mod detect;
pub mod error;
pub mod health;
pub mod jobs;
pub mod metrics;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::app_state::AppState;

/// Detection API routes with upload size limits applied.
pub fn api_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/detect", post(detect::detect_faces))
        .route("/clear-cache", post(cache::clear_cache))
        .route("/find-job/{job_id}", get(jobs::find_job))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
}
