use axum::extract::State;
use axum::Json;

use crate::app_state::AppState;
use crate::models::response::MessageResponse;
use crate::routes::error::ApiError;

/// POST /clear-cache: Evict every cached detection result.
pub async fn clear_cache(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    state.cache.clear_all().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to clear result cache");
        ApiError::Internal("Failed to clear the result cache".to_string())
    })?;

    tracing::info!("Result cache cleared");
    Ok(Json(MessageResponse {
        message: "Result cache cleared successfully".to_string(),
    }))
}
