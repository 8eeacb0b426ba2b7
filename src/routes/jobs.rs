use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::report::LedgerEntry;
use crate::routes::error::ApiError;

/// GET /find-job/{job_id}: Fetch the recorded report of a finished job.
pub async fn find_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<LedgerEntry>, ApiError> {
    let job_id = Uuid::parse_str(&job_id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid job id: {}", job_id)))?;

    match state.ledger.fetch(job_id).await {
        Ok(Some(entry)) => Ok(Json(entry)),
        Ok(None) => Err(ApiError::NotFound(format!("Job {} not found", job_id))),
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Failed to read job ledger");
            Err(ApiError::Internal("Failed to read job ledger".to_string()))
        }
    }
}
