use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::models::job::UploadedImage;
use crate::models::report::LedgerEntry;
use crate::models::response::DetectResponse;
use crate::routes::error::ApiError;

const IMAGE_FIELD: &str = "image_file";

/// POST /detect: Run face detection on one or more uploaded images.
pub async fn detect_faces(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<DetectResponse>, ApiError> {
    let images = read_images(multipart).await?;
    if images.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".to_string()));
    }

    metrics::counter!("detection_requests_total").increment(1);
    tracing::info!(images = images.len(), "Detection request received");

    let report = state.aggregator.run(images).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to submit detection jobs");
        ApiError::Internal(format!("Failed to process images: {}", e))
    })?;

    let entry = LedgerEntry::new(report);
    let ledger_error = match state.ledger.append(&entry).await {
        Ok(()) => None,
        Err(e) => {
            tracing::error!(job_id = %entry.job_id, error = %e, "Failed to record job in ledger");
            Some(e.to_string())
        }
    };

    tracing::info!(job_id = %entry.job_id, "Detection job completed");

    Ok(Json(DetectResponse {
        job_id: entry.job_id,
        result: entry.result,
        ledger_error,
    }))
}

/// Collect every `image_file` part of the form, in upload order.
async fn read_images(mut multipart: Multipart) -> Result<Vec<UploadedImage>, ApiError> {
    let mut images = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!(error = %e, "Malformed multipart form");
        upload_error(e, ApiError::BadRequest("Failed to parse multipart form".to_string()))
    })? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("image_{}", images.len() + 1));
        let data = field.bytes().await.map_err(|e| {
            tracing::error!(image = %name, error = %e, "Failed to read uploaded image");
            upload_error(e, ApiError::Internal(format!("Failed to read image file: {}", name)))
        })?;

        images.push(UploadedImage::new(name, data.to_vec()));
    }

    Ok(images)
}

/// Oversized uploads keep their 413; anything else maps to `fallback`.
fn upload_error(err: MultipartError, fallback: ApiError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        fallback
    }
}
