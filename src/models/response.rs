use serde::Serialize;

use crate::models::report::RequestReport;

/// Response after a detection request completes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub job_id: uuid::Uuid,
    pub result: RequestReport,
    /// Set when the report could not be recorded in the job ledger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
