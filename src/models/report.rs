use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::detection::{DetectionOutcome, Provenance};

/// Aggregate of one detection request. Built once all outcomes are in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestReport {
    pub total_images: usize,
    pub processed: usize,
    pub cached: usize,
    /// Processed images whose detection failed; included in `processed`.
    pub failed: usize,
    pub faces: Vec<DetectionOutcome>,
}

impl RequestReport {
    pub fn from_outcomes(faces: Vec<DetectionOutcome>) -> Self {
        let mut report = Self {
            total_images: faces.len(),
            ..Self::default()
        };
        for outcome in &faces {
            match outcome.result_type {
                Provenance::Processed => report.processed += 1,
                Provenance::Cached => report.cached += 1,
            }
            if outcome.is_failed() {
                report.failed += 1;
            }
        }
        report.faces = faces;
        report
    }

    pub fn is_consistent(&self) -> bool {
        self.total_images == self.processed + self.cached
            && self.total_images == self.faces.len()
            && self.failed <= self.processed
    }
}

/// A finished report as recorded in the job ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub job_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub result: RequestReport,
}

impl LedgerEntry {
    pub fn new(result: RequestReport) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            created_at: Utc::now(),
            result,
        }
    }
}
