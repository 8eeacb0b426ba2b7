use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

/// Structured payload produced by the detection routine, e.g.
/// `{"success": true, "faces": [{"x": 10, "y": 12, "width": 40, "height": 40}]}`.
pub type DetectionFields = Map<String, Value>;

/// Where an outcome came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
pub enum Provenance {
    /// Freshly computed by a worker.
    Processed,
    /// Served from the result cache.
    Cached,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutcomeStatus {
    Ok,
    /// The detector could not produce a result; the payload is empty.
    Failed,
}

/// Detection result for one uploaded image, tagged with its name and provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionOutcome {
    pub image_name: String,
    pub result_type: Provenance,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub detection: DetectionFields,
}

impl DetectionOutcome {
    pub fn processed(image_name: impl Into<String>, detection: DetectionFields) -> Self {
        Self {
            image_name: image_name.into(),
            result_type: Provenance::Processed,
            status: OutcomeStatus::Ok,
            error: None,
            detection,
        }
    }

    pub fn cached(image_name: impl Into<String>, detection: DetectionFields) -> Self {
        Self {
            image_name: image_name.into(),
            result_type: Provenance::Cached,
            status: OutcomeStatus::Ok,
            error: None,
            detection,
        }
    }

    /// A processed outcome whose execution failed. Carries an empty payload.
    pub fn failed(image_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            result_type: Provenance::Processed,
            status: OutcomeStatus::Failed,
            error: Some(error.into()),
            detection: DetectionFields::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }

    /// Re-tag this outcome for another image of the same request with identical bytes.
    pub fn duplicate_for(&self, image_name: &str) -> Self {
        let mut outcome = self.clone();
        outcome.image_name = image_name.to_string();
        if !outcome.is_failed() {
            outcome.result_type = Provenance::Cached;
        }
        outcome
    }
}
