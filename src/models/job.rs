use tokio::sync::oneshot;

use crate::models::detection::DetectionOutcome;
use crate::services::fingerprint::Fingerprint;

/// One image submitted to the worker pool after a cache miss.
///
/// The reply channel belongs to the request that enqueued the job, so the
/// outcome is delivered only to that request.
#[derive(Debug)]
pub struct Job {
    pub image_name: String,
    pub image_bytes: Vec<u8>,
    pub fingerprint: Fingerprint,
    pub reply: oneshot::Sender<DetectionOutcome>,
}

impl Job {
    pub fn new(
        image_name: String,
        image_bytes: Vec<u8>,
        fingerprint: Fingerprint,
    ) -> (Self, oneshot::Receiver<DetectionOutcome>) {
        let (reply, rx) = oneshot::channel();
        let job = Self {
            image_name,
            image_bytes,
            fingerprint,
            reply,
        };
        (job, rx)
    }
}

/// An image read from an upload, before fingerprinting.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}
