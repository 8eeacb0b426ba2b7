//! Per-request aggregation of detection outcomes.
//!
//! Each call to [`RequestAggregator::run`] owns its report from start to
//! finish. Cache hits are resolved inline; misses go to the shared worker
//! pool and come back on per-job reply channels. A miss whose bytes are
//! already being detected for another request waits on that job instead of
//! submitting its own.

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::detection::DetectionOutcome;
use crate::models::job::{Job, UploadedImage};
use crate::models::report::RequestReport;
use crate::services::audit::AuditLog;
use crate::services::cache::ResultCache;
use crate::services::fingerprint::Fingerprint;
use crate::services::pool::{PoolError, WorkerPool};

/// Outcome of a submitted job, awaitable by every request that needs it.
/// Resolves to `None` if the pool dropped the job.
type PendingOutcome = Shared<BoxFuture<'static, Option<DetectionOutcome>>>;

type InFlight = Arc<Mutex<HashMap<Fingerprint, PendingOutcome>>>;

/// How the outcome for one upload position will be produced.
enum Slot {
    Ready(DetectionOutcome),
    /// Job submitted by this request.
    Pending(String, PendingOutcome),
    /// Job submitted by a concurrent request for the same bytes.
    Joined(String, PendingOutcome),
    /// Same bytes as an earlier position in this request.
    SameAs(String, usize),
}

/// Removes a submitted job from the in-flight map when its request finishes.
struct InFlightGuard {
    in_flight: InFlight,
    fingerprint: Fingerprint,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.fingerprint);
    }
}

#[derive(Clone)]
pub struct RequestAggregator {
    cache: Arc<dyn ResultCache>,
    pool: Arc<WorkerPool>,
    audit: Option<Arc<AuditLog>>,
    in_flight: InFlight,
}

impl RequestAggregator {
    pub fn new(cache: Arc<dyn ResultCache>, pool: Arc<WorkerPool>, audit: Option<Arc<AuditLog>>) -> Self {
        Self {
            cache,
            pool,
            audit,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Produce one outcome per image, in upload order, and freeze the report.
    ///
    /// Fails only when the worker pool refuses new jobs.
    pub async fn run(&self, images: Vec<UploadedImage>) -> Result<RequestReport, PoolError> {
        let mut first_seen: HashMap<Fingerprint, usize> = HashMap::new();
        let mut slots = Vec::with_capacity(images.len());
        let mut guards = Vec::new();

        for (position, image) in images.into_iter().enumerate() {
            let fingerprint = Fingerprint::of(&image.bytes);

            if let Some(&earlier) = first_seen.get(&fingerprint) {
                slots.push(Slot::SameAs(image.name, earlier));
                continue;
            }
            first_seen.insert(fingerprint, position);

            match self.lookup(&image.name, &fingerprint).await {
                Some(outcome) => slots.push(Slot::Ready(outcome)),
                None => {
                    let name = image.name.clone();
                    let (job, pending) = {
                        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                        if let Some(pending) = in_flight.get(&fingerprint) {
                            tracing::debug!(image = %name, fingerprint = %fingerprint, "Joining in-flight detection");
                            slots.push(Slot::Joined(name, pending.clone()));
                            continue;
                        }
                        let (job, rx) = Job::new(image.name, image.bytes, fingerprint);
                        let pending: PendingOutcome = rx.map(Result::ok).boxed().shared();
                        in_flight.insert(fingerprint, pending.clone());
                        (job, pending)
                    };
                    guards.push(InFlightGuard {
                        in_flight: self.in_flight.clone(),
                        fingerprint,
                    });
                    self.pool.submit(job).await?;
                    slots.push(Slot::Pending(name, pending));
                }
            }
        }

        let resolved = join_all(slots.into_iter().map(|slot| async move {
            match slot {
                Slot::Ready(outcome) => Ok(outcome),
                Slot::Pending(name, pending) => Ok(pending.await.unwrap_or_else(|| dropped_job(name))),
                Slot::Joined(name, pending) => Ok(match pending.await {
                    Some(outcome) => outcome.duplicate_for(&name),
                    None => dropped_job(name),
                }),
                Slot::SameAs(name, earlier) => Err((name, earlier)),
            }
        }))
        .await;
        drop(guards);

        let mut outcomes: Vec<DetectionOutcome> = Vec::with_capacity(resolved.len());
        for slot in resolved {
            let outcome = match slot {
                Ok(outcome) => outcome,
                Err((name, earlier)) => outcomes[earlier].duplicate_for(&name),
            };
            metrics::counter!("detection_images_total", "provenance" => outcome.result_type.to_string())
                .increment(1);
            self.record(&outcome).await;
            outcomes.push(outcome);
        }

        let report = RequestReport::from_outcomes(outcomes);
        tracing::info!(
            total = report.total_images,
            processed = report.processed,
            cached = report.cached,
            failed = report.failed,
            "Detection request aggregated"
        );
        Ok(report)
    }

    /// Number of distinct images currently being detected.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn lookup(&self, image_name: &str, fingerprint: &Fingerprint) -> Option<DetectionOutcome> {
        match self.cache.lookup(fingerprint).await {
            Ok(Some(fields)) => {
                tracing::debug!(image = %image_name, fingerprint = %fingerprint, "Cache hit");
                Some(DetectionOutcome::cached(image_name, fields))
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    image = %image_name,
                    fingerprint = %fingerprint,
                    error = %e,
                    "Cache lookup failed, treating as miss"
                );
                None
            }
        }
    }

    async fn record(&self, outcome: &DetectionOutcome) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.record(outcome).await {
                tracing::warn!(image = %outcome.image_name, error = %e, "Failed to write audit log");
            }
        }
    }
}

fn dropped_job(name: String) -> DetectionOutcome {
    tracing::error!(image = %name, "Worker pool dropped job without an outcome");
    DetectionOutcome::failed(name, "worker pool shut down before processing")
}
