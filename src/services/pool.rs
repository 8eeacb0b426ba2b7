//! Fixed-size detection worker pool.
//!
//! Workers are started once and shared by every request. Jobs flow through a
//! bounded queue (submitters wait when it is full) and each outcome goes back
//! on the job's own reply channel, so concurrent requests never observe each
//! other's results.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::models::detection::DetectionOutcome;
use crate::models::job::Job;
use crate::services::cache::ResultCache;
use crate::services::detector::Detector;

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub cache_ttl: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 1000,
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

struct WorkerContext {
    detector: Arc<dyn Detector>,
    cache: Arc<dyn ResultCache>,
    cache_ttl: Duration,
}

pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    settings: PoolSettings,
}

impl WorkerPool {
    /// Spawn the workers. Must be called from within a tokio runtime.
    pub fn start(detector: Arc<dyn Detector>, cache: Arc<dyn ResultCache>, settings: PoolSettings) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let (shutdown, _) = watch::channel(false);

        let ctx = Arc::new(WorkerContext {
            detector,
            cache,
            cache_ttl: settings.cache_ttl,
        });

        let workers = (0..settings.workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    ctx.clone(),
                    receiver.clone(),
                    shutdown.subscribe(),
                ))
            })
            .collect();

        tracing::info!(
            workers = settings.workers,
            queue_capacity = settings.queue_capacity,
            "Detection worker pool started"
        );

        Self {
            sender,
            receiver,
            shutdown,
            workers: Mutex::new(workers),
            settings,
        }
    }

    /// Enqueue a job, waiting for queue space when the queue is full.
    pub async fn submit(&self, job: Job) -> Result<(), PoolError> {
        if *self.shutdown.borrow() {
            return Err(PoolError::Closed);
        }
        self.sender.send(job).await.map_err(|_| PoolError::Closed)?;
        metrics::gauge!("detection_queue_depth").set(self.queue_depth() as f64);
        Ok(())
    }

    /// Jobs waiting in the queue (not counting jobs being executed).
    pub fn queue_depth(&self) -> usize {
        self.settings.queue_capacity.max(1) - self.sender.capacity()
    }

    pub fn settings(&self) -> PoolSettings {
        self.settings
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
    }

    /// Stop accepting jobs, let the workers drain the queue, then wait for them.
    ///
    /// Jobs that slip in after the workers exit are dropped, which closes
    /// their reply channels.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        tracing::info!(pending = self.queue_depth(), "Draining detection worker pool");

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Detection worker terminated abnormally");
            }
        }

        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut dropped = 0usize;
        while receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::warn!(dropped, "Dropped jobs submitted during shutdown");
        }
        tracing::info!("Detection worker pool stopped");
    }
}

async fn worker_loop(
    id: usize,
    ctx: Arc<WorkerContext>,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!(worker = id, "Detection worker started");
    while let Some(job) = next_job(&queue, &mut shutdown).await {
        ctx.process(id, job).await;
    }
    tracing::debug!(worker = id, "Detection worker stopped");
}

/// Wait for the next job. After shutdown only already-queued jobs are returned.
async fn next_job(
    queue: &Mutex<mpsc::Receiver<Job>>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<Job> {
    let mut receiver = queue.lock().await;
    if *shutdown.borrow() {
        return receiver.try_recv().ok();
    }
    tokio::select! {
        job = receiver.recv() => job,
        _ = shutdown.changed() => receiver.try_recv().ok(),
    }
}

impl WorkerContext {
    async fn process(&self, worker: usize, job: Job) {
        let Job {
            image_name,
            image_bytes,
            fingerprint,
            reply,
        } = job;

        tracing::debug!(worker, image = %image_name, fingerprint = %fingerprint, "Running detection");
        let start = Instant::now();

        let execution = AssertUnwindSafe(self.detector.execute(&image_name, &image_bytes))
            .catch_unwind()
            .await;
        metrics::histogram!("detection_execution_seconds").record(start.elapsed().as_secs_f64());

        let outcome = match execution {
            Ok(Ok(fields)) => {
                if let Err(e) = self.cache.store(&fingerprint, &fields, self.cache_ttl).await {
                    tracing::warn!(
                        image = %image_name,
                        fingerprint = %fingerprint,
                        error = %e,
                        "Failed to cache detection result"
                    );
                }
                DetectionOutcome::processed(image_name, fields)
            }
            Ok(Err(e)) => {
                tracing::error!(worker, image = %image_name, error = %e, "Detection failed");
                metrics::counter!("detection_failures_total").increment(1);
                DetectionOutcome::failed(image_name, e.to_string())
            }
            Err(_) => {
                tracing::error!(worker, image = %image_name, "Detector panicked");
                metrics::counter!("detection_failures_total").increment(1);
                DetectionOutcome::failed(image_name, "detector panicked")
            }
        };

        if reply.send(outcome).is_err() {
            tracing::debug!(worker, fingerprint = %fingerprint, "Requester gone, discarding outcome");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Worker pool is shut down")]
    Closed,
}
