use std::sync::Arc;

use crate::services::{
    aggregator::RequestAggregator,
    cache::ResultCache,
    ledger::JobLedger,
    pool::WorkerPool,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn ResultCache>,
    pub pool: Arc<WorkerPool>,
    pub ledger: Arc<dyn JobLedger>,
    pub aggregator: RequestAggregator,
}

impl AppState {
    pub fn new(
        cache: Arc<dyn ResultCache>,
        pool: Arc<WorkerPool>,
        ledger: Arc<dyn JobLedger>,
        aggregator: RequestAggregator,
    ) -> Self {
        Self {
            cache,
            pool,
            ledger,
            aggregator,
        }
    }
}
