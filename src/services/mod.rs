pub mod aggregator;
pub mod audit;
pub mod cache;
pub mod detector;
pub mod fingerprint;
pub mod ledger;
pub mod pool;
