//! Face Detection Service
//!
//! Accepts batches of images, runs an external face detector on each distinct
//! image exactly once, and caches results by content fingerprint so repeated
//! uploads are served from the cache. Finished reports are recorded in a job
//! ledger and can be fetched later by job id.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
