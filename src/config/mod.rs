use serde::Deserialize;
use std::time::Duration;

/// Which store backs the result cache and job ledger.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Redis host for the result cache and job ledger
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    #[serde(default = "default_cache_backend")]
    pub cache_backend: CacheBackend,

    /// Number of long-lived detection workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Bound of the shared job queue; submitters wait when it is full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Expiration of cached detection results, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Interpreter used to run the detection script
    #[serde(default = "default_detector_program")]
    pub detector_program: String,

    #[serde(default = "default_detector_script")]
    pub detector_script: String,

    #[serde(default = "default_detector_timeout_secs")]
    pub detector_timeout_secs: u64,

    /// Append-only JSON-lines file receiving every produced outcome
    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: String,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_cache_backend() -> CacheBackend {
    CacheBackend::Redis
}

fn default_worker_count() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_detector_program() -> String {
    "python".to_string()
}

fn default_detector_script() -> String {
    "scripts/face_detection_mediapipe.py".to_string()
}

fn default_detector_timeout_secs() -> u64 {
    60
}

fn default_audit_log_path() -> String {
    "results.txt".to_string()
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid("WORKER_COUNT must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("QUEUE_CAPACITY must be at least 1"));
        }
        Ok(())
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_secs(self.detector_timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
