use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::models::detection::DetectionFields;
use crate::services::fingerprint::{Fingerprint, CACHE_KEY_PREFIX};

const SCAN_BATCH: usize = 500;

/// Cache-aside store of detection results keyed by content fingerprint.
///
/// Callers treat every error as a miss (lookup) or a no-op (store); only
/// `clear_all` reports failure to its caller.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<DetectionFields>, CacheError>;

    async fn store(
        &self,
        fingerprint: &Fingerprint,
        fields: &DetectionFields,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Evict every cached result. Keys outside the cache namespace are kept.
    async fn clear_all(&self) -> Result<(), CacheError>;

    /// Check store connectivity (for health checks).
    async fn health_check(&self) -> Result<(), CacheError>;
}

/// Redis-backed result cache.
pub struct RedisResultCache {
    conn: MultiplexedConnection,
}

impl RedisResultCache {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ResultCache for RedisResultCache {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<DetectionFields>, CacheError> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(fingerprint.cache_key()).await?;
        match cached {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn store(
        &self,
        fingerprint: &Fingerprint,
        fields: &DetectionFields,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(fields)?;
        conn.set_ex::<_, _, ()>(fingerprint.cache_key(), payload, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", CACHE_KEY_PREFIX);
        let mut cursor: u64 = 0;
        let mut evicted = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                evicted += keys.len();
                redis::cmd("UNLINK").arg(&keys).query_async::<()>(&mut conn).await?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(evicted, "Cache keys unlinked");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

/// In-process result cache with per-entry expiry.
#[derive(Default)]
pub struct MemoryResultCache {
    entries: RwLock<HashMap<Fingerprint, (DetectionFields, Instant)>>,
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<DetectionFields>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(fingerprint)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(fields, _)| fields.clone()))
    }

    async fn store(
        &self,
        fingerprint: &Fingerprint,
        fields: &DetectionFields,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(*fingerprint, (fields.clone(), now + ttl));
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), CacheError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn health_check(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cached value is not valid JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}
