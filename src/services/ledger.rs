use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::report::LedgerEntry;

const JOB_KEY_PREFIX: &str = "face_detect:job:";
const STREAM_KEY: &str = "FaceDetectionStream";

/// Writes the job key and mirrors it onto the stream only if the key was new.
const APPEND_SCRIPT: &str = r#"
if redis.call('SET', KEYS[1], ARGV[2], 'NX') then
    redis.call('XADD', KEYS[2], '*', 'JobId', ARGV[1], 'Result', ARGV[2])
    return 1
end
return 0
"#;

/// Append-only record of finished reports, retrievable by job id.
#[async_trait]
pub trait JobLedger: Send + Sync {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError>;

    async fn fetch(&self, job_id: Uuid) -> Result<Option<LedgerEntry>, LedgerError>;
}

/// Redis ledger: a key per job for lookup, mirrored onto a stream as the log.
pub struct RedisJobLedger {
    conn: MultiplexedConnection,
    append_script: Script,
}

impl RedisJobLedger {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            append_script: Script::new(APPEND_SCRIPT),
        }
    }

    pub fn stream_key() -> &'static str {
        STREAM_KEY
    }

    fn job_key(job_id: Uuid) -> String {
        format!("{}{}", JOB_KEY_PREFIX, job_id)
    }
}

#[async_trait]
impl JobLedger for RedisJobLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(entry)?;
        let job_id = entry.job_id.to_string();

        let created: i32 = self
            .append_script
            .key(Self::job_key(entry.job_id))
            .key(STREAM_KEY)
            .arg(job_id)
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;

        if created == 0 {
            return Err(LedgerError::Duplicate(entry.job_id));
        }
        Ok(())
    }

    async fn fetch(&self, job_id: Uuid) -> Result<Option<LedgerEntry>, LedgerError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(Self::job_key(job_id)).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

/// In-process ledger.
#[derive(Default)]
pub struct MemoryJobLedger {
    entries: RwLock<HashMap<Uuid, LedgerEntry>>,
}

impl MemoryJobLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl JobLedger for MemoryJobLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.job_id) {
            return Err(LedgerError::Duplicate(entry.job_id));
        }
        entries.insert(entry.job_id, entry.clone());
        Ok(())
    }

    async fn fetch(&self, job_id: Uuid) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.entries.read().await.get(&job_id).cloned())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Job {0} is already recorded")]
    Duplicate(Uuid),
}
