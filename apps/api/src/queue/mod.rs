//! Job queue between intake and the worker.
//!
//! Jobs are JSON documents on a Redis list: intake `LPUSH`es, workers `BRPOP`, so the oldest job
//! is taken first. There is no acknowledgement step; a job popped by a worker that then dies is
//! lost, and its record stays at whatever status it last reached.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Job encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Everything the worker needs to process one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub file_id: Uuid,
    /// Blob-store key of the uploaded PDF.
    pub file_key: String,
    pub job_description: String,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &AnalysisJob) -> Result<(), QueueError>;

    /// Waits up to `timeout` for the next job. `Ok(None)` means the wait timed out.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<AnalysisJob>, QueueError>;
}

pub struct RedisJobQueue {
    client: redis::Client,
    name: String,
    /// Lazily opened; dropped after an error so the next call reconnects.
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisJobQueue {
    pub fn new(client: redis::Client, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            connection: Mutex::new(None),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis queue '{}'", self.name);
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn reset_connection(&self) {
        *self.connection.lock().await = None;
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &AnalysisJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.connection().await?;

        let pushed: Result<i64, _> = redis::cmd("LPUSH")
            .arg(&self.name)
            .arg(payload)
            .query_async(&mut conn)
            .await;

        match pushed {
            Ok(depth) => {
                debug!("Enqueued job {} (queue depth {depth})", job.file_id);
                Ok(())
            }
            Err(e) => {
                self.reset_connection().await;
                Err(e.into())
            }
        }
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<AnalysisJob>, QueueError> {
        let mut conn = self.connection().await?;

        let popped: Result<Option<(String, String)>, _> = redis::cmd("BRPOP")
            .arg(&self.name)
            .arg(timeout.as_secs().max(1))
            .query_async(&mut conn)
            .await;

        let payload = match popped {
            Ok(Some((_list, payload))) => payload,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.reset_connection().await;
                return Err(e.into());
            }
        };

        Ok(decode_job(&payload))
    }
}

/// Parses a queued payload. Malformed payloads are logged and dropped.
fn decode_job(payload: &str) -> Option<AnalysisJob> {
    match serde_json::from_str(payload) {
        Ok(job) => Some(job),
        Err(e) => {
            warn!("Dropping malformed job payload ({e}): {payload}");
            None
        }
    }
}
