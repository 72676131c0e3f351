use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::models::job::{ExtractionJob, JobParseError, Stage};

/// One delivered message awaiting a terminal acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    payload: String,
}

impl Delivery {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn job(&self) -> Result<ExtractionJob, JobParseError> {
        ExtractionJob::from_payload(&self.payload)
    }
}

/// Why a delivery was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub stage: Stage,
    pub reason: String,
}

/// A durable source of jobs with at-least-once delivery.
///
/// Every delivery returned by `receive` must get exactly one `ack` or `reject`.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Take the next job, if any, without blocking.
    async fn receive(&self) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Negative acknowledgment. The delivery is never redelivered automatically.
    async fn reject(&self, delivery: &Delivery, rejection: &Rejection) -> Result<(), QueueError>;
}

/// Record kept for every rejected payload when dead-lettering is enabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetter {
    pub payload: String,
    pub stage: Stage,
    pub reason: String,
    pub worker_id: String,
    pub rejected_at: DateTime<Utc>,
}

/// Redis-backed reliable queue.
///
/// Producers `LPUSH` onto the queue list. A worker `RPOPLPUSH`es one payload
/// into its own processing list, so at most one job per worker is in flight
/// and a crash leaves it recoverable. Rejected payloads go to `<queue>:dead`.
pub struct JobQueue {
    client: redis::Client,
    queue_key: String,
    processing_key: String,
    dead_letter_key: Option<String>,
    worker_id: String,
}

impl JobQueue {
    pub fn new(
        redis_url: &str,
        queue_name: &str,
        worker_id: &str,
        dead_letter: bool,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            queue_key: queue_name.to_string(),
            processing_key: processing_key(queue_name, worker_id),
            dead_letter_key: dead_letter.then(|| dead_letter_key(queue_name)),
            worker_id: worker_id.to_string(),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }

    /// Enqueue an extraction job.
    pub async fn enqueue(&self, job: &ExtractionJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        self.enqueue_payload(&payload).await
    }

    pub async fn enqueue_payload(&self, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(&self.queue_key, payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Move anything left on this worker's processing list back onto the queue.
    ///
    /// Call once at startup, before consuming: those payloads were delivered
    /// to a previous run of this worker that never acknowledged them.
    pub async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let mut conn = self.connection().await?;
        let mut recovered = 0;
        loop {
            let moved: Option<String> = conn
                .rpoplpush(&self.processing_key, &self.queue_key)
                .await
                .map_err(QueueError::Redis)?;
            if moved.is_none() {
                return Ok(recovered);
            }
            recovered += 1;
        }
    }

    /// Oldest-first view of up to `limit` dead letters.
    pub async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, QueueError> {
        let Some(dead_key) = &self.dead_letter_key else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let raw: Vec<String> = conn
            .lrange(dead_key, -(limit as isize), -1)
            .await
            .map_err(QueueError::Redis)?;
        raw.iter()
            .rev()
            .map(|entry| serde_json::from_str(entry).map_err(QueueError::Serialize))
            .collect()
    }

    /// Push up to `limit` dead-lettered payloads back onto the queue, oldest first.
    pub async fn replay_dead_letters(&self, limit: usize) -> Result<usize, QueueError> {
        let Some(dead_key) = &self.dead_letter_key else {
            return Ok(0);
        };
        let mut conn = self.connection().await?;
        let mut replayed = 0;
        while replayed < limit {
            let entry: Option<String> = conn.rpop(dead_key, None).await.map_err(QueueError::Redis)?;
            let Some(entry) = entry else {
                break;
            };
            let payload = match serde_json::from_str::<DeadLetter>(&entry) {
                Ok(letter) => letter.payload,
                Err(_) => entry,
            };
            conn.lpush::<_, _, ()>(&self.queue_key, &payload)
                .await
                .map_err(QueueError::Redis)?;
            replayed += 1;
        }
        Ok(replayed)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Get the current queue depth (pending jobs).
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(&self.queue_key).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    fn dead_letter(&self, delivery: &Delivery, rejection: &Rejection) -> DeadLetter {
        DeadLetter {
            payload: delivery.payload().to_string(),
            stage: rejection.stage,
            reason: rejection.reason.clone(),
            worker_id: self.worker_id.clone(),
            rejected_at: Utc::now(),
        }
    }
}

#[async_trait]
impl JobSource for JobQueue {
    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn
            .rpoplpush(&self.queue_key, &self.processing_key)
            .await
            .map_err(QueueError::Redis)?;
        Ok(payload.map(Delivery::new))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(&self.processing_key, 1, delivery.payload())
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, rejection: &Rejection) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .lrem(&self.processing_key, 1, delivery.payload())
            .ignore();
        if let Some(dead_key) = &self.dead_letter_key {
            let letter = serde_json::to_string(&self.dead_letter(delivery, rejection))
                .map_err(QueueError::Serialize)?;
            pipe.lpush(dead_key, letter).ignore();
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

fn processing_key(queue_name: &str, worker_id: &str) -> String {
    format!("{}:processing:{}", queue_name, worker_id)
}

fn dead_letter_key(queue_name: &str) -> String {
    format!("{}:dead", queue_name)
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
