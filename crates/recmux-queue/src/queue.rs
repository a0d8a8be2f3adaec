//! Job queue using Redis Streams, one stream per destination queue.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;

/// Queue for clear jobs and anything without a storage-specific home.
pub const DEFAULT_QUEUE: &str = "default";
/// Queue for recordings on the local filesystem backend.
pub const IO_LFS_QUEUE: &str = "io_lfs";
/// Queue for recordings on network backends.
pub const IO_NET_QUEUE: &str = "io_net";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_url: String,
    /// Streams are named `{stream_prefix}:{queue}`
    pub stream_prefix: String,
    pub consumer_group: String,
    pub dlq_stream_name: String,
    /// Max retries before DLQ
    pub max_retries: u32,
    /// Pending jobs idle longer than this are claimed by other workers
    pub visibility_timeout: Duration,
    pub dedup_ttl: Duration,
    /// Redis list buffering completion intents
    pub intent_buffer_key: String,
    pub status_key_prefix: String,
    pub status_ttl: Duration,
    /// Max jobs a destination queue may hold before the dispatcher waits
    pub received_threshold: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_prefix: "recmux:jobs".to_string(),
            consumer_group: "recmux:workers".to_string(),
            dlq_stream_name: "recmux:dlq".to_string(),
            max_retries: 3,
            visibility_timeout: Duration::from_secs(3600),
            dedup_ttl: Duration::from_secs(3600),
            intent_buffer_key: "recmux:intents".to_string(),
            status_key_prefix: "recmux:task:status".to_string(),
            status_ttl: Duration::from_secs(3 * 24 * 3600),
            received_threshold: 1,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(d.redis_url),
            stream_prefix: std::env::var("QUEUE_STREAM_PREFIX").unwrap_or(d.stream_prefix),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP").unwrap_or(d.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(d.dlq_stream_name),
            max_retries: env_or("QUEUE_MAX_RETRIES", d.max_retries),
            visibility_timeout: Duration::from_secs(env_or(
                "QUEUE_VISIBILITY_TIMEOUT",
                d.visibility_timeout.as_secs(),
            )),
            dedup_ttl: Duration::from_secs(env_or("QUEUE_DEDUP_TTL", d.dedup_ttl.as_secs())),
            intent_buffer_key: std::env::var("QUEUE_INTENT_BUFFER").unwrap_or(d.intent_buffer_key),
            status_key_prefix: std::env::var("QUEUE_STATUS_PREFIX").unwrap_or(d.status_key_prefix),
            status_ttl: Duration::from_secs(env_or("QUEUE_STATUS_TTL", d.status_ttl.as_secs())),
            received_threshold: env_or("QUEUE_RECEIVED_THRESHOLD", d.received_threshold),
        }
    }

    pub fn stream_name(&self, queue: &str) -> String {
        format!("{}:{}", self.stream_prefix, queue)
    }

    fn queue_from_stream<'a>(&self, stream: &'a str) -> &'a str {
        stream
            .strip_prefix(&self.stream_prefix)
            .and_then(|s| s.strip_prefix(':'))
            .unwrap_or(stream)
    }
}

/// A job read from a queue, with the stream coordinates needed to ack it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    pub message_id: String,
    pub job: QueueJob,
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub(crate) fn client(&self) -> &redis::Client {
        &self.client
    }

    /// Create the consumer group of every queue if missing.
    pub async fn init(&self, queues: &[String]) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        for queue in queues {
            let stream = self.config.stream_name(queue);
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&stream)
                .arg(&self.config.consumer_group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!("Created consumer group {} on {}", self.config.consumer_group, stream),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!("Consumer group already exists on {}", stream);
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    /// Append a job to `queue`.
    ///
    /// Rejected with [`QueueError::Duplicate`] while an identical job is
    /// still in flight.
    pub async fn enqueue(&self, queue: &str, job: &QueueJob) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;
        let idempotency_key = job.idempotency_key();
        let dedup_key = self.dedup_key(&idempotency_key);

        let fresh: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs().max(1))
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !fresh {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::Duplicate(idempotency_key));
        }

        let message_id: String = redis::cmd("XADD")
            .arg(self.config.stream_name(queue))
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await?;

        info!(
            queue = queue,
            job_id = %job.job_id(),
            message_id = %message_id,
            "Enqueued {} job for {}",
            job.kind(),
            job.key()
        );

        Ok(message_id)
    }

    fn dedup_key(&self, idempotency_key: &str) -> String {
        format!("{}:dedup:{}", self.config.stream_prefix, idempotency_key)
    }

    fn retry_key(&self, message_id: &str) -> String {
        format!("{}:retry:{}", self.config.stream_prefix, message_id)
    }

    /// Acknowledge a delivery and release its dedup key.
    pub async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.ack_raw(&delivery.queue, &delivery.message_id).await?;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(&[
            self.dedup_key(&delivery.job.idempotency_key()),
            self.retry_key(&delivery.message_id),
        ])
        .await?;
        Ok(())
    }

    async fn ack_raw(&self, queue: &str, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let stream = self.config.stream_name(queue);

        redis::cmd("XACK")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged {} on {}", message_id, queue);
        Ok(())
    }

    /// Move a delivery to the dead letter stream.
    pub async fn dlq(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(&delivery.job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("queue")
            .arg(&delivery.queue)
            .arg("original_id")
            .arg(&delivery.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(delivery).await?;

        warn!("Moved job {} to DLQ: {}", delivery.job.job_id(), error);
        Ok(())
    }

    /// Jobs currently held by `queue` (waiting or in flight).
    pub async fn queue_len(&self, queue: &str) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(self.config.stream_name(queue)).await?;
        Ok(len)
    }

    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Read new jobs from any of `queues`.
    pub async fn consume(
        &self,
        queues: &[String],
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        if queues.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS");
        for queue in queues {
            cmd.arg(self.config.stream_name(queue));
        }
        for _ in queues {
            cmd.arg(">");
        }

        let result: Option<redis::streams::StreamReadReply> = cmd.query_async(&mut conn).await?;

        let mut deliveries = Vec::new();
        for stream_key in result.map(|r| r.keys).unwrap_or_default() {
            let queue = self.config.queue_from_stream(&stream_key.key).to_string();
            for entry in stream_key.ids {
                if let Some(delivery) = self.parse_entry(&queue, entry.id, &entry.map).await {
                    deliveries.push(delivery);
                }
            }
        }

        Ok(deliveries)
    }

    /// Claim jobs on `queue` whose consumer has been idle too long.
    pub async fn claim_pending(
        &self,
        queue: &str,
        consumer_name: &str,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let stream = self.config.stream_name(queue);

        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;

        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        let min_idle_ms = self.config.visibility_timeout.as_millis() as u64;
        let idle: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if idle.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut claim = redis::cmd("XCLAIM");
        claim
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms);
        for pending_id in &idle.ids {
            claim.arg(&pending_id.id);
        }
        let result: redis::streams::StreamClaimReply = claim.query_async(&mut conn).await?;

        let mut deliveries = Vec::new();
        for entry in result.ids {
            if let Some(delivery) = self.parse_entry(queue, entry.id, &entry.map).await {
                info!("Claimed pending job {} on {}", delivery.job.job_id(), queue);
                deliveries.push(delivery);
            }
        }

        Ok(deliveries)
    }

    /// Decode a stream entry; malformed payloads are acked and dropped.
    async fn parse_entry(
        &self,
        queue: &str,
        message_id: String,
        map: &std::collections::HashMap<String, redis::Value>,
    ) -> Option<Delivery> {
        let payload = match map.get("job") {
            Some(redis::Value::BulkString(payload)) => String::from_utf8_lossy(payload).into_owned(),
            _ => {
                warn!("Stream entry {} on {} has no job field", message_id, queue);
                self.ack_raw(queue, &message_id).await.ok();
                return None;
            }
        };

        match serde_json::from_str::<QueueJob>(&payload) {
            Ok(job) => Some(Delivery {
                queue: queue.to_string(),
                message_id,
                job,
            }),
            Err(e) => {
                warn!("Failed to parse job payload on {}: {}", queue, e);
                self.ack_raw(queue, &message_id).await.ok();
                None
            }
        }
    }

    /// Increment and return the retry count of a delivery.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = self.retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_names() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name(IO_NET_QUEUE), "recmux:jobs:io_net");
        assert_eq!(config.queue_from_stream("recmux:jobs:io_lfs"), "io_lfs");
        assert_eq!(config.queue_from_stream("other"), "other");
    }

    #[test]
    fn test_status_ttl_is_three_days() {
        assert_eq!(QueueConfig::default().status_ttl.as_secs(), 259_200);
    }
}
