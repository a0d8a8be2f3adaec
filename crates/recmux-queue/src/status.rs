//! Per-recording task status, used to suppress duplicate transcodes.
//!
//! Entries move `PENDING -> SUCCESS | FAILURE` and expire after the
//! configured TTL. A PENDING or SUCCESS entry blocks another run of the same
//! recording; FAILURE allows a retry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use recmux_models::TaskStatus;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{QueueError, QueueResult};

#[async_trait]
pub trait TaskStatusStore: Send + Sync {
    async fn get(&self, task_key: &str) -> QueueResult<Option<TaskStatus>>;

    async fn exists(&self, task_key: &str) -> QueueResult<bool> {
        Ok(self.get(task_key).await?.is_some())
    }

    /// Create a PENDING entry; fails if any entry exists.
    async fn set_pending(&self, task_key: &str) -> QueueResult<()>;

    /// PENDING -> SUCCESS
    async fn set_success(&self, task_key: &str) -> QueueResult<()>;

    /// PENDING -> FAILURE
    async fn set_failure(&self, task_key: &str) -> QueueResult<()>;

    async fn delete(&self, task_key: &str) -> QueueResult<()>;

    /// Reason to skip a run of `task_key`, or `None` when it may proceed.
    async fn check(&self, task_key: &str) -> QueueResult<Option<String>> {
        Ok(match self.get(task_key).await? {
            Some(status) if !status.permits_retry() => Some(format!(
                "Task already {}: {}",
                status.as_str().to_lowercase(),
                task_key
            )),
            _ => None,
        })
    }
}

fn require_pending(task_key: &str, current: Option<TaskStatus>) -> QueueResult<()> {
    match current {
        Some(TaskStatus::Pending) => Ok(()),
        Some(other) => Err(QueueError::status_conflict(
            task_key,
            format!("expected PENDING, found {}", other),
        )),
        None => Err(QueueError::status_conflict(task_key, "no status entry")),
    }
}

/// Status entries as Redis strings under `{prefix}:{task_key}`.
pub struct RedisStatusRepository {
    client: redis::Client,
    prefix: String,
    ttl: Duration,
}

impl RedisStatusRepository {
    pub fn new(client: redis::Client, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            ttl,
        }
    }

    fn key(&self, task_key: &str) -> String {
        format!("{}:{}", self.prefix, task_key)
    }

    async fn transition(&self, task_key: &str, to: TaskStatus) -> QueueResult<()> {
        require_pending(task_key, self.get(task_key).await?)?;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let updated: Option<String> = redis::cmd("SET")
            .arg(self.key(task_key))
            .arg(to.as_str())
            .arg("XX")
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        if updated.is_none() {
            return Err(QueueError::status_conflict(task_key, "entry expired"));
        }
        debug!(task_key = task_key, status = %to, "Task status updated");
        Ok(())
    }
}

#[async_trait]
impl TaskStatusStore for RedisStatusRepository {
    async fn get(&self, task_key: &str) -> QueueResult<Option<TaskStatus>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key(task_key))
            .query_async(&mut conn)
            .await?;
        raw.map(|s| s.parse().map_err(QueueError::InvalidStatus))
            .transpose()
    }

    async fn set_pending(&self, task_key: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let created: Option<String> = redis::cmd("SET")
            .arg(self.key(task_key))
            .arg(TaskStatus::Pending.as_str())
            .arg("NX")
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        if created.is_none() {
            return Err(QueueError::status_conflict(task_key, "entry already exists"));
        }
        Ok(())
    }

    async fn set_success(&self, task_key: &str) -> QueueResult<()> {
        self.transition(task_key, TaskStatus::Success).await
    }

    async fn set_failure(&self, task_key: &str) -> QueueResult<()> {
        self.transition(task_key, TaskStatus::Failure).await
    }

    async fn delete(&self, task_key: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("DEL")
            .arg(self.key(task_key))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

/// Process-local store for tests and single-node runs.
pub struct InMemoryStatusStore {
    entries: Mutex<HashMap<String, (TaskStatus, Instant)>>,
    ttl: Duration,
}

impl InMemoryStatusStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }
}

impl Default for InMemoryStatusStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(3 * 24 * 3600))
    }
}

#[async_trait]
impl TaskStatusStore for InMemoryStatusStore {
    async fn get(&self, task_key: &str) -> QueueResult<Option<TaskStatus>> {
        let mut entries = self.entries.lock().await;
        match entries.get(task_key) {
            Some((_, expires)) if *expires <= Instant::now() => {
                entries.remove(task_key);
                Ok(None)
            }
            Some((status, _)) => Ok(Some(*status)),
            None => Ok(None),
        }
    }

    async fn set_pending(&self, task_key: &str) -> QueueResult<()> {
        if self.exists(task_key).await? {
            return Err(QueueError::status_conflict(task_key, "entry already exists"));
        }
        self.entries.lock().await.insert(
            task_key.to_string(),
            (TaskStatus::Pending, Instant::now() + self.ttl),
        );
        Ok(())
    }

    async fn set_success(&self, task_key: &str) -> QueueResult<()> {
        require_pending(task_key, self.get(task_key).await?)?;
        self.entries.lock().await.insert(
            task_key.to_string(),
            (TaskStatus::Success, Instant::now() + self.ttl),
        );
        Ok(())
    }

    async fn set_failure(&self, task_key: &str) -> QueueResult<()> {
        require_pending(task_key, self.get(task_key).await?)?;
        self.entries.lock().await.insert(
            task_key.to_string(),
            (TaskStatus::Failure, Instant::now() + self.ttl),
        );
        Ok(())
    }

    async fn delete(&self, task_key: &str) -> QueueResult<()> {
        self.entries.lock().await.remove(task_key);
        Ok(())
    }
}
