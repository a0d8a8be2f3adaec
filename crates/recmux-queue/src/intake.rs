//! FIFO buffer of completion intents waiting for queue capacity.

use redis::AsyncCommands;

use crate::error::QueueResult;

/// Raw intent payloads kept in a Redis list, oldest at the head.
///
/// Entries are stored as received so a malformed one can be inspected and
/// dropped by the dispatcher without blocking the rest.
pub struct IntentBuffer {
    client: redis::Client,
    key: String,
}

impl IntentBuffer {
    pub fn new(client: redis::Client, key: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append to the tail. Returns the buffer length after the push.
    pub async fn push(&self, payload: &str) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.rpush(&self.key, payload).await?;
        Ok(len)
    }

    /// Head entry without removing it.
    pub async fn peek(&self) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let head: Option<String> = conn.lindex(&self.key, 0).await?;
        Ok(head)
    }

    /// Remove and return the head entry.
    pub async fn pop(&self) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let head: Option<String> = conn.lpop(&self.key, None).await?;
        Ok(head)
    }

    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.llen(&self.key).await?;
        Ok(len)
    }
}
