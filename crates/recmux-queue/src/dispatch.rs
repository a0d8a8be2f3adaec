//! Intent routing and throttled dispatch into destination queues.

use recmux_models::{RecordingIntent, RecordingStatus};
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::intake::IntentBuffer;
use crate::job::QueueJob;
use crate::queue::{JobQueue, DEFAULT_QUEUE, IO_LFS_QUEUE, IO_NET_QUEUE};

/// Storage backend name served by the local-filesystem queue.
pub const LOCAL_FS_NAME: &str = "local";

/// Destination queue for an intent.
pub fn route(intent: &RecordingIntent) -> &'static str {
    match intent.status {
        RecordingStatus::Canceled => DEFAULT_QUEUE,
        RecordingStatus::Complete if intent.fs_name == LOCAL_FS_NAME => IO_LFS_QUEUE,
        RecordingStatus::Complete => IO_NET_QUEUE,
    }
}

/// Whether a destination holding `queued` jobs may take one more.
pub fn admit(queued: u64, threshold: u64) -> bool {
    queued < threshold
}

/// Result of one dispatch step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Buffer empty
    Idle,
    /// Head intent moved to the named queue
    Dispatched(&'static str),
    /// Destination full; head left in place
    Throttled(&'static str),
    /// Head was malformed and discarded
    Dropped,
}

/// Feeds buffered intents to the job queues.
pub struct Dispatcher {
    queue: JobQueue,
    buffer: IntentBuffer,
    threshold: u64,
}

impl Dispatcher {
    pub fn new(queue: JobQueue) -> Self {
        let config = queue.config();
        let buffer = IntentBuffer::new(queue.client().clone(), config.intent_buffer_key.clone());
        let threshold = config.received_threshold;
        Self {
            queue,
            buffer,
            threshold,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn buffer(&self) -> &IntentBuffer {
        &self.buffer
    }

    /// Accept an intent from a recorder.
    ///
    /// Cancellations go straight to their queue; completions wait in the
    /// buffer for [`Dispatcher::dispatch_once`].
    pub async fn submit(&self, intent: &RecordingIntent) -> QueueResult<()> {
        intent.validate()?;

        if intent.is_complete() {
            let len = self.buffer.push(&intent.to_json()?).await?;
            info!(key = %intent.key(), buffered = len, "Buffered completion intent");
            return Ok(());
        }

        self.enqueue(intent.clone()).await.map(|_| ())
    }

    async fn enqueue(&self, intent: RecordingIntent) -> QueueResult<&'static str> {
        let queue = route(&intent);
        match self.queue.enqueue(queue, &QueueJob::from_intent(intent)).await {
            Ok(_) | Err(QueueError::Duplicate(_)) => Ok(queue),
            Err(e) => Err(e),
        }
    }

    /// Move the buffer's head to its destination if that queue has room.
    ///
    /// Cancellations found in the buffer are never throttled.
    pub async fn dispatch_once(&self) -> QueueResult<DispatchOutcome> {
        let Some(raw) = self.buffer.peek().await? else {
            return Ok(DispatchOutcome::Idle);
        };

        let intent = match RecordingIntent::from_json(&raw) {
            Ok(intent) => intent,
            Err(e) => {
                warn!(error = %e, payload = %raw, "Dropping malformed intent");
                self.buffer.pop().await?;
                return Ok(DispatchOutcome::Dropped);
            }
        };

        let queue = route(&intent);
        if intent.is_complete() && !admit(self.queue.queue_len(queue).await?, self.threshold) {
            debug!(queue = queue, "Destination full");
            return Ok(DispatchOutcome::Throttled(queue));
        }

        self.enqueue(intent).await?;
        self.buffer.pop().await?;
        Ok(DispatchOutcome::Dispatched(queue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recmux_models::Platform;

    #[test]
    fn test_route() {
        let p = Some(Platform::Soop);
        assert_eq!(route(&RecordingIntent::canceled(p, "c", "v", "local")), DEFAULT_QUEUE);
        assert_eq!(route(&RecordingIntent::canceled(p, "c", "v", "minio")), DEFAULT_QUEUE);
        assert_eq!(route(&RecordingIntent::complete(p, "c", "v", "local")), IO_LFS_QUEUE);
        assert_eq!(route(&RecordingIntent::complete(p, "c", "v", "minio")), IO_NET_QUEUE);
    }

    #[test]
    fn test_admit_below_threshold_only() {
        assert!(admit(0, 1));
        assert!(!admit(1, 1));
        assert!(admit(2, 3));
        assert!(!admit(0, 0));
    }

    #[tokio::test]
    #[ignore = "requires redis"]
    async fn test_dispatch_throttles_on_full_queue() {
        let config = crate::queue::QueueConfig {
            stream_prefix: format!("recmux:test:{}", recmux_models::JobId::new()),
            intent_buffer_key: format!("recmux:test:intents:{}", recmux_models::JobId::new()),
            ..crate::queue::QueueConfig::from_env()
        };
        let queue = JobQueue::new(config).unwrap();
        queue.init(&[IO_LFS_QUEUE.to_string()]).await.unwrap();
        let dispatcher = Dispatcher::new(queue);

        let p = Some(Platform::Chzzk);
        dispatcher.submit(&RecordingIntent::complete(p, "c", "v1", "local")).await.unwrap();
        dispatcher.submit(&RecordingIntent::complete(p, "c", "v2", "local")).await.unwrap();

        assert_eq!(
            dispatcher.dispatch_once().await.unwrap(),
            DispatchOutcome::Dispatched(IO_LFS_QUEUE)
        );
        assert_eq!(
            dispatcher.dispatch_once().await.unwrap(),
            DispatchOutcome::Throttled(IO_LFS_QUEUE)
        );
        assert_eq!(dispatcher.buffer().len().await.unwrap(), 1);
    }
}
