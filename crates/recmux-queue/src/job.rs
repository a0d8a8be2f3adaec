//! Job types for the queue.

use chrono::{DateTime, Utc};
use recmux_models::{JobId, RecordingIntent, RecordingKey, RecordingStatus};
use serde::{Deserialize, Serialize};

/// One recording's intent as carried through the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingJob {
    pub job_id: JobId,
    pub intent: RecordingIntent,
    pub created_at: DateTime<Utc>,
}

impl RecordingJob {
    pub fn new(intent: RecordingIntent) -> Self {
        Self {
            job_id: JobId::new(),
            intent,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> RecordingKey {
        self.intent.key()
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Reconcile a completed recording into one published file
    Transcode(RecordingJob),
    /// Discard a canceled recording's segments
    Clear(RecordingJob),
}

impl QueueJob {
    /// Pick the job kind from the intent's status.
    pub fn from_intent(intent: RecordingIntent) -> Self {
        match intent.status {
            RecordingStatus::Complete => QueueJob::Transcode(RecordingJob::new(intent)),
            RecordingStatus::Canceled => QueueJob::Clear(RecordingJob::new(intent)),
        }
    }

    fn inner(&self) -> &RecordingJob {
        match self {
            QueueJob::Transcode(j) | QueueJob::Clear(j) => j,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.inner().job_id
    }

    pub fn intent(&self) -> &RecordingIntent {
        &self.inner().intent
    }

    pub fn key(&self) -> RecordingKey {
        self.inner().key()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueueJob::Transcode(_) => "transcode",
            QueueJob::Clear(_) => "clear",
        }
    }

    /// Suppresses a second enqueue of the same work while the first is in flight.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.kind(), self.key().task_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recmux_models::Platform;

    #[test]
    fn test_kind_follows_status() {
        let complete = RecordingIntent::complete(Some(Platform::Chzzk), "c1", "v1", "local");
        let canceled = RecordingIntent::canceled(Some(Platform::Chzzk), "c1", "v1", "local");

        let job = QueueJob::from_intent(complete);
        assert_eq!(job.kind(), "transcode");
        assert_eq!(job.idempotency_key(), "transcode:chzzk:c1:v1");

        assert_eq!(QueueJob::from_intent(canceled).kind(), "clear");
    }

    #[test]
    fn test_payload_shape() {
        let job = QueueJob::from_intent(RecordingIntent::complete(None, "c1", "v1", "minio"));
        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["type"], "transcode");
        assert_eq!(json["intent"]["videoName"], "v1");

        let decoded: QueueJob = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.intent().fs_name, "minio");
    }
}
