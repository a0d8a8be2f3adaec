//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use recmux_media::{FfmpegRemuxer, FfmpegRunner, Remuxer};
use recmux_models::{RecordingKey, TaskStatus, TranscodeResult};
use recmux_queue::{Delivery, JobQueue, QueueJob, TaskStatusStore};
use recmux_storage::{create_accessor, retry_async, BackendsFile, RetryConfig, RetryResult};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::notifier::{create_notifier, Notifier};
use crate::transcoder::{Transcoder, TranscoderSettings};

/// Retries of the SUCCESS write after a finished transcode.
const STATUS_WRITE_RETRIES: u32 = 3;

/// Everything a job needs, built once per worker.
pub struct WorkerContext {
    config: WorkerConfig,
    backends: BackendsFile,
    notifier: Arc<dyn Notifier>,
    remuxer: Arc<dyn Remuxer>,
    status: Arc<dyn TaskStatusStore>,
}

impl WorkerContext {
    pub fn new(
        config: WorkerConfig,
        backends: BackendsFile,
        notifier: Arc<dyn Notifier>,
        remuxer: Arc<dyn Remuxer>,
        status: Arc<dyn TaskStatusStore>,
    ) -> Self {
        Self {
            config,
            backends,
            notifier,
            remuxer,
            status,
        }
    }

    /// Build the production context: backends file, notifier and FFmpeg.
    pub async fn from_config(
        config: WorkerConfig,
        status: Arc<dyn TaskStatusStore>,
    ) -> WorkerResult<Self> {
        let backends = match &config.backends_path {
            Some(path) => BackendsFile::load(path).await?,
            None => BackendsFile::local_only(),
        };
        let notifier = create_notifier(&config)?;
        let runner = match config.remux_timeout {
            Some(timeout) => FfmpegRunner::new().with_timeout(timeout),
            None => FfmpegRunner::new(),
        };
        let remuxer: Arc<dyn Remuxer> = Arc::new(FfmpegRemuxer::new(runner));
        Ok(Self::new(config, backends, notifier, remuxer, status))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Transcoder bound to the storage backend named `fs_name`.
    pub fn transcoder(&self, fs_name: &str) -> WorkerResult<Transcoder> {
        let accessor = create_accessor(fs_name, &self.backends, &self.config.accessor_settings())?;
        Ok(Transcoder::new(
            accessor,
            Arc::clone(&self.notifier),
            Arc::clone(&self.remuxer),
            TranscoderSettings {
                tmp_dir: self.config.tmp_dir.clone(),
                complete_dir: self.config.complete_dir(),
                staging_dir: self.config.staging_dir(),
                is_archive: self.config.is_archive,
                video_size_limit_gb: self.config.video_size_limit_gb,
                size_estimate: self.config.size_estimate,
            },
        ))
    }

    /// Run one job.
    ///
    /// Transcodes go through the task status repository: a PENDING or
    /// SUCCESS entry skips the job, a FAILURE entry is replaced. `reclaimed`
    /// marks a delivery taken over from a dead consumer, whose PENDING
    /// entry is stale.
    pub async fn handle(&self, job: &QueueJob, reclaimed: bool) -> WorkerResult<TranscodeResult> {
        let intent = job.intent();
        let transcoder = self.transcoder(&intent.fs_name)?;

        match job {
            QueueJob::Clear(_) => transcoder.clear(&intent.key()).await,
            QueueJob::Transcode(_) => {
                let key = intent.key();
                self.begin(&key, reclaimed).await?;

                match transcoder.transcode(intent).await {
                    Ok(result) => {
                        self.record_success(&key).await;
                        Ok(result)
                    }
                    Err(e) => {
                        if let Err(status_err) = self.status.set_failure(&key.task_key()).await {
                            warn!(key = %key, error = %status_err, "Failed to record task failure");
                        }
                        Err(e)
                    }
                }
            }
        }
    }

    /// Mark a finished transcode SUCCESS, retrying briefly.
    ///
    /// The recording is already published and its source cleared, so a
    /// status write that keeps failing is logged and the job still succeeds.
    async fn record_success(&self, key: &RecordingKey) {
        let task_key = key.task_key();
        let retry = RetryConfig::new("set_task_success")
            .with_max_retries(STATUS_WRITE_RETRIES)
            .with_base_delay(Duration::from_millis(100));

        if let RetryResult::Failed { error, attempts } =
            retry_async(&retry, || self.status.set_success(&task_key)).await
        {
            error!(
                key = %key,
                attempts = attempts,
                error = %error,
                "Failed to record task success"
            );
        }
    }

    /// Check-and-set the task status to PENDING.
    async fn begin(&self, key: &RecordingKey, reclaimed: bool) -> WorkerResult<()> {
        let task_key = key.task_key();
        match self.status.get(&task_key).await? {
            Some(TaskStatus::Pending) if reclaimed => {
                warn!(key = %key, "Replacing stale PENDING status of reclaimed job");
                self.status.delete(&task_key).await?;
            }
            Some(TaskStatus::Failure) => {
                debug!(key = %key, "Retrying failed task");
                self.status.delete(&task_key).await?;
            }
            _ => {
                if let Some(reason) = self.status.check(&task_key).await? {
                    return Err(WorkerError::Skipped(reason));
                }
            }
        }
        self.status.set_pending(&task_key).await?;
        Ok(())
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    ctx: Arc<WorkerContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(queue: JobQueue, ctx: WorkerContext) -> Self {
        let config = ctx.config().clone();
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("{}-{}", config.worker_name, Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            ctx: Arc::new(ctx),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor; returns after [`JobExecutor::shutdown`].
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' on {:?} with {} max concurrent jobs",
            self.consumer_name, self.config.queues, self.config.max_concurrent_jobs
        );

        self.queue.init(&self.config.queues).await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claim_task();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("In-flight jobs still running after {:?}", self.config.shutdown_timeout);
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically take over jobs left pending by dead consumers.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let ctx = Arc::clone(&self.ctx);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let queues = self.config.queues.clone();
        let interval_period = self.config.claim_interval;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_period);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        for name in &queues {
                            let deliveries = match queue.claim_pending(name, &consumer_name, 5).await {
                                Ok(d) => d,
                                Err(e) => {
                                    warn!("Failed to claim pending jobs on {}: {}", name, e);
                                    continue;
                                }
                            };
                            if !deliveries.is_empty() {
                                info!("Claimed {} pending jobs on {}", deliveries.len(), name);
                            }
                            for delivery in deliveries {
                                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                    return;
                                };
                                let ctx = Arc::clone(&ctx);
                                let queue = Arc::clone(&queue);
                                tokio::spawn(async move {
                                    let _permit = permit;
                                    Self::execute_job(ctx, queue, delivery, true).await;
                                });
                            }
                        }
                    }
                }
            }
        })
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        metrics::set_jobs_in_flight(self.config.max_concurrent_jobs - available);
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .queue
            .consume(&self.config.queues, &self.consumer_name, 1000, available)
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", deliveries.len());

        for delivery in deliveries {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, delivery, false).await;
            });
        }

        Ok(())
    }

    /// Execute a single job with retry and DLQ handling.
    async fn execute_job(
        ctx: Arc<WorkerContext>,
        queue: Arc<JobQueue>,
        delivery: Delivery,
        reclaimed: bool,
    ) {
        let job = &delivery.job;
        let kind = job.kind();
        let key = job.key();
        info!(queue = %delivery.queue, job_id = %job.job_id(), "Executing {} job for {}", kind, key);

        match ctx.handle(job, reclaimed).await {
            Ok(result) => {
                info!(job_id = %job.job_id(), "{}", result);
                metrics::record_job_completed(kind);
                if let Err(e) = queue.ack(&delivery).await {
                    error!("Failed to ack job {}: {}", job.job_id(), e);
                }
            }
            Err(WorkerError::Skipped(reason)) => {
                info!(job_id = %job.job_id(), "Skipping job: {}", reason);
                metrics::record_job_skipped(kind);
                if let Err(e) = queue.ack(&delivery).await {
                    error!("Failed to ack job {}: {}", job.job_id(), e);
                }
            }
            Err(e) => {
                error!(job_id = %job.job_id(), "Job for {} failed: {}", key, e);
                metrics::record_job_failed(kind);

                if e.is_permanent_failure() {
                    Self::dead_letter(&queue, &delivery, &e.to_string()).await;
                    return;
                }

                let retry_count = match queue.increment_retry(&delivery.message_id).await {
                    Ok(n) => n,
                    Err(retry_err) => {
                        warn!("Failed to count retry of {}: {}", job.job_id(), retry_err);
                        u32::MAX
                    }
                };
                let max_retries = queue.max_retries();

                if retry_count >= max_retries {
                    warn!("Job {} exceeded max retries ({}), moving to DLQ", job.job_id(), max_retries);
                    Self::dead_letter(&queue, &delivery, &e.to_string()).await;
                } else {
                    info!(
                        "Job {} will be retried (attempt {}/{})",
                        job.job_id(),
                        retry_count,
                        max_retries
                    );
                }
            }
        }
    }

    async fn dead_letter(queue: &JobQueue, delivery: &Delivery, error: &str) {
        metrics::record_job_dead_lettered(delivery.job.kind());
        if let Err(e) = queue.dlq(delivery, error).await {
            error!("Failed to move job {} to DLQ: {}", delivery.job.job_id(), e);
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Sender that stops the executor when `true` is sent.
    pub fn shutdown_handle(&self) -> tokio::sync::watch::Sender<bool> {
        self.shutdown.clone()
    }
}
