//! Reconciles one finished recording into a published MP4.
//!
//! The transcoder fetches a recording's segment bundles into a private
//! working directory `{tmp}/{platform}/{channel}/{video}/`, unpacks them,
//! drops duplicate segments, reports gaps, concatenates and remuxes the
//! stream, and publishes the results under the complete tree. Source
//! segments are deleted only after everything has been published, so a
//! failed run can be retried from scratch.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use recmux_media::fs_utils::{prune_empty_dirs, remove_dir_if_empty, remove_tree_if_exists};
use recmux_media::{
    check_gap_paths, dedupe, extract_tars, flatten_segments, merge_segments, sorted_segment_paths,
    Remuxer, StagedPublisher,
};
use recmux_models::{MismatchReport, RecordingIntent, RecordingKey, TranscodeResult};
use recmux_storage::SegmentAccessor;
use tracing::{debug, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::notifier::{notify_best_effort, Notifier};
use crate::size_guard::{estimate_by_count, estimate_by_name, SizeCheck, SizeEstimate};

const TARS_DIR_NAME: &str = "tars";
const EXTRACTED_DIR_NAME: &str = "extracted";
const SEGMENTS_DIR_NAME: &str = "segments";

/// Progress of one transcode; the last reached stage is reported on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    SizeChecked,
    SegmentsFetched,
    Extracted,
    Deduped,
    Merged,
    Remuxed,
    Published,
    SourceCleared,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::SizeChecked => "size_checked",
            Stage::SegmentsFetched => "segments_fetched",
            Stage::Extracted => "extracted",
            Stage::Deduped => "deduped",
            Stage::Merged => "merged",
            Stage::Remuxed => "remuxed",
            Stage::Published => "published",
            Stage::SourceCleared => "source_cleared",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TranscoderSettings {
    pub tmp_dir: PathBuf,
    pub complete_dir: PathBuf,
    pub staging_dir: PathBuf,
    /// Archive raw bundles of every recording
    pub is_archive: bool,
    pub video_size_limit_gb: u64,
    pub size_estimate: SizeEstimate,
}

pub struct Transcoder {
    accessor: Arc<dyn SegmentAccessor>,
    notifier: Arc<dyn Notifier>,
    remuxer: Arc<dyn Remuxer>,
    publisher: StagedPublisher,
    settings: TranscoderSettings,
}

/// Per-run bookkeeping.
struct Run<'a> {
    key: RecordingKey,
    work_dir: PathBuf,
    logger: &'a JobLogger,
    stage: Stage,
    stage_started: Instant,
}

impl Run<'_> {
    fn advance(&mut self, stage: Stage) {
        self.logger
            .log_progress(stage.as_str(), self.stage_started.elapsed().as_secs_f64());
        self.stage = stage;
        self.stage_started = Instant::now();
    }
}

impl Transcoder {
    pub fn new(
        accessor: Arc<dyn SegmentAccessor>,
        notifier: Arc<dyn Notifier>,
        remuxer: Arc<dyn Remuxer>,
        settings: TranscoderSettings,
    ) -> Self {
        let publisher = StagedPublisher::new(&settings.complete_dir, &settings.staging_dir);
        Self {
            accessor,
            notifier,
            remuxer,
            publisher,
            settings,
        }
    }

    /// Working directory of a recording.
    pub fn work_dir(&self, key: &RecordingKey) -> PathBuf {
        key.video_dir_in(&self.settings.tmp_dir)
    }

    /// Discard a canceled recording's source segments.
    pub async fn clear(&self, key: &RecordingKey) -> WorkerResult<TranscodeResult> {
        let start = Instant::now();
        let logger = JobLogger::new(key, "clear");
        self.accessor.clear_by_key(key).await?;
        metrics::record_clear();
        logger.log_completion("Clear success", start.elapsed().as_secs_f64());
        Ok(TranscodeResult::success("Clear success"))
    }

    /// Turn a completed recording into `{complete}/{platform}/{channel}/{video}.mp4`
    /// with its gap report.
    ///
    /// On error the working and staging directories are removed before the
    /// error is returned; source segments are left untouched.
    pub async fn transcode(&self, intent: &RecordingIntent) -> WorkerResult<TranscodeResult> {
        let start = Instant::now();
        let key = intent.key();
        let logger = JobLogger::new(&key, "transcode");
        let mut run = Run {
            work_dir: self.work_dir(&key),
            key,
            logger: &logger,
            stage: Stage::Start,
            stage_started: Instant::now(),
        };

        let result = self.run(intent, &mut run).await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(result) => {
                metrics::record_transcode("success", elapsed);
                logger.log_completion(result.message(), elapsed);
                Ok(result)
            }
            Err(e) => {
                metrics::record_transcode("failure", elapsed);
                logger.log_error(&format!("Failed to transcode after {}: {}", run.stage, e), elapsed);
                self.cleanup_failed(&run.key, &run.work_dir).await;
                Err(e)
            }
        }
    }

    async fn run(&self, intent: &RecordingIntent, run: &mut Run<'_>) -> WorkerResult<TranscodeResult> {
        let key = run.key.clone();
        let work_dir = run.work_dir.clone();

        let mut archive_tars = self.settings.is_archive || intent.should_archive;
        let mut archive_source = false;

        let source_paths = self.accessor.get_paths(&key).await?;
        self.check_size(&key, &source_paths).await?;
        run.advance(Stage::SizeChecked);

        run.logger.log_start(&format!("{} source files", source_paths.len()));
        let tars_dir = work_dir.join(TARS_DIR_NAME);
        tokio::fs::create_dir_all(&tars_dir).await?;
        let stats = self.accessor.copy(&source_paths, &tars_dir).await?;
        info!(
            key = %key,
            files = stats.files,
            bytes = stats.bytes,
            retry_count = stats.retry_count,
            "Downloaded source segments"
        );
        run.advance(Stage::SegmentsFetched);

        let extracted_dir = work_dir.join(EXTRACTED_DIR_NAME);
        let extracted = extract_tars(&tars_dir, &extracted_dir).await?;
        run.advance(Stage::Extracted);

        let outcome = dedupe(&extracted).await?;
        if !outcome.mismatches.is_empty() {
            metrics::record_mismatches(outcome.mismatches.len());
            run.logger
                .log_warning(&format!("{} segment size mismatches", outcome.mismatches.len()));
            notify_best_effort(self.notifier.as_ref(), &format!("Segment size mismatch: {}", key))
                .await;
            archive_source = true;
            archive_tars = true;
        }
        let mismatch_report = MismatchReport::new(outcome.mismatches);
        run.advance(Stage::Deduped);

        let segments_dir = work_dir.join(SEGMENTS_DIR_NAME);
        flatten_segments(&outcome.kept, &segments_dir).await?;
        remove_tree_if_exists(&extracted_dir).await?;

        let sorted = sorted_segment_paths(&segments_dir).await?;
        let gap_report = check_gap_paths(&sorted)?;
        if gap_report.has_gaps() {
            metrics::record_missing_segments(gap_report.missing_segments.len());
            run.logger.log_warning(&format!(
                "{} missing segments",
                gap_report.missing_segments.len()
            ));
            if intent.conditionally_archive {
                archive_tars = true;
            }
        }

        let staged_tars = if archive_tars {
            Some(self.publisher.stage_dir(&key, &tars_dir, TARS_DIR_NAME).await?)
        } else {
            remove_tree_if_exists(&tars_dir).await?;
            None
        };

        let merged = work_dir.join(format!("{}.ts", key.video_name));
        let merged_bytes = merge_segments(&sorted, &merged).await?;
        remove_dir_if_empty(&segments_dir).await?;
        debug!(key = %key, bytes = merged_bytes, "Merged segments");
        run.advance(Stage::Merged);

        let mp4 = work_dir.join(format!("{}.mp4", key.video_name));
        self.remuxer.remux(&merged, &mp4).await?;
        tokio::fs::remove_file(&merged).await?;
        run.advance(Stage::Remuxed);

        self.publisher.publish_file(&key, &mp4).await?;

        let gap_path = work_dir.join(format!("{}.yaml", key.video_name));
        tokio::fs::write(&gap_path, gap_report.to_yaml()?).await?;
        self.publisher.publish_file(&key, &gap_path).await?;

        if !mismatch_report.is_empty() {
            let mismatch_path = work_dir.join(format!("{}_mismatch.yaml", key.video_name));
            tokio::fs::write(&mismatch_path, mismatch_report.to_yaml()?).await?;
            self.publisher.publish_file(&key, &mismatch_path).await?;
        }

        if let Some(staged) = staged_tars {
            self.publisher.promote_dir(&key, &staged).await?;
        }
        run.advance(Stage::Published);

        self.cleanup_dirs(&key, &work_dir).await;

        if archive_source {
            info!(key = %key, "Keeping source segments for inspection");
        } else {
            self.accessor.clear_by_paths(&source_paths).await?;
        }
        run.advance(Stage::SourceCleared);

        run.stage = Stage::Done;
        Ok(TranscodeResult::success(format!("Complete Transcoding: {}", key)))
    }

    async fn check_size(&self, key: &RecordingKey, source_paths: &[String]) -> WorkerResult<()> {
        let bytes = match self.settings.size_estimate {
            SizeEstimate::Count => estimate_by_count(source_paths),
            SizeEstimate::Name => estimate_by_name(source_paths)?,
            SizeEstimate::Actual => self.accessor.get_size_sum(key).await?,
        };
        let check = SizeCheck::new(bytes, self.settings.video_size_limit_gb);
        info!(key = %key, size_gb = check.gb, too_large = check.too_large, "Estimated video size");

        if check.too_large {
            let message = format!("Video size is too large: {}, size={}GB", key, check.gb);
            notify_best_effort(self.notifier.as_ref(), &message).await;
            return Err(WorkerError::policy_rejected(message));
        }
        Ok(())
    }

    /// Remove the working directory and any empty ancestors in the tmp and
    /// staging trees. Never fails.
    async fn cleanup_dirs(&self, key: &RecordingKey, work_dir: &Path) {
        if let Err(e) = remove_tree_if_exists(work_dir).await {
            warn!(key = %key, error = %e, "Failed to remove working directory");
        }
        if let Err(e) = prune_empty_dirs(&key.ancestor_dirs_in(&self.settings.tmp_dir)).await {
            warn!(key = %key, error = %e, "Failed to clean tmp directories");
        }
        self.publisher.cleanup_staging(key).await;
    }

    async fn cleanup_failed(&self, key: &RecordingKey, work_dir: &Path) {
        let staging = self.publisher.staging_video_dir(key);
        if let Err(e) = remove_tree_if_exists(&staging).await {
            warn!(key = %key, error = %e, "Failed to remove staging directory");
        }
        self.cleanup_dirs(key, work_dir).await;
    }
}
