//! End-to-end transcodes over the local backend with an in-process remuxer.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use recmux_media::{MediaError, MediaResult, Remuxer};
use recmux_models::{GapReport, Platform, RecordingIntent, RecordingKey};
use recmux_storage::{LocalSegmentAccessor, SegmentAccessor};
use recmux_worker::{
    Notifier, SizeEstimate, Transcoder, TranscoderSettings, WorkerError, WorkerResult,
};
use tempfile::TempDir;

/// Copies the merged stream as is.
struct CopyRemuxer;

#[async_trait]
impl Remuxer for CopyRemuxer {
    async fn remux(&self, src: &Path, out: &Path) -> MediaResult<()> {
        tokio::fs::copy(src, out).await?;
        Ok(())
    }
}

struct FailingRemuxer;

#[async_trait]
impl Remuxer for FailingRemuxer {
    async fn remux(&self, _src: &Path, _out: &Path) -> MediaResult<()> {
        Err(MediaError::ffmpeg_failed("exit status 1", Some("moov atom not found".into()), Some(1)))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> WorkerResult<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

struct Fixture {
    tmp: TempDir,
    key: RecordingKey,
    notifier: Arc<RecordingNotifier>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            tmp: TempDir::new().unwrap(),
            key: RecordingKey::new(Some(Platform::Chzzk), "c1", "v1"),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    fn base(&self) -> &Path {
        self.tmp.path()
    }

    fn source_dir(&self) -> PathBuf {
        self.key.video_dir_in(&self.base().join("incomplete"))
    }

    fn complete(&self, rel: &str) -> PathBuf {
        self.base().join("complete").join(rel)
    }

    /// Write a bundle of `(sequence number, bytes)` segments into the
    /// recording's incomplete directory.
    fn add_bundle(&self, name: &str, segments: &[(i64, &[u8])]) {
        let dir = self.source_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let mut builder = tar::Builder::new(File::create(dir.join(name)).unwrap());
        for (seq, data) in segments {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, format!("{seq}.ts"), *data).unwrap();
        }
        builder.finish().unwrap();
    }

    fn settings(&self) -> TranscoderSettings {
        TranscoderSettings {
            tmp_dir: self.base().join("tmp"),
            complete_dir: self.base().join("complete"),
            staging_dir: self.base().join("_tmp"),
            is_archive: false,
            video_size_limit_gb: 10,
            size_estimate: SizeEstimate::Count,
        }
    }

    fn accessor(&self) -> Arc<LocalSegmentAccessor> {
        Arc::new(LocalSegmentAccessor::new(self.base().join("incomplete")))
    }

    fn transcoder_with(&self, remuxer: Arc<dyn Remuxer>, settings: TranscoderSettings) -> Transcoder {
        Transcoder::new(self.accessor(), self.notifier.clone(), remuxer, settings)
    }

    fn transcoder(&self) -> Transcoder {
        self.transcoder_with(Arc::new(CopyRemuxer), self.settings())
    }

    fn intent(&self) -> RecordingIntent {
        RecordingIntent::complete(self.key.platform, "c1", "v1", "local")
    }

    fn assert_no_residue(&self) {
        assert!(!self.base().join("tmp/chzzk").exists());
        assert!(!self.base().join("_tmp/chzzk").exists());
    }
}

#[tokio::test]
async fn test_transcode_reports_gap_and_clears_source() {
    let fx = Fixture::new();
    fx.add_bundle("v1_1_3.tar", &[(1, b"aa"), (2, b"bb"), (3, b"cc")]);
    fx.add_bundle("v1_5_6.tar", &[(5, b"ee"), (6, b"ff")]);

    let result = fx.transcoder().transcode(&fx.intent()).await.unwrap();

    assert!(result.is_success());
    assert_eq!(
        result.message(),
        "Complete Transcoding: platform=chzzk, channel_id=c1, video_name=v1"
    );
    assert_eq!(std::fs::read(fx.complete("chzzk/c1/v1.mp4")).unwrap(), b"aabbcceeff");

    let yaml = std::fs::read_to_string(fx.complete("chzzk/c1/v1.yaml")).unwrap();
    assert_eq!(GapReport::from_yaml(&yaml).unwrap().missing_segments, vec![4]);

    assert!(!fx.complete("chzzk/c1/v1").exists());
    assert!(!fx.complete("chzzk/c1/v1_mismatch.yaml").exists());
    assert!(fx.accessor().get_paths(&fx.key).await.unwrap().is_empty());
    fx.assert_no_residue();
    assert!(fx.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_merge_follows_sequence_order() {
    let fx = Fixture::new();
    // Bundle names sort opposite to their contents.
    fx.add_bundle("a.tar", &[(10, b"J"), (9, b"I")]);
    fx.add_bundle("b.tar", &[(0, b"init"), (8, b"H")]);

    fx.transcoder().transcode(&fx.intent()).await.unwrap();

    assert_eq!(std::fs::read(fx.complete("chzzk/c1/v1.mp4")).unwrap(), b"initHIJ");
    let yaml = std::fs::read_to_string(fx.complete("chzzk/c1/v1.yaml")).unwrap();
    assert!(!GapReport::from_yaml(&yaml).unwrap().has_gaps());
}

#[tokio::test]
async fn test_size_mismatch_archives_and_keeps_source() {
    let fx = Fixture::new();
    fx.add_bundle("v1_1_2.tar", &[(1, b"aa"), (2, b"bb")]);
    fx.add_bundle("v1_2_3.tar", &[(2, b"bbbb"), (3, b"cc")]);

    fx.transcoder().transcode(&fx.intent()).await.unwrap();

    assert_eq!(std::fs::read(fx.complete("chzzk/c1/v1.mp4")).unwrap(), b"aabbcc");
    let mismatch = std::fs::read_to_string(fx.complete("chzzk/c1/v1_mismatch.yaml")).unwrap();
    assert!(mismatch.contains("seq: 2"));
    assert!(mismatch.contains("sizeA: 2"));
    assert!(mismatch.contains("sizeB: 4"));

    assert!(fx.complete("chzzk/c1/v1/v1_1_2.tar").exists());
    assert!(fx.complete("chzzk/c1/v1/v1_2_3.tar").exists());
    assert_eq!(fx.accessor().get_paths(&fx.key).await.unwrap().len(), 2);

    assert_eq!(
        fx.notifier.messages(),
        vec!["Segment size mismatch: platform=chzzk, channel_id=c1, video_name=v1"]
    );
    fx.assert_no_residue();
}

#[tokio::test]
async fn test_conditional_archive_on_gaps() {
    let fx = Fixture::new();
    fx.add_bundle("v1_1_3.tar", &[(1, b"a"), (3, b"c")]);

    let mut intent = fx.intent();
    intent.conditionally_archive = true;
    fx.transcoder().transcode(&intent).await.unwrap();

    assert!(fx.complete("chzzk/c1/v1/v1_1_3.tar").exists());
    // Bundles are archived, sources are still cleared.
    assert!(fx.accessor().get_paths(&fx.key).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_recording_is_rejected_before_download() {
    let fx = Fixture::new();
    fx.add_bundle("v1_1_1.tar", &[(1, b"a")]);
    fx.add_bundle("v1_2_2.tar", &[(2, b"b")]);

    let settings = TranscoderSettings {
        video_size_limit_gb: 0,
        ..fx.settings()
    };
    let err = fx
        .transcoder_with(Arc::new(CopyRemuxer), settings)
        .transcode(&fx.intent())
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::PolicyRejected(_)));
    assert!(!err.is_retryable());
    assert_eq!(
        fx.notifier.messages(),
        vec!["Video size is too large: platform=chzzk, channel_id=c1, video_name=v1, size=0.04GB"]
    );
    assert!(!fx.base().join("tmp/chzzk/c1/v1").exists());
    assert_eq!(fx.accessor().get_paths(&fx.key).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_remux_failure_cleans_up_and_keeps_source() {
    let fx = Fixture::new();
    fx.add_bundle("v1_1_2.tar", &[(1, b"a"), (2, b"b")]);

    let settings = TranscoderSettings {
        is_archive: true,
        ..fx.settings()
    };
    let err = fx
        .transcoder_with(Arc::new(FailingRemuxer), settings)
        .transcode(&fx.intent())
        .await
        .unwrap_err();

    assert!(err.is_permanent_failure());
    assert!(!fx.complete("chzzk/c1/v1.mp4").exists());
    assert!(!fx.complete("chzzk/c1/v1").exists());
    fx.assert_no_residue();
    assert_eq!(fx.accessor().get_paths(&fx.key).await.unwrap().len(), 1);

    // A retry after fixing the remuxer starts clean.
    let result = fx.transcoder().transcode(&fx.intent()).await.unwrap();
    assert!(result.is_success());
}

#[tokio::test]
async fn test_foreign_file_in_bundle_fails() {
    let fx = Fixture::new();
    fx.add_bundle("v1_1_2.tar", &[(1, b"a")]);
    let dir = fx.source_dir();
    let mut builder = tar::Builder::new(File::create(dir.join("v1_3_4.tar")).unwrap());
    let mut header = tar::Header::new_gnu();
    header.set_size(2);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, "notes.txt", &b"hi"[..]).unwrap();
    builder.finish().unwrap();

    let err = fx.transcoder().transcode(&fx.intent()).await.unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Media(MediaError::InvalidExtension { .. })
    ));
    fx.assert_no_residue();
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let fx = Fixture::new();
    fx.add_bundle("v1_1_2.tar", &[(1, b"a")]);
    let transcoder = fx.transcoder();

    assert!(transcoder.clear(&fx.key).await.unwrap().is_success());
    assert!(transcoder.clear(&fx.key).await.unwrap().is_success());

    assert!(!fx.base().join("incomplete/chzzk").exists());
}
