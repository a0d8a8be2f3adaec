//! FFmpeg command builder, runner and the remux seam.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Bytes of stderr kept in error reports.
const STDERR_TAIL_BYTES: usize = 4096;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    input_args: Vec<String>,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Container-only copy of every stream, no re-encode.
    pub fn remux(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::new(input, output).stream_copy()
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runs FFmpeg commands, capturing stderr and enforcing an optional timeout.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self { timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let status = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!("FFmpeg timed out after {:?}, killing process", timeout);
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(timeout.as_secs()));
                }
            },
            None => child.wait().await?,
        };

        let stderr = stderr_task.await.unwrap_or_default();
        if status.success() {
            return Ok(());
        }

        Err(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some(stderr_tail(&stderr)),
            status.code(),
        ))
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Re-containers a merged stream into the deliverable format.
#[async_trait]
pub trait Remuxer: Send + Sync {
    async fn remux(&self, src: &Path, out: &Path) -> MediaResult<()>;
}

/// [`Remuxer`] backed by `ffmpeg -c copy`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRemuxer {
    runner: FfmpegRunner,
}

impl FfmpegRemuxer {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux(&self, src: &Path, out: &Path) -> MediaResult<()> {
        self.runner.run(&FfmpegCommand::remux(src, out)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remux_args() {
        let args = FfmpegCommand::remux("/w/v1.ts", "/w/v1.mp4").build_args();
        assert_eq!(
            args,
            vec!["-y", "-v", "error", "-i", "/w/v1.ts", "-c", "copy", "/w/v1.mp4"]
        );
    }

    #[test]
    fn test_stderr_tail_truncates() {
        let long = vec![b'x'; STDERR_TAIL_BYTES + 100];
        assert_eq!(stderr_tail(&long).len(), STDERR_TAIL_BYTES);
        assert_eq!(stderr_tail(b"  bad input \n"), "bad input");
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_remux_fails_on_garbage_input() {
        let tmp = tempfile::TempDir::new().unwrap();
        let src = tmp.path().join("bad.ts");
        tokio::fs::write(&src, b"not a transport stream").await.unwrap();

        let err = FfmpegRemuxer::default()
            .remux(&src, &tmp.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FfmpegFailed { .. }));
    }
}
