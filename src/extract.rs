//! Single-frame extraction through the ffmpeg command-line tool.
//!
//! [`FrameExtractor`] seeks to a timestamp in a local video and writes one
//! JPEG frame, downscaled so neither side exceeds the configured maximum.
//! The process runs under a hard wall-clock limit; on expiry it is killed
//! and the extraction fails with [`GrabError::ExtractionTimeout`]. There are
//! no retries: a frame either decodes within budget or the attempt is
//! abandoned.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//!
//! use framegrab::{FrameExtractor, FrameSettings, GrabError};
//!
//! # async fn example() -> Result<(), GrabError> {
//! let extractor = FrameExtractor::new("ffmpeg", FrameSettings::default());
//! extractor
//!     .extract_frame(
//!         Path::new("input.mp4"),
//!         Path::new("frame.jpg"),
//!         1.5,
//!         Duration::from_secs(20),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::configuration::{FrameSettings, PipelineOptions};
use crate::error::GrabError;
use crate::process::{ExtractorProcess, ProcessOutcome};

/// Longest stderr excerpt kept for diagnostics.
const MAX_DIAGNOSTIC_BYTES: usize = 2048;

/// Runs ffmpeg to pull one still frame out of a video file.
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    ffmpeg: PathBuf,
    frame: FrameSettings,
}

impl FrameExtractor {
    /// Extractor running the binary at `ffmpeg` with the given frame settings.
    pub fn new(ffmpeg: impl Into<PathBuf>, frame: FrameSettings) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            frame,
        }
    }

    /// Extractor using the ffmpeg path and frame settings from `options`.
    pub fn from_options(options: &PipelineOptions) -> Self {
        Self::new(options.ffmpeg_path.clone(), options.frame)
    }

    /// The argument list passed to ffmpeg, without the program name.
    ///
    /// Seeking happens before `-i` so ffmpeg jumps to the nearest keyframe
    /// instead of decoding from the start.
    pub fn command_args(&self, input: &Path, output: &Path, timestamp_seconds: f64) -> Vec<OsString> {
        let max = self.frame.max_dimension;
        let scale = format!(
            "scale=w='min(iw,{max})':h='min(ih,{max})':force_original_aspect_ratio=decrease"
        );

        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostdin",
            "-y",
            "-ss",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(format!("{timestamp_seconds:.3}").into());
        args.push("-i".into());
        args.push(input.as_os_str().to_owned());
        args.extend(
            [
                "-frames:v".to_string(),
                "1".to_string(),
                "-vf".to_string(),
                scale,
                "-q:v".to_string(),
                self.frame.jpeg_quality.to_string(),
                "-f".to_string(),
                "image2".to_string(),
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(output.as_os_str().to_owned());
        args
    }

    /// Extract the frame at `timestamp_seconds` from `input` into `output`.
    ///
    /// The caller validates the timestamp. `limit` is the wall clock the
    /// process is allowed before it is killed.
    pub async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        timestamp_seconds: f64,
        limit: Duration,
    ) -> Result<(), GrabError> {
        let mut command = Command::new(&self.ffmpeg);
        command.args(self.command_args(input, output, timestamp_seconds));
        log::debug!("Running {} {:?}", self.ffmpeg.display(), command.as_std().get_args());

        let process = ExtractorProcess::start(command).map_err(|error| GrabError::ExtractionFailed {
            message: format!("cannot launch {}: {error}", self.ffmpeg.display()),
            diagnostics: None,
        })?;

        let outcome = process.wait_with_timeout(limit).await.map_err(|error| {
            GrabError::ExtractionFailed {
                message: format!("waiting for {} failed: {error}", self.ffmpeg.display()),
                diagnostics: None,
            }
        })?;

        let result = match outcome {
            ProcessOutcome::TimedOut { elapsed } => {
                log::warn!("Frame extraction killed after {elapsed:?}");
                return Err(GrabError::ExtractionTimeout(limit));
            }
            ProcessOutcome::Exited(result) => result,
        };

        if !result.status.success() {
            let exit = result
                .status
                .code()
                .map_or_else(|| "a signal".to_string(), |code| format!("code {code}"));
            return Err(GrabError::ExtractionFailed {
                message: format!("ffmpeg exited with {exit}"),
                diagnostics: diagnostic_tail(&result.stderr),
            });
        }

        if !tokio::fs::try_exists(output).await? {
            return Err(GrabError::ExtractionFailed {
                message: format!(
                    "ffmpeg wrote no frame at {timestamp_seconds}s (timestamp past the end of the video?)"
                ),
                diagnostics: diagnostic_tail(&result.stderr),
            });
        }

        log::debug!("Frame extracted in {:?}", result.elapsed);
        Ok(())
    }
}

/// The last [`MAX_DIAGNOSTIC_BYTES`] of `stderr` as trimmed text, if any.
fn diagnostic_tail(stderr: &[u8]) -> Option<String> {
    let start = stderr.len().saturating_sub(MAX_DIAGNOSTIC_BYTES);
    let text = String::from_utf8_lossy(&stderr[start..]);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
