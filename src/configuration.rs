//! Pipeline configuration.
//!
//! [`PipelineOptions`] is a builder that carries every limit the pipeline
//! enforces: the [`TimeoutBudget`], admission capacity, size caps, scratch
//! location, and frame output settings. It is handed to
//! [`FramePipeline::new`](crate::FramePipeline::new) once and never mutated
//! afterwards.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use framegrab::{PipelineOptions, TimeoutBudget};
//!
//! let options = PipelineOptions::new()
//!     .with_capacity(1)
//!     .with_max_download_bytes(50 * 1024 * 1024)
//!     .with_timeouts(
//!         TimeoutBudget::default().with_extraction(Duration::from_secs(20)),
//!     );
//! assert!(options.validate().is_ok());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::GrabError;
use crate::progress::{NoOpProgress, ProgressCallback};
use crate::stability::StabilityOptions;

/// Named time limits for each suspension point of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutBudget {
    /// The remote must start responding (status and headers) within this.
    pub connect: Duration,
    /// Longest tolerated gap between two body chunks.
    pub inactivity: Duration,
    /// Hard ceiling on the whole download, regardless of progress.
    pub total_download: Duration,
    /// Wall clock allowed to the extraction process before it is killed.
    pub extraction: Duration,
    /// How long a stability wait may poll before giving up.
    pub stability: Duration,
}

impl Default for TimeoutBudget {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            inactivity: Duration::from_secs(15),
            total_download: Duration::from_secs(60),
            extraction: Duration::from_secs(30),
            stability: Duration::from_secs(5),
        }
    }
}

impl TimeoutBudget {
    #[must_use]
    pub fn with_connect(mut self, limit: Duration) -> Self {
        self.connect = limit;
        self
    }

    #[must_use]
    pub fn with_inactivity(mut self, limit: Duration) -> Self {
        self.inactivity = limit;
        self
    }

    #[must_use]
    pub fn with_total_download(mut self, limit: Duration) -> Self {
        self.total_download = limit;
        self
    }

    #[must_use]
    pub fn with_extraction(mut self, limit: Duration) -> Self {
        self.extraction = limit;
        self
    }

    #[must_use]
    pub fn with_stability(mut self, limit: Duration) -> Self {
        self.stability = limit;
        self
    }
}

/// Output settings for the extracted frame.
///
/// Frames are always downscaled so that neither side exceeds
/// `max_dimension`, preserving the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSettings {
    /// Upper bound for the longer side of the output image, in pixels.
    pub max_dimension: u32,
    /// ffmpeg JPEG quality scale, 2 (best) to 31 (worst).
    pub jpeg_quality: u8,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            max_dimension: 640,
            jpeg_quality: 3,
        }
    }
}

/// File-name prefix shared by every scratch file the pipeline creates.
pub const SCRATCH_PREFIX: &str = "framegrab-";

/// Configuration for a [`FramePipeline`](crate::FramePipeline).
///
/// All fields have sensible defaults; a default-constructed value allows two
/// concurrent captures of sources up to 100 MiB.
#[derive(Clone)]
pub struct PipelineOptions {
    pub(crate) timeouts: TimeoutBudget,
    pub(crate) capacity: usize,
    pub(crate) max_download_bytes: u64,
    pub(crate) min_download_bytes: u64,
    pub(crate) min_output_bytes: u64,
    pub(crate) scratch_dir: PathBuf,
    pub(crate) ffmpeg_path: PathBuf,
    pub(crate) frame: FrameSettings,
    pub(crate) poll_interval: Duration,
    pub(crate) required_stable_checks: u32,
    pub(crate) retry_after: Duration,
    pub(crate) progress: Arc<dyn ProgressCallback>,
}

impl Debug for PipelineOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineOptions")
            .field("timeouts", &self.timeouts)
            .field("capacity", &self.capacity)
            .field("max_download_bytes", &self.max_download_bytes)
            .field("min_download_bytes", &self.min_download_bytes)
            .field("min_output_bytes", &self.min_output_bytes)
            .field("scratch_dir", &self.scratch_dir)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("frame", &self.frame)
            .field("poll_interval", &self.poll_interval)
            .field("required_stable_checks", &self.required_stable_checks)
            .field("retry_after", &self.retry_after)
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            timeouts: TimeoutBudget::default(),
            capacity: 2,
            max_download_bytes: 100 * 1024 * 1024,
            min_download_bytes: 1024,
            min_output_bytes: 1000,
            scratch_dir: std::env::temp_dir().join("framegrab"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            frame: FrameSettings::default(),
            poll_interval: Duration::from_millis(100),
            required_stable_checks: 3,
            retry_after: Duration::from_secs(5),
            progress: Arc::new(NoOpProgress),
        }
    }

    /// Replace the whole timeout budget.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutBudget) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Maximum number of captures in flight at once.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Abort downloads once they cross this many bytes.
    #[must_use]
    pub fn with_max_download_bytes(mut self, bytes: u64) -> Self {
        self.max_download_bytes = bytes;
        self
    }

    /// Reject downloads smaller than this as corrupt.
    #[must_use]
    pub fn with_min_download_bytes(mut self, bytes: u64) -> Self {
        self.min_download_bytes = bytes;
        self
    }

    /// Reject extracted images smaller than this.
    #[must_use]
    pub fn with_min_output_bytes(mut self, bytes: u64) -> Self {
        self.min_output_bytes = bytes;
        self
    }

    /// Directory that holds per-request scratch files.
    ///
    /// Created on first use if missing.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Path or name of the ffmpeg executable. Defaults to `ffmpeg` on `PATH`.
    #[must_use]
    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Set the frame output settings.
    #[must_use]
    pub fn with_frame_settings(mut self, frame: FrameSettings) -> Self {
        self.frame = frame;
        self
    }

    /// Interval between two size probes of a stability wait.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Consecutive identical, non-zero size observations required before a
    /// file counts as stable. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_required_stable_checks(mut self, checks: u32) -> Self {
        self.required_stable_checks = checks.max(1);
        self
    }

    /// Delay suggested to rejected callers.
    #[must_use]
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = delay;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    pub fn timeouts(&self) -> &TimeoutBudget {
        &self.timeouts
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }

    /// Stability-wait settings derived from the poll settings and budget.
    pub(crate) fn stability_options(&self) -> StabilityOptions {
        StabilityOptions {
            poll_interval: self.poll_interval,
            required_checks: self.required_stable_checks,
            timeout: self.timeouts.stability,
        }
    }

    /// Check the options for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), GrabError> {
        if self.capacity == 0 {
            return Err(GrabError::InvalidConfiguration(
                "capacity must be at least 1".to_string(),
            ));
        }

        let budget = &self.timeouts;
        let limits = [
            ("connect", budget.connect),
            ("inactivity", budget.inactivity),
            ("total download", budget.total_download),
            ("extraction", budget.extraction),
            ("stability", budget.stability),
            ("poll interval", self.poll_interval),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, limit)| limit.is_zero()) {
            return Err(GrabError::InvalidConfiguration(format!(
                "{name} timeout must be greater than zero"
            )));
        }

        if self.min_download_bytes > self.max_download_bytes {
            return Err(GrabError::InvalidConfiguration(format!(
                "minimum download size ({}) exceeds maximum ({})",
                self.min_download_bytes, self.max_download_bytes,
            )));
        }

        if self.frame.max_dimension == 0 {
            return Err(GrabError::InvalidConfiguration(
                "max frame dimension must be greater than zero".to_string(),
            ));
        }

        if !(2..=31).contains(&self.frame.jpeg_quality) {
            return Err(GrabError::InvalidConfiguration(format!(
                "jpeg quality must be between 2 and 31, got {}",
                self.frame.jpeg_quality
            )));
        }

        Ok(())
    }
}
