//! The capture pipeline.
//!
//! [`FramePipeline`] turns one [`FrameRequest`] into either a [`FrameCapture`]
//! or a [`GrabError`], moving through the stages of [`PipelineStage`] in a
//! fixed order:
//!
//! ```text
//! Admitted → Downloading → InputStabilizing → Extracting
//!          → OutputStabilizing → Reading → Completed
//! ```
//!
//! Any stage may fail, which ends the pipeline in `Failed(kind)`. Whatever
//! the outcome, scratch files are removed and the admission slot is released
//! before the result is returned. Stages are never retried individually.
//!
//! # Example
//!
//! ```no_run
//! use framegrab::{FramePipeline, FrameRequest, GrabError, PipelineOptions};
//!
//! # async fn example() -> Result<(), GrabError> {
//! let pipeline = FramePipeline::new(PipelineOptions::new().with_capacity(1))?;
//! let request = FrameRequest::parse("https://example.com/clip.mp4", Some(1.0), false)?;
//! let capture = pipeline.capture(&request).await?;
//! std::fs::write("frame.jpg", &capture.bytes)?;
//! # Ok(())
//! # }
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::ImageReader;
use tokio::time::Instant;

use crate::admission::AdmissionQueue;
use crate::cleanup::ScratchGuard;
use crate::configuration::PipelineOptions;
use crate::error::{FailureKind, GrabError};
use crate::extract::FrameExtractor;
use crate::fetch::Fetcher;
use crate::progress::{CancellationToken, ProgressCallback, ProgressTracker};
use crate::request::{FrameRequest, OutputFormat};
use crate::response::{CapturePayload, ErrorPayload};
use crate::scratch::ScratchPaths;
use crate::stability::wait_stable;

/// Content type of every captured frame.
pub const CONTENT_TYPE: &str = "image/jpeg";

/// Where a request currently is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Admitted,
    Downloading,
    InputStabilizing,
    Extracting,
    OutputStabilizing,
    Reading,
    Completed,
    Failed(FailureKind),
}

impl PipelineStage {
    /// `true` for `Completed` and `Failed(_)`.
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Completed | PipelineStage::Failed(_))
    }
}

impl Display for PipelineStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PipelineStage::Admitted => f.write_str("admitted"),
            PipelineStage::Downloading => f.write_str("downloading"),
            PipelineStage::InputStabilizing => f.write_str("input-stabilizing"),
            PipelineStage::Extracting => f.write_str("extracting"),
            PipelineStage::OutputStabilizing => f.write_str("output-stabilizing"),
            PipelineStage::Reading => f.write_str("reading"),
            PipelineStage::Completed => f.write_str("completed"),
            PipelineStage::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

/// A successfully captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameCapture {
    pub request_id: String,
    /// JPEG-encoded image.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Time from admission to completion.
    pub elapsed: Duration,
}

impl FrameCapture {
    /// Size of the JPEG in bytes.
    pub fn byte_length(&self) -> usize {
        self.bytes.len()
    }
}

/// What the HTTP collaborator sends back for one request.
#[derive(Debug, Clone)]
pub enum PipelineResponse {
    /// Raw image bytes, served as [`CONTENT_TYPE`].
    Image(FrameCapture),
    /// The image embedded in a structured payload.
    Inline(CapturePayload),
    /// Any failure, admission rejections included.
    Failure(ErrorPayload),
}

/// Walks one request through the stages and reports transitions.
struct StageTracker {
    request_id: String,
    current: PipelineStage,
    progress: Arc<dyn ProgressCallback>,
}

impl StageTracker {
    fn new(request_id: &str, progress: Arc<dyn ProgressCallback>) -> Self {
        let tracker = Self {
            request_id: request_id.to_string(),
            current: PipelineStage::Admitted,
            progress,
        };
        tracker.announce();
        tracker
    }

    fn enter(&mut self, stage: PipelineStage) {
        log::debug!("[{}] {} -> {stage}", self.request_id, self.current);
        self.current = stage;
        self.announce();
    }

    fn fail(&mut self, error: &GrabError) {
        log::warn!(
            "[{}] failed during {}: {error}",
            self.request_id,
            self.current
        );
        self.current = PipelineStage::Failed(error.kind());
        self.announce();
    }

    fn announce(&self) {
        ProgressTracker::new(
            Arc::clone(&self.progress),
            &self.request_id,
            self.current,
            None,
        )
        .report();
    }
}

/// Bounded-concurrency fetch-and-extract pipeline.
///
/// Construct once at startup and share (e.g. behind an [`Arc`]); every
/// capture goes through the same [`AdmissionQueue`].
pub struct FramePipeline {
    options: PipelineOptions,
    admission: AdmissionQueue,
    fetcher: Fetcher,
    extractor: FrameExtractor,
}

impl FramePipeline {
    /// Validate `options` and build the pipeline.
    pub fn new(options: PipelineOptions) -> Result<Self, GrabError> {
        options.validate()?;
        let admission = AdmissionQueue::new(options.capacity);
        let fetcher = Fetcher::new(&options)?;
        let extractor = FrameExtractor::from_options(&options);

        Ok(Self {
            options,
            admission,
            fetcher,
            extractor,
        })
    }

    /// The validated options this pipeline was built with.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// The shared admission gate, for diagnostics.
    pub fn admission(&self) -> &AdmissionQueue {
        &self.admission
    }

    /// Capture the frame described by `request`.
    pub async fn capture(&self, request: &FrameRequest) -> Result<FrameCapture, GrabError> {
        self.capture_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Capture with a token that aborts the request when cancelled.
    ///
    /// Cancellation is honoured in every stage: the running stage is
    /// dropped (killing ffmpeg if it is up), scratch files are removed and
    /// the slot is released before [`GrabError::Cancelled`] is returned.
    ///
    /// Requests that find every slot taken fail immediately with
    /// [`GrabError::AdmissionRejected`] without touching the network or
    /// the filesystem.
    pub async fn capture_with_cancel(
        &self,
        request: &FrameRequest,
        cancel: &CancellationToken,
    ) -> Result<FrameCapture, GrabError> {
        let Some(mut permit) = self.admission.try_admit() else {
            return Err(GrabError::AdmissionRejected {
                capacity: self.admission.capacity(),
                retry_after: self.options.retry_after,
            });
        };

        let started = Instant::now();
        let mut stages = StageTracker::new(request.id(), Arc::clone(&self.options.progress));
        log::debug!("[{}] admitted: {request}", request.id());

        let result = match ScratchPaths::prepare(&self.options.scratch_dir, request.id()).await {
            Ok(paths) => {
                let guard = ScratchGuard::new(paths);
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(GrabError::Cancelled),
                    result = self.run_stages(request, guard.paths(), cancel, &mut stages, started) => result,
                };
                guard.cleanup().await;
                result
            }
            Err(error) => Err(GrabError::from(error)),
        };

        match &result {
            Ok(capture) => {
                stages.enter(PipelineStage::Completed);
                permit.record_success();
                log::info!(
                    "[{}] captured {} bytes ({}x{}) in {:?}",
                    capture.request_id,
                    capture.byte_length(),
                    capture.width,
                    capture.height,
                    capture.elapsed,
                );
            }
            Err(error) => {
                stages.fail(error);
                permit.record_failure();
            }
        }

        permit.release();
        result
    }

    async fn run_stages(
        &self,
        request: &FrameRequest,
        paths: &ScratchPaths,
        cancel: &CancellationToken,
        stages: &mut StageTracker,
        started: Instant,
    ) -> Result<FrameCapture, GrabError> {
        let stability = self.options.stability_options();

        stages.enter(PipelineStage::Downloading);
        self.fetcher
            .fetch(request.id(), request.url(), &paths.input, cancel)
            .await?;

        stages.enter(PipelineStage::InputStabilizing);
        wait_stable(&paths.input, stability).await?;

        stages.enter(PipelineStage::Extracting);
        self.extractor
            .extract_frame(
                &paths.input,
                &paths.output,
                request.timestamp_seconds(),
                self.options.timeouts.extraction,
            )
            .await?;

        stages.enter(PipelineStage::OutputStabilizing);
        wait_stable(&paths.output, stability).await?;

        stages.enter(PipelineStage::Reading);
        let bytes = tokio::fs::read(&paths.output).await?;
        if (bytes.len() as u64) < self.options.min_output_bytes {
            return Err(GrabError::OutputTooSmall {
                bytes: bytes.len() as u64,
                minimum: self.options.min_output_bytes,
            });
        }
        let (width, height) = image_dimensions(&bytes)?;

        Ok(FrameCapture {
            request_id: request.id().to_string(),
            bytes,
            width,
            height,
            elapsed: started.elapsed(),
        })
    }

    /// Run a capture and shape the outcome the way the HTTP collaborator
    /// returns it: raw bytes, an inline payload, or a failure payload.
    pub async fn respond(&self, request: &FrameRequest) -> PipelineResponse {
        let started = Instant::now();
        match self.capture(request).await {
            Ok(capture) => match request.format() {
                OutputFormat::Raw => PipelineResponse::Image(capture),
                OutputFormat::Inline => PipelineResponse::Inline(CapturePayload::from(&capture)),
            },
            Err(error) => PipelineResponse::Failure(ErrorPayload::new(
                Some(request.id()),
                &error,
                started.elapsed(),
            )),
        }
    }
}

fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32), GrabError> {
    let not_an_image = |detail: String| GrabError::ExtractionFailed {
        message: format!("extracted file is not a readable image: {detail}"),
        diagnostics: None,
    };

    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|error| not_an_image(error.to_string()))?
        .into_dimensions()
        .map_err(|error| not_an_image(error.to_string()))
}
