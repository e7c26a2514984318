//! # framegrab
//!
//! Grab a single still frame from a remote video.
//!
//! `framegrab` downloads a video from an HTTP(S) URL, runs the `ffmpeg`
//! command-line tool to pull one JPEG frame at a chosen timestamp, and hands
//! the image back. Every stage runs under its own limit, so one slow or
//! hostile source cannot tie up the host:
//!
//! - an **admission gate** caps how many captures run at once and rejects
//!   the rest immediately,
//! - the **download** is bounded by a connect timeout, an inactivity timeout,
//!   a total budget and a size cap,
//! - **extraction** is a child process killed outright when it overruns,
//! - **stability waits** make sure a file has stopped growing before it is
//!   used,
//! - **scratch files** are removed on every exit path.
//!
//! ## Quick Start
//!
//! ```no_run
//! use framegrab::{FramePipeline, FrameRequest, GrabError, PipelineOptions};
//!
//! # async fn example() -> Result<(), GrabError> {
//! let pipeline = FramePipeline::new(PipelineOptions::new())?;
//! let request = FrameRequest::parse("https://example.com/clip.mp4", Some(2.5), false)?;
//!
//! match pipeline.capture(&request).await {
//!     Ok(frame) => println!("{}x{}, {} bytes", frame.width, frame.height, frame.byte_length()),
//!     Err(error) if error.is_retryable() => eprintln!("try again later: {error}"),
//!     Err(error) => eprintln!("giving up: {error}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Tuning limits
//!
//! ```
//! use std::time::Duration;
//!
//! use framegrab::{PipelineOptions, TimeoutBudget};
//!
//! let options = PipelineOptions::new()
//!     .with_capacity(4)
//!     .with_max_download_bytes(50 * 1024 * 1024)
//!     .with_timeouts(
//!         TimeoutBudget::default()
//!             .with_inactivity(Duration::from_secs(5))
//!             .with_extraction(Duration::from_secs(10)),
//!     );
//! assert!(options.validate().is_ok());
//! ```
//!
//! ## Requirements
//!
//! An `ffmpeg` binary must be reachable, either on `PATH` or through
//! [`PipelineOptions::with_ffmpeg_path`].

pub mod admission;
pub mod cleanup;
pub mod configuration;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod pipeline;
pub mod poll;
pub mod process;
pub mod progress;
pub mod request;
pub mod response;
pub mod scratch;
pub mod stability;

pub use admission::{AdmissionPermit, AdmissionQueue, AdmissionStats};
pub use cleanup::{ScratchGuard, remove_scratch, spawn_sweeper, sweep_stale};
pub use configuration::{FrameSettings, PipelineOptions, SCRATCH_PREFIX, TimeoutBudget};
pub use error::{FailureKind, GrabError};
pub use extract::FrameExtractor;
pub use fetch::Fetcher;
pub use pipeline::{CONTENT_TYPE, FrameCapture, FramePipeline, PipelineResponse, PipelineStage};
pub use poll::poll_until;
pub use process::{ExtractorProcess, ProcessOutcome, ProcessOutput};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use request::{DEFAULT_TIMESTAMP_SECONDS, FrameRequest, OutputFormat};
pub use response::{CapturePayload, ErrorPayload, PipelineFailure};
pub use scratch::ScratchPaths;
pub use stability::{FileStats, StabilityOptions, StabilityTracker, wait_stable};
