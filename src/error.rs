//! Error types for the `framegrab` crate.
//!
//! This module defines [`GrabError`], the unified error type returned by every
//! pipeline stage, and [`FailureKind`], the closed classification callers use
//! to decide how to react. Each error maps to exactly one kind, and whether a
//! failure is worth retrying is derived from that kind alone.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::{io::Error as IoError, path::PathBuf, time::Duration};

use serde::Serialize;
use thiserror::Error;

/// Closed classification of pipeline failures.
///
/// The serialized form (`snake_case`) is what the HTTP collaborator exposes
/// as the `error` field of a failure payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing or malformed URL, or an invalid timestamp.
    InvalidInput,
    /// Every admission slot is taken.
    AdmissionRejected,
    /// The remote did not respond in time, or the download overran its
    /// total budget.
    DownloadTimeout,
    /// The connection opened but stopped delivering bytes.
    DownloadStalled,
    /// The source exceeded the configured size cap.
    TooLarge,
    /// Transport failure, non-success status, or an implausibly small body.
    CorruptDownload,
    /// The extraction process overran its wall clock and was killed.
    ExtractionTimeout,
    /// The extraction process failed or produced something unusable.
    ExtractionFailed,
    /// A file never reached a stable size.
    OutputTimeout,
    /// The extracted image is too small to be a real frame.
    OutputTooSmall,
    /// Anything unexpected (I/O on scratch files, cancellation, ...).
    Internal,
}

impl FailureKind {
    /// Whether resending the same request later might succeed.
    ///
    /// Timeouts, stalls, connection-class failures and a full admission
    /// queue are transient. Bad input, oversized sources and deterministic
    /// decode failures are not.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::AdmissionRejected
                | FailureKind::DownloadTimeout
                | FailureKind::DownloadStalled
                | FailureKind::CorruptDownload
                | FailureKind::ExtractionTimeout
                | FailureKind::OutputTimeout
        )
    }

    /// Stable machine-readable name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::InvalidInput => "invalid_input",
            FailureKind::AdmissionRejected => "admission_rejected",
            FailureKind::DownloadTimeout => "download_timeout",
            FailureKind::DownloadStalled => "download_stalled",
            FailureKind::TooLarge => "too_large",
            FailureKind::CorruptDownload => "corrupt_download",
            FailureKind::ExtractionTimeout => "extraction_timeout",
            FailureKind::ExtractionFailed => "extraction_failed",
            FailureKind::OutputTimeout => "output_timeout",
            FailureKind::OutputTooSmall => "output_too_small",
            FailureKind::Internal => "internal",
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// The unified error type for all `framegrab` operations.
///
/// Variants carry enough context to diagnose the problem without additional
/// logging at the call site. Use [`GrabError::kind`] to classify.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GrabError {
    /// The request was rejected before any resource was consumed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No admission slot was free.
    #[error("Server busy: all {capacity} processing slots are in use, retry in {retry_after:?}")]
    AdmissionRejected {
        /// Configured number of slots.
        capacity: usize,
        /// Suggested delay before the caller tries again.
        retry_after: Duration,
    },

    /// The remote did not start responding within the connect budget.
    #[error("Source did not respond within {0:?}")]
    ConnectTimeout(Duration),

    /// The download overran its total budget.
    #[error("Download exceeded total budget of {budget:?} after {bytes} bytes")]
    DownloadTimeout {
        /// Configured total download budget.
        budget: Duration,
        /// Bytes received before the budget ran out.
        bytes: u64,
    },

    /// No bytes arrived for longer than the inactivity budget.
    #[error("Download stalled: no data for {idle:?} after {bytes} bytes")]
    DownloadStalled {
        /// Configured inactivity budget.
        idle: Duration,
        /// Bytes received before the stall.
        bytes: u64,
    },

    /// The source is larger than the configured cap.
    #[error("Source exceeds size limit of {limit} bytes (saw at least {seen})")]
    TooLarge {
        /// Configured cap in bytes.
        limit: u64,
        /// Bytes declared or received when the cap was crossed.
        seen: u64,
    },

    /// The upstream responded with a non-success status.
    #[error("Source responded with HTTP {0}")]
    UpstreamStatus(u16),

    /// The transport failed mid-flight.
    #[error("Download failed: {0}")]
    Transport(String),

    /// The download completed but is too small to be a real video.
    #[error("Downloaded file is implausibly small ({bytes} bytes, need at least {minimum})")]
    CorruptDownload {
        /// Size of the downloaded file.
        bytes: u64,
        /// Configured minimum.
        minimum: u64,
    },

    /// The extraction process was killed after overrunning its wall clock.
    #[error("Frame extraction timed out after {0:?}")]
    ExtractionTimeout(Duration),

    /// The extraction process failed to launch or exited unsuccessfully.
    #[error("Frame extraction failed: {message}")]
    ExtractionFailed {
        /// Summary of what went wrong.
        message: String,
        /// Tail of the process's standard error, if any.
        diagnostics: Option<String>,
    },

    /// A file never settled to a stable, non-zero size.
    #[error("File {path} did not stabilize within {waited:?}")]
    FileNotStable {
        /// The polled path.
        path: PathBuf,
        /// How long the waiter polled.
        waited: Duration,
    },

    /// The extracted image is smaller than the plausibility threshold.
    #[error("Extracted image is too small ({bytes} bytes, need at least {minimum})")]
    OutputTooSmall {
        /// Size of the extracted image.
        bytes: u64,
        /// Configured minimum.
        minimum: u64,
    },

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// Pipeline options failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An I/O error occurred on a scratch file.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),
}

impl GrabError {
    /// The failure classification of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            GrabError::InvalidInput(_) => FailureKind::InvalidInput,
            GrabError::AdmissionRejected { .. } => FailureKind::AdmissionRejected,
            GrabError::ConnectTimeout(_) | GrabError::DownloadTimeout { .. } => {
                FailureKind::DownloadTimeout
            }
            GrabError::DownloadStalled { .. } => FailureKind::DownloadStalled,
            GrabError::TooLarge { .. } => FailureKind::TooLarge,
            GrabError::UpstreamStatus(_)
            | GrabError::Transport(_)
            | GrabError::CorruptDownload { .. } => FailureKind::CorruptDownload,
            GrabError::ExtractionTimeout(_) => FailureKind::ExtractionTimeout,
            GrabError::ExtractionFailed { .. } => FailureKind::ExtractionFailed,
            GrabError::FileNotStable { .. } => FailureKind::OutputTimeout,
            GrabError::OutputTooSmall { .. } => FailureKind::OutputTooSmall,
            GrabError::Cancelled
            | GrabError::InvalidConfiguration(_)
            | GrabError::IoError(_) => FailureKind::Internal,
        }
    }

    /// Shorthand for `self.kind().is_retryable()`.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Suggested retry delay, only present for admission rejections.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GrabError::AdmissionRejected { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GrabError {
    fn from(error: reqwest::Error) -> Self {
        GrabError::Transport(error.to_string())
    }
}
