//! Serializable result shapes.
//!
//! [`CapturePayload`] and [`ErrorPayload`] are what the HTTP collaborator
//! (or the CLI's `--json` mode) writes out. [`PipelineFailure`] is the
//! in-process summary of a failed capture, with `retryable` derived from
//! the [`FailureKind`] rather than set by hand.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use crate::error::{FailureKind, GrabError};
use crate::pipeline::{CONTENT_TYPE, FrameCapture};

/// Summary of a failed capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineFailure {
    kind: FailureKind,
    message: String,
    elapsed: Duration,
}

impl PipelineFailure {
    /// Summarize `error`, which ended a capture after `elapsed`.
    pub fn from_error(error: &GrabError, elapsed: Duration) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            elapsed,
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// A captured frame embedded in a structured payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturePayload {
    pub request_id: String,
    pub content_type: &'static str,
    /// Standard base64 with padding.
    pub image_base64: String,
    pub byte_length: usize,
    pub width: u32,
    pub height: u32,
    pub elapsed_ms: u64,
}

impl From<&FrameCapture> for CapturePayload {
    fn from(capture: &FrameCapture) -> Self {
        Self {
            request_id: capture.request_id.clone(),
            content_type: CONTENT_TYPE,
            image_base64: STANDARD.encode(&capture.bytes),
            byte_length: capture.byte_length(),
            width: capture.width,
            height: capture.height,
            elapsed_ms: millis(capture.elapsed),
        }
    }
}

/// Structured failure body.
///
/// `retry_after_secs` is only present for admission rejections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub error: FailureKind,
    pub message: String,
    pub retryable: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ErrorPayload {
    /// `request_id` is `None` when the request failed validation before an
    /// identifier was assigned.
    pub fn new(request_id: Option<&str>, error: &GrabError, elapsed: Duration) -> Self {
        let failure = PipelineFailure::from_error(error, elapsed);
        Self {
            request_id: request_id.map(str::to_string),
            error: failure.kind(),
            message: failure.message().to_string(),
            retryable: failure.retryable(),
            elapsed_ms: millis(failure.elapsed()),
            retry_after_secs: error.retry_after().map(|delay| delay.as_secs().max(1)),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
