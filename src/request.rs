//! Per-request context.
//!
//! A [`FrameRequest`] is created once at pipeline entry from caller input,
//! validated up front so that bad input never consumes an admission slot,
//! and never mutated afterwards.

use std::fmt::{Display, Formatter, Result as FmtResult};

use url::Url;
use uuid::Uuid;

use crate::error::GrabError;

/// Timestamp used when the caller does not provide one.
pub const DEFAULT_TIMESTAMP_SECONDS: f64 = 5.0;

/// How a successful capture is handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Raw JPEG bytes.
    #[default]
    Raw,
    /// A structured payload embedding the bytes as base64.
    Inline,
}

/// Immutable description of one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRequest {
    id: String,
    url: Url,
    timestamp_seconds: f64,
    format: OutputFormat,
}

impl FrameRequest {
    /// Validate caller input and build a request with a fresh identifier.
    ///
    /// `video_url` must parse as an absolute `http` or `https` URL with a
    /// host. `timestamp_seconds` defaults to
    /// [`DEFAULT_TIMESTAMP_SECONDS`] and must be finite and non-negative.
    pub fn parse(
        video_url: &str,
        timestamp_seconds: Option<f64>,
        inline: bool,
    ) -> Result<Self, GrabError> {
        let url = parse_video_url(video_url)?;
        let timestamp_seconds = validate_timestamp(timestamp_seconds)?;
        let format = if inline {
            OutputFormat::Inline
        } else {
            OutputFormat::Raw
        };

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            url,
            timestamp_seconds,
            format,
        })
    }

    /// Replace the generated identifier with a caller-supplied one.
    ///
    /// The identifier ends up in scratch file names, so only ASCII
    /// alphanumerics, `-` and `_` are accepted.
    pub fn with_id(mut self, id: impl Into<String>) -> Result<Self, GrabError> {
        let id = id.into();
        if id.is_empty() || id.len() > 64 {
            return Err(GrabError::InvalidInput(
                "request id must be 1 to 64 characters".to_string(),
            ));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(GrabError::InvalidInput(format!(
                "request id contains unsupported characters: {id}"
            )));
        }
        self.id = id;
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn timestamp_seconds(&self) -> f64 {
        self.timestamp_seconds
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

impl Display for FrameRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} ({} @ {}s)", self.id, self.url, self.timestamp_seconds)
    }
}

fn parse_video_url(value: &str) -> Result<Url, GrabError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GrabError::InvalidInput("video URL is required".to_string()));
    }

    let url = Url::parse(trimmed)
        .map_err(|error| GrabError::InvalidInput(format!("invalid video URL: {error}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(GrabError::InvalidInput(format!(
                "unsupported URL scheme: {other}"
            )));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(GrabError::InvalidInput(
            "video URL has no host".to_string(),
        ));
    }

    Ok(url)
}

fn validate_timestamp(value: Option<f64>) -> Result<f64, GrabError> {
    let seconds = value.unwrap_or(DEFAULT_TIMESTAMP_SECONDS);
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(GrabError::InvalidInput(format!(
            "timestamp must be a non-negative number of seconds, got {seconds}"
        )));
    }
    Ok(seconds)
}
