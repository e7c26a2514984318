//! Bounded remote downloads.
//!
//! [`Fetcher`] streams a remote resource to a local file while enforcing
//! four independent limits:
//!
//! - the remote must start responding within the connect budget,
//! - the body may not exceed the size cap (checked per chunk, before the
//!   chunk is written),
//! - no gap between two chunks may exceed the inactivity budget,
//! - the whole transfer may not exceed the total budget, however steady.
//!
//! Whichever limit trips first aborts the transfer: the response is dropped
//! (tearing down the connection) and writing stops. The partial file is left
//! for the caller's cleanup. Local file I/O counts against the total budget
//! too, so a wedged disk cannot hold a slot past it.

use std::path::Path;
use std::pin::pin;
use std::sync::Arc;

use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use url::Url;

use crate::configuration::{PipelineOptions, TimeoutBudget};
use crate::error::GrabError;
use crate::pipeline::PipelineStage;
use crate::progress::{CancellationToken, ProgressCallback, ProgressTracker};

/// Streams remote videos to disk under a [`TimeoutBudget`] and size cap.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    timeouts: TimeoutBudget,
    max_bytes: u64,
    min_bytes: u64,
    progress: Arc<dyn ProgressCallback>,
}

impl Fetcher {
    /// Build a fetcher from pipeline options.
    pub fn new(options: &PipelineOptions) -> Result<Self, GrabError> {
        let client = Client::builder()
            .connect_timeout(options.timeouts.connect)
            .user_agent(concat!("framegrab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| {
                GrabError::InvalidConfiguration(format!("cannot build HTTP client: {error}"))
            })?;

        Ok(Self {
            client,
            timeouts: options.timeouts,
            max_bytes: options.max_download_bytes,
            min_bytes: options.min_download_bytes,
            progress: Arc::clone(&options.progress),
        })
    }

    /// Download `url` into `destination`, returning the number of bytes
    /// written.
    ///
    /// `destination` is created (or truncated). On error it may hold a
    /// partial body and must be treated as not ready.
    pub async fn fetch(
        &self,
        request_id: &str,
        url: &Url,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, GrabError> {
        let started = Instant::now();
        let deadline = started + self.timeouts.total_download;

        log::debug!("[{request_id}] GET {url}");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GrabError::Cancelled),
            sent = tokio::time::timeout(self.timeouts.connect, self.client.get(url.clone()).send()) => {
                match sent {
                    Err(_) => return Err(GrabError::ConnectTimeout(self.timeouts.connect)),
                    Ok(Err(error)) if error.is_timeout() => {
                        return Err(GrabError::ConnectTimeout(self.timeouts.connect));
                    }
                    Ok(Err(error)) => return Err(error.into()),
                    Ok(Ok(response)) => response,
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(GrabError::UpstreamStatus(status.as_u16()));
        }

        let declared = response.content_length();
        if let Some(declared) = declared.filter(|&length| length > self.max_bytes) {
            return Err(GrabError::TooLarge {
                limit: self.max_bytes,
                seen: declared,
            });
        }

        let over_budget = |bytes: u64| GrabError::DownloadTimeout {
            budget: self.timeouts.total_download,
            bytes,
        };

        let mut file = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GrabError::Cancelled),
            created = tokio::time::timeout_at(deadline, tokio::fs::File::create(destination)) => {
                created.map_err(|_| over_budget(0))??
            }
        };
        let mut body = pin!(response.bytes_stream());
        let mut tracker = ProgressTracker::new(
            Arc::clone(&self.progress),
            request_id,
            PipelineStage::Downloading,
            declared,
        );
        let mut received: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GrabError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Err(over_budget(received)),
                next = tokio::time::timeout(self.timeouts.inactivity, body.next()) => next,
            };

            let chunk = match next {
                Err(_) => {
                    return Err(GrabError::DownloadStalled {
                        idle: self.timeouts.inactivity,
                        bytes: received,
                    });
                }
                Ok(None) => break,
                Ok(Some(Err(error))) => return Err(error.into()),
                Ok(Some(Ok(chunk))) => chunk,
            };

            let total = received + chunk.len() as u64;
            if total > self.max_bytes {
                log::debug!("[{request_id}] size cap crossed at {total} bytes");
                return Err(GrabError::TooLarge {
                    limit: self.max_bytes,
                    seen: total,
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GrabError::Cancelled),
                written = tokio::time::timeout_at(deadline, file.write_all(&chunk)) => {
                    written.map_err(|_| over_budget(received))??;
                }
            }
            received = total;
            tracker.advance(chunk.len() as u64);
        }

        tokio::time::timeout_at(deadline, file.flush())
            .await
            .map_err(|_| over_budget(received))??;
        drop(file);

        if received < self.min_bytes {
            return Err(GrabError::CorruptDownload {
                bytes: received,
                minimum: self.min_bytes,
            });
        }

        log::debug!(
            "[{request_id}] downloaded {received} bytes in {:?}",
            started.elapsed()
        );
        Ok(received)
    }
}
