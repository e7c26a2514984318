//! File stability waiting.
//!
//! A writer process exiting does not always mean the filesystem already
//! reports the final size of what it wrote. [`wait_stable`] polls a path
//! until its size has been identical and non-zero for a number of
//! consecutive checks, and only then hands back the [`FileStats`].
//!
//! The decision logic lives in [`StabilityTracker`], which is pure and can
//! be fed arbitrary observations.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::GrabError;
use crate::poll::poll_until;

/// Settings for one stability wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityOptions {
    /// Delay between two size probes.
    pub poll_interval: Duration,
    /// Consecutive identical, non-zero observations needed.
    pub required_checks: u32,
    /// Give up after this long.
    pub timeout: Duration,
}

impl Default for StabilityOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            required_checks: 3,
            timeout: Duration::from_secs(5),
        }
    }
}

/// What a successful stability wait observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    /// Final size of the file in bytes.
    pub size: u64,
    /// Number of probes taken.
    pub checks: u32,
    /// Time spent waiting.
    pub waited: Duration,
}

/// Tracks consecutive size observations of one file.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    required: u32,
    last_size: Option<u64>,
    consecutive: u32,
    observations: u32,
}

impl StabilityTracker {
    /// `required` is clamped to at least 1.
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            last_size: None,
            consecutive: 0,
            observations: 0,
        }
    }

    /// Feed one probe result (`None` when the file does not exist yet) and
    /// report whether the file is now considered stable.
    ///
    /// The first sighting of a size counts as one check, so with
    /// `required == 1` any non-zero size is immediately stable.
    pub fn observe(&mut self, size: Option<u64>) -> bool {
        self.observations += 1;

        match size {
            Some(size) if size > 0 => {
                if self.last_size == Some(size) {
                    self.consecutive += 1;
                } else {
                    self.last_size = Some(size);
                    self.consecutive = 1;
                }
            }
            _ => {
                self.last_size = None;
                self.consecutive = 0;
            }
        }

        self.is_stable()
    }

    /// Whether enough consecutive identical non-zero sizes have been seen.
    pub fn is_stable(&self) -> bool {
        self.consecutive >= self.required
    }

    /// The size last seen, if any.
    pub fn last_size(&self) -> Option<u64> {
        self.last_size
    }

    /// Number of observations so far.
    pub fn observations(&self) -> u32 {
        self.observations
    }
}

/// Poll `path` until its size is stable, or fail with
/// [`GrabError::FileNotStable`] once `options.timeout` has elapsed.
///
/// A path that does not exist yet keeps the wait going; it is not an
/// immediate failure.
pub async fn wait_stable(path: &Path, options: StabilityOptions) -> Result<FileStats, GrabError> {
    let started = Instant::now();
    let tracker = Mutex::new(StabilityTracker::new(options.required_checks));
    let tracker = &tracker;

    let outcome = poll_until(options.poll_interval, options.timeout, move || async move {
        let size = probe_size(path).await;
        let mut tracker = tracker.lock().unwrap_or_else(PoisonError::into_inner);
        tracker.observe(size).then(|| FileStats {
            size: size.unwrap_or_default(),
            checks: tracker.observations(),
            waited: started.elapsed(),
        })
    })
    .await;

    match outcome {
        Some(stats) => {
            log::debug!(
                "{} stable at {} bytes after {} checks",
                path.display(),
                stats.size,
                stats.checks,
            );
            Ok(stats)
        }
        None => Err(GrabError::FileNotStable {
            path: path.to_path_buf(),
            waited: started.elapsed(),
        }),
    }
}

async fn probe_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Some(metadata.len()),
        Ok(_) => None,
        Err(error) if error.kind() == ErrorKind::NotFound => None,
        Err(error) => {
            log::debug!("Probing {} failed: {error}", path.display());
            None
        }
    }
}
