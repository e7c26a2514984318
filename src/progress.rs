//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for observing a capture as it
//! moves through the pipeline, [`CancellationToken`] for cooperative
//! cancellation, and [`ProgressInfo`] for progress snapshots.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framegrab::{PipelineOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         match info.percentage {
//!             Some(pct) => println!("[{}] {pct:.1}%", info.stage),
//!             None => println!("[{}] {} bytes", info.stage, info.bytes),
//!         }
//!     }
//! }
//!
//! let options = PipelineOptions::new().with_progress(Arc::new(PrintProgress));
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::pipeline::PipelineStage;

/// A snapshot of pipeline progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Identifier of the request being processed.
    pub request_id: String,
    /// The stage that produced this snapshot.
    pub stage: PipelineStage,
    /// Bytes transferred so far (download stage only, zero otherwise).
    pub bytes: u64,
    /// Bytes expected, if the source declared a length.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the stage started.
    pub elapsed: Duration,
}

/// Trait for receiving progress updates during a capture.
///
/// Implementations must be [`Send`] and [`Sync`] because callbacks are
/// invoked from whichever runtime worker drives the pipeline.
///
/// Progress callbacks are **infallible**: they observe but cannot halt
/// the operation. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called on stage transitions and while bytes arrive.
    fn on_progress(&self, info: &ProgressInfo);
}

/// A no-op implementation that discards all progress notifications.
///
/// This is the default when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative, awaitable cancellation token.
///
/// Clone this token and share it between tasks; call
/// [`cancel`](CancellationToken::cancel) from anywhere to abort the
/// associated download. Long-running stages race their work against
/// [`cancelled`](CancellationToken::cancelled).
///
/// # Example
///
/// ```
/// use framegrab::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token observe the cancellation, and every task
    /// parked in [`cancelled`](CancellationToken::cancelled) wakes up.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent `cancel`
            // cannot slip between the check and the await.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal helper that tracks byte progress for one stage and emits
/// callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    request_id: String,
    stage: PipelineStage,
    total: Option<u64>,
    current: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        request_id: &str,
        stage: PipelineStage,
        total: Option<u64>,
    ) -> Self {
        Self {
            callback,
            request_id: request_id.to_string(),
            stage,
            total,
            current: 0,
            start_time: Instant::now(),
        }
    }

    /// Record `bytes` more bytes and report.
    pub(crate) fn advance(&mut self, bytes: u64) {
        self.current += bytes;
        self.report();
    }

    /// Emit a snapshot without advancing, e.g. on a stage transition.
    pub(crate) fn report(&self) {
        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| ((self.current as f64 / t as f64) * 100.0).min(100.0) as f32);

        let info = ProgressInfo {
            request_id: self.request_id.clone(),
            stage: self.stage,
            bytes: self.current,
            total: self.total,
            percentage,
            elapsed: self.start_time.elapsed(),
        };

        self.callback.on_progress(&info);
    }
}
