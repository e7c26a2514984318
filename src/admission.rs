//! Admission control.
//!
//! [`AdmissionQueue`] caps how many captures run end-to-end at the same
//! time. It never buffers: a request that finds every slot taken is turned
//! away immediately, and the caller is expected to try again later.
//!
//! # Example
//!
//! ```
//! use framegrab::AdmissionQueue;
//!
//! let queue = AdmissionQueue::new(1);
//! let permit = queue.try_admit().expect("first request is admitted");
//! assert!(queue.try_admit().is_none());
//!
//! drop(permit);
//! assert!(queue.try_admit().is_some());
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use serde::Serialize;

/// Snapshot of admission counters for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionStats {
    /// Configured number of slots.
    pub capacity: usize,
    /// Slots currently held.
    pub in_flight: usize,
    /// Admitted requests that completed successfully.
    pub processed: u64,
    /// Admitted requests that ended in a failure.
    pub failed: u64,
    /// Requests turned away because every slot was taken.
    pub rejected: u64,
}

#[derive(Debug)]
struct QueueState {
    capacity: usize,
    in_flight: AtomicUsize,
    processed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Fixed-capacity, non-blocking admission gate.
///
/// Cloning is cheap; clones share the same slots.
#[derive(Debug, Clone)]
pub struct AdmissionQueue {
    state: Arc<QueueState>,
}

impl AdmissionQueue {
    /// Create a gate with `capacity` slots. A capacity of zero is raised
    /// to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(QueueState {
                capacity: capacity.max(1),
                in_flight: AtomicUsize::new(0),
                processed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
            }),
        }
    }

    /// Claim a slot if one is free.
    ///
    /// The slot is held until the returned permit is dropped or
    /// [released](AdmissionPermit::release), so it is given back exactly
    /// once on every exit path.
    pub fn try_admit(&self) -> Option<AdmissionPermit> {
        let state = &self.state;
        let admitted = state
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < state.capacity).then_some(current + 1)
            })
            .is_ok();

        if admitted {
            Some(AdmissionPermit {
                state: Arc::clone(&self.state),
                recorded: false,
            })
        } else {
            state.rejected.fetch_add(1, Ordering::Relaxed);
            log::debug!("Admission rejected: {} slots in use", state.capacity);
            None
        }
    }

    /// Number of slots, after raising zero to one.
    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::Acquire)
    }

    /// Current counters. `processed + failed` equals the number of
    /// admitted requests whose permits are gone.
    pub fn stats(&self) -> AdmissionStats {
        let state = &self.state;
        AdmissionStats {
            capacity: state.capacity,
            in_flight: state.in_flight.load(Ordering::Acquire),
            processed: state.processed.load(Ordering::Relaxed),
            failed: state.failed.load(Ordering::Relaxed),
            rejected: state.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Proof of admission. Dropping it frees the slot.
///
/// Each permit is counted exactly once: the first `record_*` call wins, and
/// a permit dropped without one (an abandoned capture) counts as failed.
#[derive(Debug)]
#[must_use = "dropping the permit immediately frees the slot"]
pub struct AdmissionPermit {
    state: Arc<QueueState>,
    recorded: bool,
}

impl AdmissionPermit {
    /// Count the admitted request as completed successfully.
    pub fn record_success(&mut self) {
        if !std::mem::replace(&mut self.recorded, true) {
            self.state.processed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count the admitted request as failed.
    pub fn record_failure(&mut self) {
        if !std::mem::replace(&mut self.recorded, true) {
            self.state.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Give the slot back now rather than at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if !self.recorded {
            self.state.failed.fetch_add(1, Ordering::Relaxed);
            log::debug!("Admission slot released without an outcome; counted as failed");
        }
        self.state.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
