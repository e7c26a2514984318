//! Polling and file stability tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use framegrab::{FailureKind, GrabError, StabilityOptions, StabilityTracker, poll_until, wait_stable};

// ── StabilityTracker ─────────────────────────────────────────────

#[test]
fn tracker_needs_consecutive_identical_sizes() {
    let mut tracker = StabilityTracker::new(3);
    assert!(!tracker.observe(Some(100)));
    assert!(!tracker.observe(Some(100)));
    assert!(tracker.observe(Some(100)));
    assert_eq!(tracker.last_size(), Some(100));
    assert_eq!(tracker.observations(), 3);
}

#[test]
fn tracker_restarts_when_size_changes() {
    let mut tracker = StabilityTracker::new(2);
    assert!(!tracker.observe(Some(10)));
    assert!(!tracker.observe(Some(20)));
    assert!(tracker.observe(Some(20)));
}

#[test]
fn tracker_never_accepts_empty_or_missing_files() {
    let mut tracker = StabilityTracker::new(1);
    assert!(!tracker.observe(None));
    assert!(!tracker.observe(Some(0)));
    assert!(!tracker.observe(Some(0)));
    assert_eq!(tracker.last_size(), None);
    assert!(tracker.observe(Some(5)));
}

#[test]
fn tracker_resets_when_file_disappears() {
    let mut tracker = StabilityTracker::new(2);
    assert!(!tracker.observe(Some(50)));
    assert!(!tracker.observe(None));
    assert!(!tracker.observe(Some(50)));
    assert!(tracker.observe(Some(50)));
}

#[test]
fn tracker_clamps_zero_requirement() {
    let mut tracker = StabilityTracker::new(0);
    assert!(tracker.observe(Some(1)));
}

// ── poll_until ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn poll_until_returns_first_success() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let value = poll_until(Duration::from_millis(100), Duration::from_secs(5), move || {
        let counter = Arc::clone(&counter);
        async move {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            (attempt == 4).then_some(attempt)
        }
    })
    .await;

    assert_eq!(value, Some(4));
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn poll_until_gives_up_at_timeout() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let started = tokio::time::Instant::now();

    let value: Option<()> = poll_until(Duration::from_millis(100), Duration::from_secs(1), move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        }
    })
    .await;

    assert_eq!(value, None);
    assert_eq!(started.elapsed(), Duration::from_secs(1));
    // Immediate first probe plus one per interval up to the deadline.
    let probes = attempts.load(Ordering::SeqCst);
    assert!((10..=11).contains(&probes), "probed {probes} times");
}

#[tokio::test(start_paused = true)]
async fn poll_until_abandons_slow_probe_at_deadline() {
    let started = tokio::time::Instant::now();
    let value = poll_until(Duration::from_millis(10), Duration::from_millis(500), || async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Some(())
    })
    .await;

    assert_eq!(value, None);
    assert_eq!(started.elapsed(), Duration::from_millis(500));
}

// ── wait_stable ──────────────────────────────────────────────────

fn quick_options() -> StabilityOptions {
    StabilityOptions {
        poll_interval: Duration::from_millis(20),
        required_checks: 3,
        timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn wait_stable_accepts_settled_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("settled.bin");
    std::fs::write(&path, vec![7_u8; 4096]).expect("Failed to write file");

    let stats = wait_stable(&path, quick_options())
        .await
        .expect("A settled file is stable");
    assert_eq!(stats.size, 4096);
    assert!(stats.checks >= 3);
}

#[tokio::test]
async fn wait_stable_waits_for_late_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("late.bin");

    let writer_path = path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        tokio::fs::write(&writer_path, vec![1_u8; 2048])
            .await
            .expect("Failed to write file");
    });

    let stats = wait_stable(&path, quick_options())
        .await
        .expect("A late file becomes stable");
    assert_eq!(stats.size, 2048);
    assert!(stats.waited >= Duration::from_millis(150));
}

#[tokio::test]
async fn wait_stable_times_out_on_missing_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("never.bin");
    let options = StabilityOptions {
        timeout: Duration::from_millis(300),
        ..quick_options()
    };

    let error = wait_stable(&path, options)
        .await
        .expect_err("A missing file never stabilizes");
    assert!(matches!(error, GrabError::FileNotStable { .. }));
    assert_eq!(error.kind(), FailureKind::OutputTimeout);
}

#[tokio::test]
async fn wait_stable_times_out_on_empty_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("empty.bin");
    std::fs::write(&path, b"").expect("Failed to write file");
    let options = StabilityOptions {
        timeout: Duration::from_millis(300),
        ..quick_options()
    };

    let error = wait_stable(&path, options)
        .await
        .expect_err("An empty file never stabilizes");
    assert_eq!(error.kind(), FailureKind::OutputTimeout);
}

#[tokio::test]
async fn wait_stable_times_out_on_growing_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("growing.bin");
    std::fs::write(&path, b"x").expect("Failed to write file");

    let writer_path = path.clone();
    let writer = tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&writer_path)
            .await
            .expect("Failed to open file");
        for _ in 0..100 {
            file.write_all(&[0_u8; 64]).await.expect("Failed to append");
            file.flush().await.expect("Failed to flush");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let options = StabilityOptions {
        timeout: Duration::from_millis(400),
        ..quick_options()
    };
    let error = wait_stable(&path, options)
        .await
        .expect_err("A growing file never stabilizes");
    assert_eq!(error.kind(), FailureKind::OutputTimeout);
    writer.abort();
}
