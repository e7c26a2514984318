//! Frame extraction and process watchdog tests.
//!
//! The failure-path tests drive small shell scripts in place of ffmpeg, so
//! they only run on unix. The real-ffmpeg tests skip themselves when either
//! ffmpeg or `tests/fixtures/sample_video.mp4` is missing.

mod common;

use std::path::Path;
use std::time::{Duration, Instant};

use framegrab::{ExtractorProcess, FailureKind, FrameExtractor, FrameSettings, GrabError, ProcessOutcome};

// ── Command line ─────────────────────────────────────────────────

#[test]
fn command_args_seek_before_input() {
    let extractor = FrameExtractor::new("ffmpeg", FrameSettings::default());
    let args: Vec<String> = extractor
        .command_args(Path::new("in.video"), Path::new("out.jpg"), 1.5)
        .into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    let seek = args.iter().position(|arg| arg == "-ss").expect("-ss present");
    let input = args.iter().position(|arg| arg == "-i").expect("-i present");
    assert!(seek < input);
    assert_eq!(args[seek + 1], "1.500");
    assert_eq!(args[input + 1], "in.video");
    assert_eq!(args.last().map(String::as_str), Some("out.jpg"));
    assert!(args.windows(2).any(|pair| pair == ["-frames:v", "1"]));
}

#[test]
fn command_args_bound_dimensions_and_quality() {
    let settings = FrameSettings {
        max_dimension: 320,
        jpeg_quality: 5,
    };
    let extractor = FrameExtractor::new("ffmpeg", settings);
    let args: Vec<String> = extractor
        .command_args(Path::new("in.video"), Path::new("out.jpg"), 0.0)
        .into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    let filter = args
        .iter()
        .position(|arg| arg == "-vf")
        .map(|index| args[index + 1].clone())
        .expect("-vf present");
    assert!(filter.contains("min(iw,320)"));
    assert!(filter.contains("min(ih,320)"));
    assert!(filter.contains("force_original_aspect_ratio=decrease"));
    assert!(args.windows(2).any(|pair| pair == ["-q:v", "5"]));
}

// ── Failure paths ────────────────────────────────────────────────

#[tokio::test]
async fn missing_binary_is_extraction_failure() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let extractor = FrameExtractor::new(
        dir.path().join("no-such-ffmpeg"),
        FrameSettings::default(),
    );

    let error = extractor
        .extract_frame(
            &dir.path().join("in.video"),
            &dir.path().join("out.jpg"),
            0.0,
            Duration::from_secs(5),
        )
        .await
        .expect_err("A missing binary cannot extract");

    assert_eq!(error.kind(), FailureKind::ExtractionFailed);
    assert!(!error.is_retryable());
}

#[cfg(unix)]
#[tokio::test]
async fn hanging_process_is_killed_at_limit() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let script = common::hanging_ffmpeg(dir.path());
    let extractor = FrameExtractor::new(script, FrameSettings::default());

    let limit = Duration::from_millis(500);
    let started = Instant::now();
    let error = extractor
        .extract_frame(
            &dir.path().join("in.video"),
            &dir.path().join("out.jpg"),
            1.0,
            limit,
        )
        .await
        .expect_err("A hanging process must time out");

    assert!(
        matches!(error, GrabError::ExtractionTimeout(limit_seen) if limit_seen == limit),
        "unexpected error: {error:?}"
    );
    assert!(error.is_retryable());
    // Kill is immediate, well inside the limit plus a small margin.
    assert!(started.elapsed() < limit + Duration::from_secs(2));
}

#[cfg(unix)]
#[tokio::test]
async fn non_zero_exit_carries_stderr_diagnostics() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let script = common::failing_ffmpeg(dir.path());
    let extractor = FrameExtractor::new(script, FrameSettings::default());

    let error = extractor
        .extract_frame(
            &dir.path().join("in.video"),
            &dir.path().join("out.jpg"),
            1.0,
            Duration::from_secs(5),
        )
        .await
        .expect_err("A failing process must fail extraction");

    match &error {
        GrabError::ExtractionFailed {
            message,
            diagnostics,
        } => {
            assert!(message.contains("code 1"), "message: {message}");
            let diagnostics = diagnostics.as_deref().expect("stderr captured");
            assert!(diagnostics.contains("moov atom not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!error.is_retryable());
}

#[cfg(unix)]
#[tokio::test]
async fn clean_exit_without_output_is_failure() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let script = common::silent_ffmpeg(dir.path());
    let extractor = FrameExtractor::new(script, FrameSettings::default());

    let error = extractor
        .extract_frame(
            &dir.path().join("in.video"),
            &dir.path().join("out.jpg"),
            3600.0,
            Duration::from_secs(5),
        )
        .await
        .expect_err("No output file means no frame");

    assert_eq!(error.kind(), FailureKind::ExtractionFailed);
}

#[cfg(unix)]
#[tokio::test]
async fn extractor_passes_paths_to_process() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let record = dir.path().join("args.txt");
    let script = common::recording_ffmpeg(dir.path(), &record);
    let extractor = FrameExtractor::new(script, FrameSettings::default());
    let input = dir.path().join("in.video");
    let output = dir.path().join("out.jpg");

    // The recorder writes no frame, so the call itself fails.
    let _ = extractor
        .extract_frame(&input, &output, 2.25, Duration::from_secs(5))
        .await;

    let recorded = std::fs::read_to_string(&record).expect("Arguments recorded");
    let lines: Vec<&str> = recorded.lines().collect();
    assert!(lines.contains(&"2.250"));
    assert!(lines.contains(&&*input.to_string_lossy()));
    assert_eq!(lines.last().copied(), Some(&*output.to_string_lossy()));
}

// ── Process wrapper ──────────────────────────────────────────────

#[cfg(unix)]
#[tokio::test]
async fn process_output_is_captured() {
    let mut command = tokio::process::Command::new("sh");
    command.args(["-c", "echo frame; echo warning >&2; exit 3"]);
    let process = ExtractorProcess::start(command).expect("Failed to spawn sh");
    assert!(process.id().is_some());

    match process
        .wait_with_timeout(Duration::from_secs(5))
        .await
        .expect("Wait failed")
    {
        ProcessOutcome::Exited(output) => {
            assert_eq!(output.status.code(), Some(3));
            assert_eq!(output.stdout, b"frame\n");
            assert_eq!(output.stderr, b"warning\n");
        }
        ProcessOutcome::TimedOut { .. } => panic!("sh should exit on its own"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn process_is_killed_on_timeout() {
    let mut command = tokio::process::Command::new("sh");
    command.args(["-c", "sleep 30"]);
    let process = ExtractorProcess::start(command).expect("Failed to spawn sh");

    let started = Instant::now();
    let outcome = process
        .wait_with_timeout(Duration::from_millis(200))
        .await
        .expect("Wait failed");

    assert!(matches!(outcome, ProcessOutcome::TimedOut { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

// ── Real ffmpeg ──────────────────────────────────────────────────

#[tokio::test]
async fn real_ffmpeg_extracts_bounded_jpeg() {
    let path = common::sample_video_path();
    if !Path::new(path).exists() || !common::ffmpeg_available() {
        return;
    }

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = dir.path().join("frame.jpg");
    let settings = FrameSettings {
        max_dimension: 160,
        jpeg_quality: 3,
    };
    FrameExtractor::new("ffmpeg", settings)
        .extract_frame(Path::new(path), &output, 1.0, Duration::from_secs(20))
        .await
        .expect("Failed to extract frame");

    let (width, height) = image::image_dimensions(&output).expect("Output is an image");
    assert!(width <= 160 && height <= 160, "got {width}x{height}");
}
