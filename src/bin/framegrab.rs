use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framegrab::{
    ErrorPayload, FramePipeline, FrameRequest, PipelineOptions, PipelineResponse, PipelineStage,
    ProgressCallback, ProgressInfo, TimeoutBudget, sweep_stale,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing_subscriber::EnvFilter;

const CLI_AFTER_HELP: &str = "Examples:\n  framegrab capture https://example.com/clip.mp4 --timestamp 00:01:05 --out frame.jpg\n  framegrab capture https://example.com/clip.mp4 --inline > payload.json\n  framegrab --capacity 4 --extraction-timeout 10 capture https://example.com/clip.mp4 --json\n  framegrab sweep --max-age-secs 600\n  framegrab completions zsh > _framegrab";

#[derive(Debug, Parser)]
#[command(
    name = "framegrab",
    version,
    about = "Grab a still frame from a remote video",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional logging output.
    #[arg(long)]
    verbose: bool,

    /// Show a progress spinner while capturing.
    #[arg(long)]
    progress: bool,

    /// Maximum number of captures processed at once.
    #[arg(long, env = "FRAMEGRAB_CAPACITY")]
    capacity: Option<usize>,

    /// Seconds to wait for the source to start responding.
    #[arg(long, env = "FRAMEGRAB_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// Seconds without data before a download counts as stalled.
    #[arg(long, env = "FRAMEGRAB_INACTIVITY_TIMEOUT")]
    inactivity_timeout: Option<u64>,

    /// Seconds allowed for the whole download.
    #[arg(long, env = "FRAMEGRAB_DOWNLOAD_TIMEOUT")]
    download_timeout: Option<u64>,

    /// Seconds ffmpeg may run before it is killed.
    #[arg(long, env = "FRAMEGRAB_EXTRACTION_TIMEOUT")]
    extraction_timeout: Option<u64>,

    /// Largest accepted source, in bytes.
    #[arg(long, env = "FRAMEGRAB_MAX_BYTES")]
    max_bytes: Option<u64>,

    /// Path to the ffmpeg binary.
    #[arg(long, env = "FRAMEGRAB_FFMPEG")]
    ffmpeg: Option<PathBuf>,

    /// Directory for temporary per-request files.
    #[arg(long, env = "FRAMEGRAB_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download a video and extract one frame.
    #[command(
        about = "Capture a frame from a remote video",
        after_help = "Examples:\n  framegrab capture https://example.com/clip.mp4\n  framegrab capture https://example.com/clip.mp4 --timestamp 12.5 --out still.jpg --json"
    )]
    Capture {
        /// HTTP(S) URL of the video.
        url: String,
        /// Seek position: seconds (`12.5`) or a timecode (`01:05`, `00:01:05.5`).
        #[arg(long)]
        timestamp: Option<String>,
        /// Where to write the JPEG (defaults to `<request-id>.jpg`).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print the image as a base64 JSON payload instead of writing a file.
        #[arg(long)]
        inline: bool,
        /// Print results and failures as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove scratch files left behind by interrupted runs.
    #[command(about = "Remove stale scratch files")]
    Sweep {
        /// Only remove files older than this many seconds.
        #[arg(long, default_value_t = 300)]
        max_age_secs: u64,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<f64, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(seconds);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    Ok((hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds)
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "framegrab=debug" } else { "framegrab=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            format!("logging unavailable: {error}").yellow()
        );
    }
}

fn pipeline_options(global: &GlobalOptions) -> PipelineOptions {
    let mut timeouts = TimeoutBudget::default();
    if let Some(secs) = global.connect_timeout {
        timeouts = timeouts.with_connect(Duration::from_secs(secs));
    }
    if let Some(secs) = global.inactivity_timeout {
        timeouts = timeouts.with_inactivity(Duration::from_secs(secs));
    }
    if let Some(secs) = global.download_timeout {
        timeouts = timeouts.with_total_download(Duration::from_secs(secs));
    }
    if let Some(secs) = global.extraction_timeout {
        timeouts = timeouts.with_extraction(Duration::from_secs(secs));
    }

    let mut options = PipelineOptions::new().with_timeouts(timeouts);
    if let Some(capacity) = global.capacity {
        options = options.with_capacity(capacity);
    }
    if let Some(max_bytes) = global.max_bytes {
        options = options.with_max_download_bytes(max_bytes);
    }
    if let Some(ffmpeg) = &global.ffmpeg {
        options = options.with_ffmpeg_path(ffmpeg);
    }
    if let Some(dir) = &global.scratch_dir {
        options = options.with_scratch_dir(dir);
    }
    if global.progress {
        options = options.with_progress(Arc::new(TerminalProgress::new()));
    }
    options
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {elapsed} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        match (info.stage, info.percentage) {
            (PipelineStage::Downloading, Some(pct)) => self
                .bar
                .set_message(format!("downloading {pct:.0}% ({} bytes)", info.bytes)),
            (PipelineStage::Downloading, None) => self
                .bar
                .set_message(format!("downloading {} bytes", info.bytes)),
            (stage, _) if stage.is_terminal() => self.bar.finish_and_clear(),
            (stage, _) => self.bar.set_message(stage.to_string()),
        }
    }
}

fn print_failure(payload: &ErrorPayload, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(payload)?);
        return Ok(());
    }

    eprintln!("{} {}", "error:".red().bold(), payload.message);
    if payload.retryable {
        let hint = match payload.retry_after_secs {
            Some(secs) => format!("this failure is transient; retry in {secs}s"),
            None => "this failure is transient; retrying may succeed".to_string(),
        };
        eprintln!("{} {}", "hint:".yellow().bold(), hint.yellow());
    }
    Ok(())
}

async fn capture(
    global: &GlobalOptions,
    url: &str,
    timestamp: Option<&str>,
    out: Option<&Path>,
    inline: bool,
    json: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let timestamp = timestamp.map(parse_timecode).transpose()?;
    let request = match FrameRequest::parse(url, timestamp, inline) {
        Ok(request) => request,
        Err(error) => {
            print_failure(&ErrorPayload::new(None, &error, Duration::ZERO), json)?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let pipeline = FramePipeline::new(pipeline_options(global))?;
    if global.verbose {
        eprintln!("{} {request}", "capturing".cyan().bold());
    }

    match pipeline.respond(&request).await {
        PipelineResponse::Image(frame) => {
            let path = out
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(format!("{}.jpg", frame.request_id)));
            tokio::fs::write(&path, &frame.bytes).await?;

            if json {
                let payload = json!({
                    "request_id": frame.request_id,
                    "path": path,
                    "byte_length": frame.byte_length(),
                    "width": frame.width,
                    "height": frame.height,
                    "elapsed_ms": u64::try_from(frame.elapsed.as_millis()).unwrap_or(u64::MAX),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "{} {} ({}x{}, {} bytes, {:?})",
                    "saved".green().bold(),
                    path.display(),
                    frame.width,
                    frame.height,
                    frame.byte_length(),
                    frame.elapsed,
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        PipelineResponse::Inline(payload) => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(ExitCode::SUCCESS)
        }
        PipelineResponse::Failure(payload) => {
            print_failure(&payload, json)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    match cli.command {
        Commands::Capture {
            url,
            timestamp,
            out,
            inline,
            json,
        } => {
            capture(
                &cli.global,
                &url,
                timestamp.as_deref(),
                out.as_deref(),
                inline,
                json,
            )
            .await
        }
        Commands::Sweep { max_age_secs } => {
            let options = pipeline_options(&cli.global);
            let removed = sweep_stale(options.scratch_dir(), Duration::from_secs(max_age_secs)).await;
            println!(
                "{} {removed} stale file(s) from {}",
                "removed".green().bold(),
                options.scratch_dir().display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framegrab", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{} {error}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::{Cli, parse_timecode};

    #[test]
    fn parse_timecode_formats() {
        assert_eq!(parse_timecode("75").unwrap(), 75.0);
        assert_eq!(parse_timecode("01:15").unwrap(), 75.0);
        assert_eq!(parse_timecode("00:01:15.5").unwrap(), 75.5);
        assert!(parse_timecode("").is_err());
        assert!(parse_timecode("1:2:3:4").is_err());
    }

    #[test]
    fn parse_timecode_keeps_negative_seconds_for_validation() {
        assert_eq!(parse_timecode("-2").unwrap(), -2.0);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
