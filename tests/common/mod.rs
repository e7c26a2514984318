//! Shared helpers for the integration tests: a scripted HTTP responder,
//! stand-in ffmpeg scripts, and in-memory JPEG generation.

#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

/// Whether a real ffmpeg binary is on `PATH`.
pub fn ffmpeg_available() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .is_ok_and(|output| output.status.success())
}

// ── HTTP responder ───────────────────────────────────────────────

/// How the test server answers every request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Send `body` in `chunk`-sized pieces, pausing `delay` between them.
    Body {
        status: u16,
        body: Vec<u8>,
        chunk: usize,
        delay: Duration,
        /// Sent as `Content-Length`; `None` closes the connection to end the body.
        declared_length: Option<u64>,
    },
    /// Send headers and `prefix`, then go quiet while holding the socket.
    Stall { prefix: Vec<u8>, declared_length: u64 },
    /// Accept the request and never answer.
    Silent,
}

impl Reply {
    /// A prompt 200 with an accurate `Content-Length`.
    pub fn ok(body: Vec<u8>) -> Self {
        let declared_length = Some(body.len() as u64);
        Reply::Body {
            status: 200,
            body,
            chunk: 16 * 1024,
            delay: Duration::ZERO,
            declared_length,
        }
    }

    pub fn status(status: u16) -> Self {
        Reply::Body {
            status,
            body: b"nope".to_vec(),
            chunk: 1024,
            delay: Duration::ZERO,
            declared_length: Some(4),
        }
    }
}

pub struct TestServer {
    addr: SocketAddr,
}

impl TestServer {
    /// Bind to an ephemeral port and answer every connection with `reply`.
    pub async fn start(reply: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(answer(socket, reply.clone()));
            }
        });

        Self { addr }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }
}

async fn answer(mut socket: TcpStream, reply: Reply) {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        match socket.read(&mut buffer).await {
            Ok(0) | Err(_) => return,
            Ok(read) => request.extend_from_slice(&buffer[..read]),
        }
    }

    match reply {
        Reply::Body {
            status,
            body,
            chunk,
            delay,
            declared_length,
        } => {
            let head = response_head(status, declared_length);
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for piece in body.chunks(chunk.max(1)) {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if socket.write_all(piece).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
            }
            let _ = socket.shutdown().await;
        }
        Reply::Stall {
            prefix,
            declared_length,
        } => {
            let head = response_head(200, Some(declared_length));
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&prefix).await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Reply::Silent => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}

fn response_head(status: u16, declared_length: Option<u64>) -> String {
    let mut head = format!(
        "HTTP/1.1 {status} Test\r\nContent-Type: video/mp4\r\nConnection: close\r\n"
    );
    if let Some(length) = declared_length {
        head.push_str(&format!("Content-Length: {length}\r\n"));
    }
    head.push_str("\r\n");
    head
}

/// Deterministic filler that looks nothing like an empty file.
pub fn video_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ── Images ───────────────────────────────────────────────────────

/// A busy test pattern encoded as JPEG, comfortably over 1000 bytes.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let pattern = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 7 + y * 13) % 256) as u8,
            ((x * y) % 256) as u8,
            ((x ^ y) % 256) as u8,
        ])
    });
    let mut encoded = Vec::new();
    DynamicImage::ImageRgb8(pattern)
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)
        .expect("Failed to encode test JPEG");
    encoded
}

// ── Stand-in ffmpeg scripts ──────────────────────────────────────

/// Write an executable shell script named `name` into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to mark script executable");
    path
}

/// Copies `source` to whatever path it is given last, like ffmpeg writing
/// its output file.
#[cfg(unix)]
pub fn copying_ffmpeg(dir: &Path, source: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-ffmpeg-copy",
        &format!(
            "for last; do :; done\ncp '{}' \"$last\"",
            source.display()
        ),
    )
}

/// Never finishes on its own.
#[cfg(unix)]
pub fn hanging_ffmpeg(dir: &Path) -> PathBuf {
    write_script(dir, "fake-ffmpeg-hang", "sleep 30")
}

/// Fails with a decoder-style complaint on stderr.
#[cfg(unix)]
pub fn failing_ffmpeg(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-ffmpeg-fail",
        "echo 'moov atom not found' >&2\necho 'Invalid data found when processing input' >&2\nexit 1",
    )
}

/// Exits cleanly without writing anything.
#[cfg(unix)]
pub fn silent_ffmpeg(dir: &Path) -> PathBuf {
    write_script(dir, "fake-ffmpeg-silent", "exit 0")
}

/// Records its arguments, one per line, into `record`.
#[cfg(unix)]
pub fn recording_ffmpeg(dir: &Path, record: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-ffmpeg-record",
        &format!("printf '%s\\n' \"$@\" > '{}'", record.display()),
    )
}

/// Names of entries currently in `dir`.
pub fn entries(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(read) => read
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}
