//! Scratch file naming.
//!
//! Every request gets its own pair of paths inside the scratch directory,
//! derived from the request identifier plus a per-capture nonce, so two
//! concurrent captures never collide even when a caller reuses an id.

use std::io::Result as IoResult;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::configuration::SCRATCH_PREFIX;

/// The input-video and output-image paths owned by one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPaths {
    /// Where the downloaded video is written.
    pub input: PathBuf,
    /// Where the extracted frame is written.
    pub output: PathBuf,
}

impl ScratchPaths {
    /// Derive the scratch pair for `request_id` inside `dir`.
    ///
    /// Deterministic: the same identifier always yields the same paths.
    pub fn for_request(dir: &Path, request_id: &str) -> Self {
        Self {
            input: dir.join(format!("{SCRATCH_PREFIX}{request_id}-input.video")),
            output: dir.join(format!("{SCRATCH_PREFIX}{request_id}-frame.jpg")),
        }
    }

    /// Create the scratch directory if needed and return a fresh pair.
    ///
    /// Unlike [`for_request`](Self::for_request), each call yields distinct
    /// paths: a random nonce follows the identifier.
    pub async fn prepare(dir: &Path, request_id: &str) -> IoResult<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let nonce = Uuid::new_v4().simple().to_string();
        Ok(Self::for_request(
            dir,
            &format!("{request_id}.{}", &nonce[..12]),
        ))
    }

    /// Both paths, input first.
    pub fn all(&self) -> [&Path; 2] {
        [&self.input, &self.output]
    }
}

/// Whether `file_name` looks like something this crate created.
pub(crate) fn is_scratch_name(file_name: &str) -> bool {
    file_name.starts_with(SCRATCH_PREFIX)
        && (file_name.ends_with("-input.video") || file_name.ends_with("-frame.jpg"))
}
