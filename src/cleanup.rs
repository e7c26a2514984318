//! Scratch file cleanup.
//!
//! [`ScratchGuard`] owns a request's [`ScratchPaths`] for the lifetime of the
//! pipeline. The orchestrator awaits [`ScratchGuard::cleanup`] at its single
//! exit point; if the owning future is dropped or unwinds first, the guard's
//! `Drop` removes the files instead. Removal never fails observably: errors
//! are logged and swallowed.
//!
//! [`sweep_stale`] and [`spawn_sweeper`] are a safety net for files left
//! behind by a crashed process.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;

use crate::scratch::{ScratchPaths, is_scratch_name};

/// Scoped owner of a request's scratch files.
#[derive(Debug)]
pub struct ScratchGuard {
    paths: ScratchPaths,
    armed: bool,
}

impl ScratchGuard {
    /// Take ownership of `paths`; they are removed when the guard goes away.
    pub fn new(paths: ScratchPaths) -> Self {
        Self { paths, armed: true }
    }

    /// The guarded paths.
    pub fn paths(&self) -> &ScratchPaths {
        &self.paths
    }

    /// Remove both scratch files and disarm the guard.
    pub async fn cleanup(mut self) {
        self.armed = false;
        remove_scratch(self.paths.all()).await;
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if self.armed {
            log::debug!("Scratch guard dropped before cleanup; removing files synchronously");
            for path in self.paths.all() {
                remove_blocking(path);
            }
        }
    }
}

/// Remove every path, ignoring files that do not exist.
///
/// Other failures are logged at `warn` and otherwise ignored.
pub async fn remove_scratch<'a>(paths: impl IntoIterator<Item = &'a Path>) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => log::debug!("Removed scratch file {}", path.display()),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => {
                log::warn!("Failed to remove scratch file {}: {error}", path.display());
            }
        }
    }
}

fn remove_blocking(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => {
            log::warn!("Failed to remove scratch file {}: {error}", path.display());
        }
    }
}

/// Delete scratch files in `dir` whose last modification is older than
/// `max_age`. Returns how many were removed.
///
/// Only files named like scratch files are touched. A missing directory
/// counts as nothing to sweep.
pub async fn sweep_stale(dir: &Path, max_age: Duration) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return 0,
        Err(error) => {
            log::warn!("Cannot sweep scratch directory {}: {error}", dir.display());
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut stale: Vec<PathBuf> = Vec::new();

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                log::warn!("Error while listing {}: {error}", dir.display());
                break;
            }
        };

        let name = entry.file_name();
        if !name.to_str().is_some_and(is_scratch_name) {
            continue;
        }

        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if metadata.is_file() && age >= max_age {
            stale.push(entry.path());
        }
    }

    let count = stale.len();
    remove_scratch(stale.iter().map(PathBuf::as_path)).await;
    if count > 0 {
        log::info!("Swept {count} stale scratch files from {}", dir.display());
    }
    count
}

/// Run [`sweep_stale`] every `every` until the returned handle is aborted.
pub fn spawn_sweeper(dir: PathBuf, every: Duration, max_age: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep_stale(&dir, max_age).await;
        }
    })
}
