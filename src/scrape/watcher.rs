//! Download-directory polling.
//!
//! The portal drops its export into the browser's download directory
//! under a `survstat*.zip` name we do not fully control. The watcher
//! polls for a match within a fixed budget and returns the newest one.
//! Because the directory is shared across jobs, every job purges stale
//! matches before triggering its own download — otherwise a leftover
//! archive from a previous job would be picked up as the new one.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::debug;

use crate::error::JobError;

const ARCHIVE_PREFIX: &str = "survstat";
const ARCHIVE_EXT: &str = "zip";

pub struct DownloadWatcher {
    dir: PathBuf,
    timeout: Duration,
    interval: Duration,
}

impl DownloadWatcher {
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration, interval: Duration) -> Self {
        DownloadWatcher {
            dir: dir.into(),
            timeout,
            interval,
        }
    }

    fn is_match(path: &Path) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_lowercase(),
            None => return false,
        };
        name.starts_with(ARCHIVE_PREFIX) && name.ends_with(&format!(".{ARCHIVE_EXT}"))
    }

    fn matches(&self) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("reading download dir `{}`", self.dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && Self::is_match(&path) {
                found.push(path);
            }
        }
        Ok(found)
    }

    /// Delete every pre-existing matching archive. Returns how many
    /// files were removed. Creates the directory when it does not
    /// exist yet, so a first run needs no manual setup.
    pub fn purge_stale(&self) -> Result<usize> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating download dir `{}`", self.dir.display()))?;
        let mut removed = 0;
        for path in self.matches()? {
            if fs::remove_file(&path).is_ok() {
                debug!(file = %path.display(), "purged stale download");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Poll until a matching archive appears, returning the
    /// most-recently-modified match, or `DownloadTimeout` once the
    /// budget is exhausted.
    pub fn wait_for_archive(&self) -> Result<PathBuf, JobError> {
        let mut elapsed = Duration::ZERO;
        while elapsed < self.timeout {
            thread::sleep(self.interval);
            elapsed += self.interval;

            if let Some(newest) = self.newest_match().map_err(JobError::Other)? {
                return Ok(newest);
            }
            debug!(?elapsed, "no archive yet");
        }
        Err(JobError::DownloadTimeout(self.timeout))
    }

    fn newest_match(&self) -> Result<Option<PathBuf>> {
        let newest = self
            .matches()?
            .into_iter()
            .max_by_key(|p| {
                fs::metadata(p)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH)
            });
        Ok(newest)
    }
}
