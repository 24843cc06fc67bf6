use std::path::PathBuf;
use std::time::Duration;

use crate::error::RunError;
use crate::process::merge::MergeMode;

/// One disease to collect: the name the remote portal knows it by, and
/// the local alias used for file and folder naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disease {
    pub display_name: String,
    pub alias: String,
}

impl Disease {
    /// The alias is normalized once here so every path built from it
    /// agrees (lowercase, spaces to underscores).
    pub fn new(display_name: impl Into<String>, alias: impl Into<String>) -> Self {
        let alias = alias.into().trim().to_lowercase().replace(' ', "_");
        Disease {
            display_name: display_name.into().trim().to_string(),
            alias,
        }
    }
}

/// Explicit configuration for one batch run, built in `main` and passed
/// by reference into the scrape and process phases. No component reads
/// ambient global state.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub diseases: Vec<Disease>,
    pub years: Vec<String>,
    pub mode: MergeMode,
    pub raw_root: PathBuf,
    pub processed_root: PathBuf,
    pub downloads_dir: PathBuf,
    /// Budget for the download poll after the download is triggered.
    pub download_timeout: Duration,
    /// Interval between download polls.
    pub poll_interval: Duration,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), RunError> {
        if self.diseases.is_empty() {
            return Err(RunError::EmptyInput("disease"));
        }
        if self.years.is_empty() {
            return Err(RunError::EmptyInput("year"));
        }
        Ok(())
    }

    /// `{raw_root}/{alias}/{alias}_{year}.csv`
    pub fn raw_file(&self, alias: &str, year: &str) -> PathBuf {
        self.raw_root.join(alias).join(format!("{alias}_{year}.csv"))
    }
}

/// Platform downloads folder, falling back to `./downloads` when the
/// platform has none configured.
pub fn default_downloads_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("downloads"))
}
