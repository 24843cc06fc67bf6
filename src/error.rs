use std::time::Duration;
use thiserror::Error;

/// Failures that are fatal to a single (disease, year) job. The
/// orchestrator records these and carries on with the next job.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("automation step `{0}` failed after exhausting its retries")]
    StepFailed(String),

    #[error("no matching archive appeared within {}s", .0.as_secs())]
    DownloadTimeout(Duration),

    #[error("expected payload `{0}` missing from downloaded archive")]
    PayloadMissing(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobError {
    /// Short classifier used in per-job summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::StepFailed(_) => "step_failed",
            JobError::DownloadTimeout(_) => "download_timeout",
            JobError::PayloadMissing(_) => "payload_missing",
            JobError::Other(_) => "other",
        }
    }
}

/// Configuration-level failures. These abort the run before any job
/// starts, unlike [`JobError`].
#[derive(Error, Debug)]
pub enum RunError {
    #[error("unknown merge mode `{0}` (expected `reconstruct` or `update`)")]
    InvalidMode(String),

    #[error("empty {0} set supplied")]
    EmptyInput(&'static str),
}
