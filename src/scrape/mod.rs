//! Scrape phase: (disease × year) jobs, strictly sequential.
//!
//! One browser session and one shared downloads directory exist at a
//! time, so jobs cannot overlap — a parallel job would race the
//! download-directory polling in [`watcher`]. A failed job is recorded
//! and the batch moves on; it never aborts sibling jobs.

pub mod automator;
pub mod extract;
pub mod watcher;

use std::path::PathBuf;
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::error::JobError;
use automator::WebFormAutomator;
use extract::ArchiveExtractor;
use watcher::DownloadWatcher;

/// Outcome of one (disease, year) job. Terminal: either the relocated
/// raw file's path or the error that killed the job.
#[derive(Debug)]
pub struct JobReport {
    pub disease_alias: String,
    pub year: String,
    pub outcome: Result<PathBuf, JobError>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Failed jobs paired with their errors, for the end-of-run summary.
pub fn failed_jobs(reports: &[JobReport]) -> impl Iterator<Item = (&JobReport, &JobError)> {
    reports
        .iter()
        .filter_map(|r| r.outcome.as_ref().err().map(|e| (r, e)))
}

/// Years of `alias` whose jobs produced a raw file, in job order.
pub fn successful_years(reports: &[JobReport], alias: &str) -> Vec<String> {
    reports
        .iter()
        .filter(|r| r.disease_alias == alias && r.is_success())
        .map(|r| r.year.clone())
        .collect()
}

pub struct ScrapeOrchestrator<'a> {
    config: &'a PipelineConfig,
}

impl<'a> ScrapeOrchestrator<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        ScrapeOrchestrator { config }
    }

    /// Run every (disease, year) job sequentially and report each
    /// outcome. Never fails as a whole: job errors land in the reports.
    pub fn run(&self) -> Vec<JobReport> {
        let watcher = DownloadWatcher::new(
            &self.config.downloads_dir,
            self.config.download_timeout,
            self.config.poll_interval,
        );
        let extractor = ArchiveExtractor::new(&self.config.raw_root);

        let mut reports =
            Vec::with_capacity(self.config.diseases.len() * self.config.years.len());
        for disease in &self.config.diseases {
            for year in &self.config.years {
                info!(disease = %disease.alias, %year, "job start");
                let outcome = self.run_job(&watcher, &extractor, &disease.display_name, &disease.alias, year);
                match &outcome {
                    Ok(path) => info!(disease = %disease.alias, %year, raw = %path.display(), "job done"),
                    Err(e) => {
                        error!(disease = %disease.alias, %year, kind = e.kind(), error = %e, "job failed")
                    }
                }
                reports.push(JobReport {
                    disease_alias: disease.alias.clone(),
                    year: year.clone(),
                    outcome,
                });
            }
        }
        reports
    }

    fn run_job(
        &self,
        watcher: &DownloadWatcher,
        extractor: &ArchiveExtractor,
        display_name: &str,
        alias: &str,
        year: &str,
    ) -> Result<PathBuf, JobError> {
        // stale archives from earlier jobs would be misread as ours
        watcher.purge_stale().map_err(JobError::Other)?;

        let automator = WebFormAutomator::launch(&self.config.downloads_dir)?;
        automator.run(display_name, year)?;

        let archive = watcher.wait_for_archive()?;
        extractor.relocate(&archive, alias, year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn report(alias: &str, year: &str, ok: bool) -> JobReport {
        JobReport {
            disease_alias: alias.to_string(),
            year: year.to_string(),
            outcome: if ok {
                Ok(PathBuf::from("raw"))
            } else {
                Err(JobError::DownloadTimeout(Duration::from_secs(30)))
            },
        }
    }

    #[test]
    fn successful_years_filters_by_alias_and_outcome() {
        let reports = vec![
            report("mumps", "2021", true),
            report("mumps", "2022", false),
            report("mumps", "2023", true),
            report("rsv", "2023", true),
        ];
        assert_eq!(successful_years(&reports, "mumps"), vec!["2021", "2023"]);
        assert_eq!(successful_years(&reports, "rsv"), vec!["2023"]);
        assert!(successful_years(&reports, "measles").is_empty());
    }

    #[test]
    fn failed_jobs_pairs_each_failure_with_its_error() {
        let reports = vec![
            report("mumps", "2021", true),
            report("mumps", "2022", false),
            report("rsv", "2023", false),
        ];
        let failed: Vec<_> = failed_jobs(&reports).collect();
        assert_eq!(failed.len(), 2);
        assert!(failed
            .iter()
            .all(|(r, e)| !r.is_success() && e.kind() == "download_timeout"));
        assert_eq!(failed[0].0.year, "2022");
    }
}
