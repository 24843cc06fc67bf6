//! Append-only run log.
//!
//! Every completed run appends one block recording when it ran, the
//! year range, and the disease set. Only the most recent block is
//! authoritative: `read_latest` returns its disease map, which the CLI
//! uses as the default disease set for the next run.

use anyhow::{Context, Result};
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::config::Disease;

const SEPARATOR: &str = "--------------------------------";

static RUN_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^--- Script Run: (\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) ---$").unwrap()
});

pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RunLog { path: path.into() }
    }

    /// Append one block for the run that just completed.
    pub fn record(&self, diseases: &[Disease], years: &[String]) -> Result<()> {
        let run_time = Local::now().format("%Y-%m-%d %H:%M:%S");
        let min = years.iter().min().cloned().unwrap_or_default();
        let max = years.iter().max().cloned().unwrap_or_default();

        let mut block = String::new();
        block.push_str(&format!("\n--- Script Run: {run_time} ---\n"));
        block.push_str(&format!("Years: {min}–{max}\n"));
        block.push_str(&format!("Total years: {}\n", years.len()));
        block.push_str("Diseases:\n");
        for d in diseases {
            block.push_str(&format!("- {}: {}\n", d.display_name, d.alias));
        }
        block.push_str(SEPARATOR);
        block.push('\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening run log `{}`", self.path.display()))?;
        file.write_all(block.as_bytes())
            .with_context(|| format!("appending to run log `{}`", self.path.display()))?;
        Ok(())
    }

    /// Disease map of the most recent block. A missing or malformed log
    /// yields an empty map rather than an error.
    pub fn read_latest(&self) -> Result<Vec<Disease>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading run log `{}`", self.path.display()))?;
        let lines: Vec<&str> = text.lines().collect();

        let start = match lines
            .iter()
            .rposition(|line| RUN_HEADER.is_match(line.trim()))
        {
            Some(idx) => idx,
            None => return Ok(Vec::new()),
        };

        let mut diseases = Vec::new();
        let mut in_disease_section = false;
        for line in &lines[start..] {
            let line = line.trim();
            if line == "Diseases:" {
                in_disease_section = true;
                continue;
            }
            if !in_disease_section {
                continue;
            }
            if let Some(entry) = line.strip_prefix("- ") {
                if let Some((name, alias)) = entry.split_once(':') {
                    diseases.push(Disease::new(name.trim(), alias.trim()));
                }
            } else if line.starts_with("---") {
                break;
            }
        }
        Ok(diseases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_single_block() -> Result<()> {
        let dir = tempdir()?;
        let log = RunLog::new(dir.path().join("log.txt"));
        log.record(
            &[Disease::new("Masern", "measles"), Disease::new("Mumps", "mumps")],
            &["2020".into(), "2021".into()],
        )?;

        let diseases = log.read_latest()?;
        assert_eq!(
            diseases,
            vec![Disease::new("Masern", "measles"), Disease::new("Mumps", "mumps")]
        );
        Ok(())
    }

    #[test]
    fn latest_block_wins() -> Result<()> {
        let dir = tempdir()?;
        let log = RunLog::new(dir.path().join("log.txt"));
        log.record(&[Disease::new("Masern", "measles")], &["2020".into()])?;
        log.record(&[Disease::new("RSV", "rsv")], &["2021".into()])?;

        let diseases = log.read_latest()?;
        assert_eq!(diseases, vec![Disease::new("RSV", "rsv")]);
        Ok(())
    }

    #[test]
    fn missing_or_malformed_log_yields_empty_map() -> Result<()> {
        let dir = tempdir()?;
        let log = RunLog::new(dir.path().join("log.txt"));
        assert!(log.read_latest()?.is_empty());

        fs::write(dir.path().join("log.txt"), "not a run block\n")?;
        assert!(log.read_latest()?.is_empty());
        Ok(())
    }
}
