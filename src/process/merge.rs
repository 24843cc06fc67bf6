//! Per-disease dataset accumulation and persistence.
//!
//! Reconstruct starts from an empty dataset; update loads the persisted
//! one, drops the rows of every year being reprocessed, and appends the
//! fresh rows for exactly those years. Either way the accumulated
//! dataset fully overwrites the persisted file at commit time, so
//! re-running update for a year is idempotent.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::error::RunError;
use crate::process::transform::CanonicalRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    Reconstruct,
    Update,
}

impl FromStr for MergeMode {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reconstruct" => Ok(MergeMode::Reconstruct),
            "update" => Ok(MergeMode::Update),
            other => Err(RunError::InvalidMode(other.to_string())),
        }
    }
}

/// Ordered canonical rows, unique on (county_key, year, week).
#[derive(Debug, Default)]
pub struct DiseaseDataset {
    rows: Vec<CanonicalRow>,
}

impl DiseaseDataset {
    pub fn rows(&self) -> &[CanonicalRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append tolerates either side being empty.
    pub fn append(&mut self, rows: Vec<CanonicalRow>) {
        self.rows.extend(rows);
    }

    /// Drop every row whose year is in `years`.
    pub fn drop_years(&mut self, years: &HashSet<&str>) {
        self.rows.retain(|row| !years.contains(row.year.as_str()));
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("opening dataset `{}`", path.display()))?;
        let mut reader = ReaderBuilder::new().from_reader(file);
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let row: CanonicalRow =
                record.with_context(|| format!("reading dataset `{}`", path.display()))?;
            rows.push(row);
        }
        Ok(DiseaseDataset { rows })
    }

    /// Write the dataset, fully overwriting any prior file.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating `{}`", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("creating dataset `{}`", path.display()))?;
        let mut writer = WriterBuilder::new().from_writer(file);
        for row in &self.rows {
            writer
                .serialize(row)
                .with_context(|| format!("writing dataset `{}`", path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("flushing dataset `{}`", path.display()))?;
        Ok(())
    }
}

pub struct MergeEngine {
    mode: MergeMode,
    processed_root: PathBuf,
}

impl MergeEngine {
    pub fn new(mode: MergeMode, processed_root: impl Into<PathBuf>) -> Self {
        MergeEngine {
            mode,
            processed_root: processed_root.into(),
        }
    }

    /// `{processed_root}/{alias}/{alias}.csv`
    pub fn dataset_path(&self, alias: &str) -> PathBuf {
        self.processed_root.join(alias).join(format!("{alias}.csv"))
    }

    /// Open the accumulator for one disease, given the year set about
    /// to be (re)processed.
    pub fn begin(&self, alias: &str, years: &[String]) -> Result<DiseaseDataset> {
        match self.mode {
            MergeMode::Reconstruct => Ok(DiseaseDataset::default()),
            MergeMode::Update => {
                let path = self.dataset_path(alias);
                let mut dataset = if path.is_file() {
                    DiseaseDataset::load(&path)?
                } else {
                    DiseaseDataset::default()
                };
                let reprocessed: HashSet<&str> = years.iter().map(String::as_str).collect();
                let before = dataset.len();
                dataset.drop_years(&reprocessed);
                debug!(
                    alias,
                    dropped = before - dataset.len(),
                    "cleared reprocessed years"
                );
                Ok(dataset)
            }
        }
    }

    /// Persist the accumulated dataset for `alias`.
    pub fn commit(&self, alias: &str, dataset: &DiseaseDataset) -> Result<()> {
        dataset.write(&self.dataset_path(alias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::transform::week_monday;
    use tempfile::tempdir;

    fn row(key: &str, year: &str, week: &str, cases: u32) -> CanonicalRow {
        CanonicalRow {
            week: week.to_string(),
            cases,
            year: year.to_string(),
            county_key: key.to_string(),
            timestamp: week_monday(year, week).unwrap(),
        }
    }

    fn year_rows(year: &str, cases: u32) -> Vec<CanonicalRow> {
        vec![row("01001", year, "1", cases), row("01002", year, "1", cases)]
    }

    #[test]
    fn invalid_mode_is_rejected() {
        assert_eq!("Update".parse::<MergeMode>().unwrap(), MergeMode::Update);
        assert!(matches!(
            "merge".parse::<MergeMode>(),
            Err(RunError::InvalidMode(m)) if m == "merge"
        ));
    }

    #[test]
    fn reconstruct_from_empty_yields_exactly_the_extract_rows() -> Result<()> {
        let dir = tempdir()?;
        let engine = MergeEngine::new(MergeMode::Reconstruct, dir.path());

        let fresh = year_rows("2023", 3);
        let mut dataset = engine.begin("mumps", &["2023".into()])?;
        assert!(dataset.is_empty());
        dataset.append(fresh.clone());
        engine.commit("mumps", &dataset)?;

        let reloaded = DiseaseDataset::load(&engine.dataset_path("mumps"))?;
        assert_eq!(reloaded.rows(), fresh.as_slice());
        Ok(())
    }

    #[test]
    fn update_replaces_only_reprocessed_years() -> Result<()> {
        let dir = tempdir()?;

        // seed 2020–2022
        let seed = MergeEngine::new(MergeMode::Reconstruct, dir.path());
        let mut dataset = seed.begin("mumps", &[])?;
        for year in ["2020", "2021", "2022"] {
            dataset.append(year_rows(year, 1));
        }
        seed.commit("mumps", &dataset)?;

        // update with {2023} appends only 2023
        let engine = MergeEngine::new(MergeMode::Update, dir.path());
        let years = vec!["2023".to_string()];
        let mut dataset = engine.begin("mumps", &years)?;
        dataset.append(year_rows("2023", 5));
        engine.commit("mumps", &dataset)?;

        let after = DiseaseDataset::load(&engine.dataset_path("mumps"))?;
        assert_eq!(after.len(), 8);
        for year in ["2020", "2021", "2022"] {
            assert_eq!(
                after.rows().iter().filter(|r| r.year == year).count(),
                2,
                "{year} rows untouched"
            );
        }
        Ok(())
    }

    #[test]
    fn update_is_idempotent_per_year() -> Result<()> {
        let dir = tempdir()?;
        let engine = MergeEngine::new(MergeMode::Update, dir.path());
        let years = vec!["2023".to_string()];

        for _ in 0..2 {
            let mut dataset = engine.begin("mumps", &years)?;
            dataset.append(year_rows("2023", 5));
            engine.commit("mumps", &dataset)?;
        }

        let after = DiseaseDataset::load(&engine.dataset_path("mumps"))?;
        assert_eq!(after.len(), 2, "no duplicate (key, year, week) rows");
        Ok(())
    }

    #[test]
    fn append_tolerates_empty_sides() {
        let mut dataset = DiseaseDataset::default();
        dataset.append(Vec::new());
        assert!(dataset.is_empty());
        dataset.append(year_rows("2023", 1));
        dataset.append(Vec::new());
        assert_eq!(dataset.len(), 2);
    }
}
