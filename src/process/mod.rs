//! Process phase: per disease, transform each year's raw extract and
//! fold it into the persisted dataset.

pub mod merge;
pub mod raw_table;
pub mod transform;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::{Disease, PipelineConfig};
use merge::MergeEngine;
use raw_table::YearExtract;
use transform::transform_year;

/// Transform and merge every available year for one disease. Years
/// whose raw file is absent (failed or skipped jobs) are left out of
/// the merge entirely, so update mode never drops a year it cannot
/// replace. The dataset persists only after all years are folded in.
pub fn process_disease(
    config: &PipelineConfig,
    disease: &Disease,
    years: &[String],
) -> Result<()> {
    let available: Vec<String> = years
        .iter()
        .filter(|year| {
            let present = config.raw_file(&disease.alias, year).is_file();
            if !present {
                warn!(disease = %disease.alias, %year, "no raw extract; year skipped");
            }
            present
        })
        .cloned()
        .collect();

    if available.is_empty() {
        warn!(disease = %disease.alias, "no raw extracts at all; dataset untouched");
        return Ok(());
    }

    let engine = MergeEngine::new(config.mode, &config.processed_root);
    let mut dataset = engine.begin(&disease.alias, &available)?;

    for year in &available {
        let path = config.raw_file(&disease.alias, year);
        let extract = YearExtract::read(&path)?;
        let rows = transform_year(&extract, year)?;
        info!(disease = %disease.alias, %year, rows = rows.len(), "year transformed");
        dataset.append(rows);
    }

    engine.commit(&disease.alias, &dataset)?;
    info!(
        disease = %disease.alias,
        rows = dataset.len(),
        path = %engine.dataset_path(&disease.alias).display(),
        "dataset written"
    );
    Ok(())
}
