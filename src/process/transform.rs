//! Year-file transformation.
//!
//! An explicit ordered pipeline of pure steps over immutable row
//! values: reshape wide → long, stamp the year, impute missing counts,
//! resolve county names, pad the key, derive the timestamp. Each step
//! takes and returns the same row shape; no step mutates shared state.

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::mapping::{self, BERLIN_AGGREGATE};
use crate::process::raw_table::YearExtract;

/// Width of the administrative county code.
const COUNTY_KEY_WIDTH: usize = 5;

/// One harmonized observation. Field order is the persisted column
/// order: week, cases, year, kz_kreis, timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub week: String,
    pub cases: u32,
    pub year: String,
    #[serde(rename = "kz_kreis")]
    pub county_key: String,
    pub timestamp: NaiveDate,
}

/// Intermediate long-format row, before county resolution and
/// timestamping. `cases` stays optional until the imputation step.
#[derive(Debug, Clone)]
struct LongRow {
    week: String,
    county: String,
    cases: Option<u32>,
    year: String,
}

/// Transform one raw year extract into canonical rows.
pub fn transform_year(extract: &YearExtract, year: &str) -> Result<Vec<CanonicalRow>> {
    let rows = reshape_long(extract)?;
    let rows = stamp_year(rows, year);
    let rows = impute_zero(rows);
    let rows = map_counties(rows);
    finalize(rows)
}

/// Steps 1–2: the unlabeled leading column becomes `week`, then the
/// wide table is reshaped to one row per (week, county). The Berlin
/// aggregate column is not a county and is excluded.
fn reshape_long(extract: &YearExtract) -> Result<Vec<LongRow>> {
    let mut rows = Vec::new();
    for record in &extract.rows {
        let week = record[0].clone();
        for (idx, header) in extract.headers.iter().enumerate().skip(1) {
            if header == BERLIN_AGGREGATE {
                continue;
            }
            let cases = parse_cases(&record[idx])
                .with_context(|| format!("week {week}, county `{header}`"))?;
            rows.push(LongRow {
                week: week.clone(),
                county: header.clone(),
                cases,
                year: String::new(),
            });
        }
    }
    Ok(rows)
}

fn parse_cases(field: &str) -> Result<Option<u32>> {
    let field = field.trim();
    if field.is_empty() || field == "-" {
        return Ok(None);
    }
    let cases = field
        .parse::<u32>()
        .map_err(|_| anyhow!("invalid case count `{field}`"))?;
    Ok(Some(cases))
}

/// Step 3.
fn stamp_year(rows: Vec<LongRow>, year: &str) -> Vec<LongRow> {
    rows.into_iter()
        .map(|row| LongRow {
            year: year.to_string(),
            ..row
        })
        .collect()
}

/// Step 4: a missing count means zero reported cases, never null.
fn impute_zero(rows: Vec<LongRow>) -> Vec<LongRow> {
    rows.into_iter()
        .map(|row| LongRow {
            cases: Some(row.cases.unwrap_or(0)),
            ..row
        })
        .collect()
}

/// Step 5: both mapping passes, in order.
fn map_counties(rows: Vec<LongRow>) -> Vec<LongRow> {
    rows.into_iter()
        .map(|row| LongRow {
            county: mapping::resolve(&row.county),
            ..row
        })
        .collect()
}

/// Steps 6–8: the county column becomes the zero-padded key and every
/// row gets the Monday of its ISO calendar week.
fn finalize(rows: Vec<LongRow>) -> Result<Vec<CanonicalRow>> {
    rows.into_iter()
        .map(|row| {
            let timestamp = week_monday(&row.year, &row.week)?;
            Ok(CanonicalRow {
                county_key: format!("{:0>width$}", row.county, width = COUNTY_KEY_WIDTH),
                cases: row.cases.unwrap_or(0),
                week: row.week,
                year: row.year,
                timestamp,
            })
        })
        .collect()
}

/// Monday of ISO calendar week `week` of `year` (ISO 8601
/// year-week-weekday rule, weekday fixed to Monday).
pub fn week_monday(year: &str, week: &str) -> Result<NaiveDate> {
    let year: i32 = year
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid year `{year}`"))?;
    let week: u32 = week
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid week `{week}`"))?;
    NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
        .ok_or_else(|| anyhow!("no ISO week {week} in {year}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_extract() -> YearExtract {
        YearExtract {
            headers: vec![
                "".into(),
                "SK Flensburg".into(),
                "LK Aachen".into(),
                "City of Berlin".into(),
            ],
            rows: vec![
                vec!["1".into(), "2".into(), "".into(), "7".into()],
                vec!["2".into(), "0".into(), "4".into(), "9".into()],
            ],
        }
    }

    #[test]
    fn cases_are_non_negative_and_never_absent() -> Result<()> {
        let rows = transform_year(&sample_extract(), "2023")?;
        // 2 weeks × 2 county columns; Berlin aggregate excluded
        assert_eq!(rows.len(), 4);
        let flensburg_w1 = rows
            .iter()
            .find(|r| r.week == "1" && r.county_key == "01001")
            .unwrap();
        assert_eq!(flensburg_w1.cases, 2);
        let aachen_w1 = rows
            .iter()
            .find(|r| r.week == "1" && r.county_key == "05334")
            .unwrap();
        assert_eq!(aachen_w1.cases, 0, "missing count imputed to zero");
        Ok(())
    }

    #[test]
    fn berlin_aggregate_is_excluded() -> Result<()> {
        let rows = transform_year(&sample_extract(), "2023")?;
        assert!(rows.iter().all(|r| !r.county_key.contains("Berlin")));
        Ok(())
    }

    #[test]
    fn county_key_is_exactly_five_chars() -> Result<()> {
        let rows = transform_year(&sample_extract(), "2023")?;
        assert!(rows.iter().all(|r| r.county_key.len() == 5));
        Ok(())
    }

    #[test]
    fn timestamp_is_monday_of_iso_week() -> Result<()> {
        assert_eq!(
            week_monday("2023", "1")?,
            NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
        );
        // ISO week 1 of 2021 starts in the previous calendar year
        assert_eq!(
            week_monday("2021", "1")?,
            NaiveDate::from_ymd_opt(2021, 1, 4).unwrap()
        );
        assert_eq!(
            week_monday("2020", "53")?,
            NaiveDate::from_ymd_opt(2020, 12, 28).unwrap()
        );
        Ok(())
    }

    #[test]
    fn nonexistent_week_is_rejected() {
        // 2023 has no ISO week 53
        assert!(week_monday("2023", "53").is_err());
        assert!(week_monday("2023", "w1").is_err());
    }

    #[test]
    fn year_is_stamped_on_every_row() -> Result<()> {
        let rows = transform_year(&sample_extract(), "2019")?;
        assert!(rows.iter().all(|r| r.year == "2019"));
        Ok(())
    }
}
