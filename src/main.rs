use anyhow::Result;
use chrono::{Datelike, Local};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use survscraper::config::{default_downloads_dir, Disease, PipelineConfig};
use survscraper::process::merge::MergeMode;
use survscraper::process::process_disease;
use survscraper::runlog::RunLog;
use survscraper::scrape::{failed_jobs, successful_years, ScrapeOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "survscraper")]
#[command(about = "Collects SurvStat disease-surveillance extracts and merges them into per-disease datasets")]
struct Cli {
    /// Disease to collect, as REMOTE_NAME=alias (repeatable). Defaults
    /// to the disease set of the latest run-log block.
    #[arg(short, long = "disease", value_name = "NAME=ALIAS")]
    diseases: Vec<String>,

    /// First year to collect (defaults to the current year)
    #[arg(long)]
    from_year: Option<i32>,

    /// Last year to collect (defaults to the current year)
    #[arg(long)]
    to_year: Option<i32>,

    /// Merge mode: reconstruct or update
    #[arg(short, long, default_value = "update")]
    mode: String,

    /// Root directory for raw per-year extracts
    #[arg(long, default_value = "data/raw")]
    raw_root: PathBuf,

    /// Root directory for persisted per-disease datasets
    #[arg(long, default_value = "data/preprocessed")]
    processed_root: PathBuf,

    /// Browser download directory (defaults to the platform Downloads folder)
    #[arg(long)]
    downloads_dir: Option<PathBuf>,

    /// Skip the scrape phase and only re-process existing raw files
    #[arg(long)]
    skip_scrape: bool,

    /// Run-log file
    #[arg(long, default_value = "log.txt")]
    run_log: PathBuf,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();
    info!("startup");

    let cli = Cli::parse();
    let run_log = RunLog::new(&cli.run_log);

    let mode: MergeMode = cli.mode.parse()?;
    let diseases = requested_diseases(&cli, &run_log)?;
    let current_year = Local::now().year();
    let from = cli.from_year.unwrap_or(current_year);
    let to = cli.to_year.unwrap_or(current_year);
    let years: Vec<String> = (from..=to).map(|y| y.to_string()).collect();

    let config = PipelineConfig {
        diseases,
        years,
        mode,
        raw_root: cli.raw_root,
        processed_root: cli.processed_root,
        downloads_dir: cli.downloads_dir.unwrap_or_else(default_downloads_dir),
        download_timeout: Duration::from_secs(30),
        poll_interval: Duration::from_secs(2),
    };
    config.validate()?;
    info!(
        diseases = config.diseases.len(),
        years = config.years.len(),
        mode = ?config.mode,
        "run configured"
    );

    // ─── scrape phase ────────────────────────────────────────────────
    let reports = if cli.skip_scrape {
        info!("scrape phase skipped");
        Vec::new()
    } else {
        ScrapeOrchestrator::new(&config).run()
    };

    // ─── process phase ───────────────────────────────────────────────
    for disease in &config.diseases {
        let years = if cli.skip_scrape {
            config.years.clone()
        } else {
            successful_years(&reports, &disease.alias)
        };
        if let Err(e) = process_disease(&config, disease, &years) {
            error!(disease = %disease.alias, error = %e, "processing failed");
        }
    }

    run_log.record(&config.diseases, &config.years)?;

    // ─── summary ─────────────────────────────────────────────────────
    let failed: Vec<_> = failed_jobs(&reports).collect();
    info!(
        jobs = reports.len(),
        succeeded = reports.len() - failed.len(),
        failed = failed.len(),
        "run complete"
    );
    for (report, err) in failed {
        error!(
            disease = %report.disease_alias,
            year = %report.year,
            error = %err,
            "failed job"
        );
    }
    Ok(())
}

fn requested_diseases(cli: &Cli, run_log: &RunLog) -> Result<Vec<Disease>> {
    if cli.diseases.is_empty() {
        let diseases = run_log.read_latest()?;
        if !diseases.is_empty() {
            info!(count = diseases.len(), "disease set taken from run log");
        }
        return Ok(diseases);
    }
    Ok(cli
        .diseases
        .iter()
        .map(|spec| match spec.split_once('=') {
            Some((name, alias)) => Disease::new(name, alias),
            // no alias given: the remote name doubles as the alias
            None => Disease::new(spec.as_str(), spec.as_str()),
        })
        .collect())
}
