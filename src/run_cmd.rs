//! `geoharvest run`: plan, harvest, write, report.

use anyhow::Result;
use geoharvest_core::api::SearchApi;
use geoharvest_core::cell::CellStatus;
use geoharvest_core::progress::ProgressReporter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::coordinator::{harvest, plan_cells, RunReport};
use crate::export::write_records;
use crate::flickr::FlickrApi;
use crate::progress::format_number;
use crate::retry::RetryingApi;

/// The configured search API with retry and backoff applied.
pub fn connect(config: &Config) -> Result<Arc<dyn SearchApi>> {
    let flickr = FlickrApi::from_config(&config.api)?;
    Ok(Arc::new(RetryingApi::new(
        flickr,
        config.api.max_retries,
        Duration::from_millis(config.api.retry_base_ms),
    )))
}

/// Harvest every cell, write the merged result, and print the run report.
///
/// `output` and `zipped` override `[output]` when given.
pub async fn run_harvest(
    config: &Config,
    api: Arc<dyn SearchApi>,
    output: Option<&Path>,
    zipped: bool,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<(RunReport, PathBuf)> {
    let cells = plan_cells(config)?;
    let run = harvest(api, cells, config.workers(), reporter).await;

    let dir = output.unwrap_or(&config.output.dir);
    let zipped = zipped || config.output.zipped;
    let path = write_records(&run.records, dir, &config.run.name, zipped)?;

    print_report(&run.report, &path);
    Ok((run.report, path))
}

pub fn print_report(report: &RunReport, path: &Path) {
    println!(
        "{:<6} {:<10} {:>12} {:>10} {:>10} {:>8}",
        "CELL", "STATUS", "INITIAL", "RECORDS", "REQUESTS", "SKIPPED"
    );
    for cell in &report.cells {
        let status = match &cell.status {
            CellStatus::Complete => "complete",
            CellStatus::Partial { .. } => "partial",
            CellStatus::Failed { .. } => "failed",
        };
        println!(
            "{:<6} {:<10} {:>12} {:>10} {:>10} {:>8}",
            cell.index,
            status,
            format_number(cell.initial_count),
            format_number(cell.records as u64),
            format_number(cell.requests),
            cell.skipped.len()
        );
        match &cell.status {
            CellStatus::Partial { reason } => println!("       {}", reason),
            CellStatus::Failed { error } => println!("       {}", error),
            CellStatus::Complete => {}
        }
        for skipped in &cell.skipped {
            println!(
                "       skipped {} ({} records)",
                skipped.window,
                format_number(skipped.count)
            );
        }
    }
    println!();
    println!(
        "  Cells:    {} complete, {} partial, {} failed",
        report.complete(),
        report.partial(),
        report.failed()
    );
    println!(
        "  Records:  {} ({} cross-cell duplicates dropped)",
        format_number(report.total_records as u64),
        report.duplicates_dropped
    );
    println!("  Output:   {}", path.display());
}
