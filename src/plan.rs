//! Job sizing before a harvest: `geoharvest cells` and `geoharvest probe`.
//!
//! `cells` prints the grid without touching the network. `probe` asks the
//! API for each cell's full-range count, one request per cell, which gives
//! a lower bound on the windows and requests a real run will need.

use anyhow::Result;
use geoharvest_core::api::SearchApi;
use geoharvest_core::cell::CellSpec;
use geoharvest_core::query::{page_count, BoundedQueryClient};

use crate::config::Config;
use crate::coordinator::plan_cells;
use crate::progress::format_number;

/// Print the partitioned grid.
pub fn list_cells(config: &Config) -> Result<()> {
    let cells = plan_cells(config)?;
    let range = config.date_range()?;

    println!(
        "{} cells ({} x {}) over {} ({} days)",
        cells.len(),
        config.run.segments,
        config.run.segments,
        range,
        range.days()
    );
    println!(
        "{:<6} {:>12} {:>12} {:>12} {:>12}",
        "CELL", "MIN_X", "MIN_Y", "MAX_X", "MAX_Y"
    );
    for cell in &cells {
        println!(
            "{:<6} {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
            cell.index,
            cell.bbox.min_x(),
            cell.bbox.min_y(),
            cell.bbox.max_x(),
            cell.bbox.max_y()
        );
    }
    Ok(())
}

/// Full-range count for every cell, one probe each, in cell order.
pub async fn probe_counts(api: &dyn SearchApi, cells: &[CellSpec]) -> Result<Vec<u64>> {
    let mut counts = Vec::with_capacity(cells.len());
    for cell in cells {
        let mut client = BoundedQueryClient::new(api, cell.bbox, &cell.filters);
        let count = client.probe_count(cell.range.as_window()).await?;
        log::debug!("cell {}: {} records over {}", cell.index, count, cell.range);
        counts.push(count);
    }
    Ok(counts)
}

/// Probe every cell and print the counts with a rough request estimate.
pub async fn run_probe(api: &dyn SearchApi, config: &Config) -> Result<()> {
    let cells = plan_cells(config)?;
    let policy = config.policy();
    let counts = probe_counts(api, &cells).await?;

    println!(
        "{:<6} {:>12} {:>10} {:>10}",
        "CELL", "RECORDS", "WINDOWS", "PAGES"
    );
    let mut total = 0u64;
    for (cell, count) in cells.iter().zip(&counts) {
        total += count;
        println!(
            "{:<6} {:>12} {:>10} {:>10}",
            cell.index,
            format_number(*count),
            format!(">= {}", count.div_ceil(policy.cap)),
            format!(">= {}", page_count(*count, policy.page_size))
        );
    }
    println!();
    println!("  Total: {} records", format_number(total));
    Ok(())
}
