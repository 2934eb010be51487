//! Run coordinator: one task per grid cell, then a global merge.
//!
//! Cells are independent. Each runs as its own tokio task in a [`JoinSet`],
//! gated by a [`Semaphore`] sized to the worker count, and shares only the
//! search API (`Arc<dyn SearchApi>`) and the progress reporter. Once every
//! task has finished the per-cell results are concatenated in cell order,
//! sorted by taken timestamp, and deduplicated.
//!
//! A failing or panicking cell never aborts the others; it shows up in the
//! [`RunReport`] as `Failed`.

use anyhow::{Context, Result};
use geoharvest_core::api::SearchApi;
use geoharvest_core::cell::{run_cell, CellReport, CellResult, CellSpec, CellStatus};
use geoharvest_core::merge::merge;
use geoharvest_core::models::Record;
use geoharvest_core::partition::partition;
use geoharvest_core::progress::{CellState, ProgressReporter};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::Config;

/// Per-cell reports plus the size of the merged result.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub cells: Vec<CellReport>,
    /// Records after the run-level merge.
    pub total_records: usize,
    /// Rows removed by the run-level merge (shared cell edges).
    pub duplicates_dropped: usize,
}

impl RunReport {
    fn count(&self, state: CellState) -> usize {
        self.cells
            .iter()
            .filter(|c| c.status.state() == state)
            .count()
    }

    pub fn complete(&self) -> usize {
        self.count(CellState::Complete)
    }

    pub fn partial(&self) -> usize {
        self.count(CellState::Partial)
    }

    pub fn failed(&self) -> usize {
        self.count(CellState::Failed)
    }

    /// True when no cell retrieved anything. An empty grid never happens
    /// (segments >= 1), but counts as not failed.
    pub fn all_failed(&self) -> bool {
        !self.cells.is_empty() && self.failed() == self.cells.len()
    }
}

pub struct RunOutput {
    pub records: Vec<Record>,
    pub report: RunReport,
}

/// Split the configured bbox into `segments²` cells, each carrying the
/// full date range, filters and window policy. Indices are 1-based.
pub fn plan_cells(config: &Config) -> Result<Vec<CellSpec>> {
    let bbox = config.bbox()?;
    let range = config.date_range()?;
    let filters = config.extra_filters();
    let policy = config.policy();

    let boxes = partition(&bbox, config.run.segments)
        .with_context(|| format!("Failed to partition {} into cells", bbox))?;

    Ok(boxes
        .into_iter()
        .enumerate()
        .map(|(i, cell)| CellSpec {
            index: i + 1,
            bbox: cell,
            range,
            filters: filters.clone(),
            policy: policy.clone(),
        })
        .collect())
}

/// Harvest every cell with at most `workers` running at once.
pub async fn harvest(
    api: Arc<dyn SearchApi>,
    cells: Vec<CellSpec>,
    workers: usize,
    reporter: Arc<dyn ProgressReporter>,
) -> RunOutput {
    let sem = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();

    log::info!(
        "harvesting {} cells with {} workers via {}",
        cells.len(),
        workers.max(1),
        api.name()
    );

    for spec in cells.iter().cloned() {
        let api = Arc::clone(&api);
        let reporter = Arc::clone(&reporter);
        let sem = Arc::clone(&sem);
        tasks.spawn(async move {
            let _permit = match sem.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return CellResult {
                        report: CellReport::failed(&spec, "worker pool closed"),
                        records: Vec::new(),
                    }
                }
            };
            run_cell(api.as_ref(), &spec, reporter.as_ref()).await
        });
    }

    let mut finished: BTreeMap<usize, CellResult> = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => {
                if let Some(err) = failure_reason(&result.report) {
                    log::error!("cell {} failed: {}", result.report.index, err);
                }
                finished.insert(result.report.index, result);
            }
            Err(e) => log::error!("cell task did not finish: {}", e),
        }
    }

    let mut reports = Vec::with_capacity(cells.len());
    let mut parts = Vec::with_capacity(cells.len());
    for spec in &cells {
        match finished.remove(&spec.index) {
            Some(result) => {
                reports.push(result.report);
                parts.push(result.records);
            }
            None => reports.push(CellReport::failed(spec, "cell task panicked")),
        }
    }

    let before: usize = parts.iter().map(Vec::len).sum();
    let records = merge(parts);
    let report = RunReport {
        cells: reports,
        total_records: records.len(),
        duplicates_dropped: before - records.len(),
    };
    log::info!(
        "run finished: {} records, {} complete / {} partial / {} failed cells",
        report.total_records,
        report.complete(),
        report.partial(),
        report.failed()
    );

    RunOutput { records, report }
}

fn failure_reason(report: &CellReport) -> Option<&str> {
    match &report.status {
        CellStatus::Failed { error } => Some(error),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use geoharvest_core::progress::NoProgress;
    use geoharvest_core::scripted::ScriptedApi;

    const CONFIG: &str = r#"
[run]
name = "grid"
bbox = [0.0, 0.0, 2.0, 2.0]
segments = 2
start_year = 2010
end_year = 2010

[filters]
has_geo = 1
"#;

    #[test]
    fn test_plan_cells() {
        let cfg = parse_config(CONFIG).unwrap();
        let cells = plan_cells(&cfg).unwrap();
        assert_eq!(cells.len(), 4);
        assert_eq!(
            cells.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(cells[0].bbox.min_x(), 0.0);
        assert_eq!(cells[3].bbox.max_y(), 2.0);
        assert!(cells.iter().all(|c| c.filters.get("has_geo") == Some("1")));
        assert!(cells.iter().all(|c| c.range.days() == 365));
    }

    #[tokio::test]
    async fn test_empty_cells_complete_alongside_populated_ones() {
        let cfg = parse_config(CONFIG).unwrap();
        let cells = plan_cells(&cfg).unwrap();
        // only the lower-left cell has data
        let api = ScriptedApi::with_counts(|bbox, w| {
            if bbox.min_x() == 0.0 && bbox.min_y() == 0.0 {
                w.days() as u64
            } else {
                0
            }
        });
        let output = harvest(Arc::new(api), cells, 1, Arc::new(NoProgress)).await;

        assert_eq!(output.report.cells.len(), 4);
        assert_eq!(output.report.complete(), 4);
        assert_eq!(output.records.len(), 365);
        assert!(!output.report.all_failed());
    }

    #[tokio::test]
    async fn test_rejected_cell_does_not_abort_the_run() {
        let cfg = parse_config(CONFIG).unwrap();
        let cells = plan_cells(&cfg).unwrap();
        let api = ScriptedApi::with_counts(|_, w| w.days() as u64).reject_requests(&[1]);
        // whichever cell issues the first request is refused outright
        let output = harvest(Arc::new(api), cells, 1, Arc::new(NoProgress)).await;

        assert_eq!(output.report.failed(), 1);
        assert_eq!(output.report.complete(), 3);
        assert_eq!(output.records.len(), 3 * 365);
        assert!(!output.report.all_failed());
    }

    #[tokio::test]
    async fn test_all_failed() {
        let cfg = parse_config(CONFIG).unwrap();
        let cells = plan_cells(&cfg).unwrap();
        let api = ScriptedApi::with_counts(|_, _| 10).reject_requests(&[1, 2, 3, 4]);
        let output = harvest(Arc::new(api), cells, 2, Arc::new(NoProgress)).await;

        assert_eq!(output.report.failed(), 4);
        assert!(output.report.all_failed());
        assert!(output.records.is_empty());
    }
}
