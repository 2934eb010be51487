//! Cell orchestration: one grid cell from first probe to cleaned rows.

use serde::Serialize;

use crate::api::SearchApi;
use crate::controller::{SkippedWindow, WindowController, WindowPolicy};
use crate::derive::derive_fields;
use crate::merge::{dedup, sort_by_taken};
use crate::models::{BoundingBox, DateRange, ExtraFilters, Record};
use crate::progress::{CellState, HarvestEvent, ProgressReporter};
use crate::query::BoundedQueryClient;

/// Self-contained unit of work for one cell. Cheap to clone into a task.
#[derive(Debug, Clone)]
pub struct CellSpec {
    /// 1-based position in the grid.
    pub index: usize,
    pub bbox: BoundingBox,
    pub range: DateRange,
    pub filters: ExtraFilters,
    pub policy: WindowPolicy,
}

/// How far a cell got.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellStatus {
    /// The whole range was walked and every window was fetched.
    Complete,
    /// Some records were retrieved but part of the range is missing.
    Partial { reason: String },
    /// Nothing was retrieved.
    Failed { error: String },
}

impl CellStatus {
    pub fn state(&self) -> CellState {
        match self {
            CellStatus::Complete => CellState::Complete,
            CellStatus::Partial { .. } => CellState::Partial,
            CellStatus::Failed { .. } => CellState::Failed,
        }
    }
}

/// Per-cell summary for the run report.
#[derive(Debug, Clone, Serialize)]
pub struct CellReport {
    pub index: usize,
    pub bbox: BoundingBox,
    /// Count probed for the full date range.
    pub initial_count: u64,
    pub records: usize,
    pub duplicates_dropped: usize,
    pub malformed_taken: usize,
    pub requests: u64,
    pub skipped: Vec<SkippedWindow>,
    pub status: CellStatus,
}

impl CellReport {
    /// Report for a cell whose task never produced an outcome.
    pub fn failed(spec: &CellSpec, error: impl Into<String>) -> Self {
        Self {
            index: spec.index,
            bbox: spec.bbox,
            initial_count: 0,
            records: 0,
            duplicates_dropped: 0,
            malformed_taken: 0,
            requests: 0,
            skipped: Vec::new(),
            status: CellStatus::Failed {
                error: error.into(),
            },
        }
    }
}

/// Cleaned records plus the report for one cell.
#[derive(Debug)]
pub struct CellResult {
    pub report: CellReport,
    pub records: Vec<Record>,
}

/// Harvest one cell: run the window controller to completion, then sort,
/// deduplicate and derive timestamp fields.
///
/// Never fails; errors end up in [`CellReport::status`].
pub async fn run_cell(
    api: &dyn SearchApi,
    spec: &CellSpec,
    reporter: &dyn ProgressReporter,
) -> CellResult {
    reporter.report(HarvestEvent::CellStarted {
        cell: spec.index,
        bbox: spec.bbox,
    });
    log::info!(
        "cell {}: {} over {} via {}",
        spec.index,
        spec.bbox,
        spec.range,
        api.name()
    );

    let client = BoundedQueryClient::new(api, spec.bbox, &spec.filters)
        .with_page_size(spec.policy.page_size);
    let outcome = WindowController::new(spec.index, client, spec.range, &spec.policy, reporter)
        .run()
        .await;

    let mut records = outcome.records;
    sort_by_taken(&mut records);
    let duplicates_dropped = dedup(&mut records);
    let malformed_taken = derive_fields(&mut records);
    if malformed_taken > 0 {
        log::warn!(
            "cell {}: {} records with an unexpected datetaken layout",
            spec.index,
            malformed_taken
        );
    }

    let status = match (&outcome.failure, outcome.fetched.is_empty()) {
        (Some(err), true) => CellStatus::Failed {
            error: err.to_string(),
        },
        (Some(err), false) => CellStatus::Partial {
            reason: err.to_string(),
        },
        (None, _) if !outcome.skipped.is_empty() => CellStatus::Partial {
            reason: format!(
                "{} one-day windows exceeded the cap and were skipped",
                outcome.skipped.len()
            ),
        },
        (None, _) => CellStatus::Complete,
    };

    log::info!(
        "cell {}: initial count {}, retrieved {} records ({} duplicates dropped, {} requests)",
        spec.index,
        outcome.initial_count,
        records.len(),
        duplicates_dropped,
        outcome.requests
    );
    reporter.report(HarvestEvent::CellFinished {
        cell: spec.index,
        state: status.state(),
        records: records.len(),
        requests: outcome.requests,
    });

    CellResult {
        report: CellReport {
            index: spec.index,
            bbox: spec.bbox,
            initial_count: outcome.initial_count,
            records: records.len(),
            duplicates_dropped,
            malformed_taken,
            requests: outcome.requests,
            skipped: outcome.skipped,
            status,
        },
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::scripted::ScriptedApi;
    use serde_json::json;

    fn spec() -> CellSpec {
        CellSpec {
            index: 1,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap(),
            range: DateRange::from_years(2010, 2010).unwrap(),
            filters: ExtraFilters::new(),
            policy: WindowPolicy::default(),
        }
    }

    fn photo(id: &str, taken: &str) -> Record {
        Record::from_value(json!({
            "id": id,
            "longitude": 0.5,
            "latitude": 0.5,
            "datetaken": taken,
            "dateupload": "1262304000",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_overlap_duplicates_removed_and_fields_derived() {
        // dense enough to need several windows, so the one-day overlaps
        // return the same photos twice
        let mut data = Vec::new();
        let mut day = chrono::NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        let mut n = 0;
        while day.format("%Y").to_string() == "2010" {
            for h in 0..20 {
                n += 1;
                data.push(photo(&n.to_string(), &format!("{} {:02}:00:00", day, h)));
            }
            day = day.succ_opt().unwrap();
        }
        let api = ScriptedApi::with_dataset(data);
        let result = run_cell(&api, &spec(), &NoProgress).await;

        assert_eq!(result.report.status, CellStatus::Complete);
        assert_eq!(result.records.len(), 365 * 20);
        assert!(result.report.duplicates_dropped > 0);
        assert_eq!(result.report.initial_count, 365 * 20);

        let first = &result.records[0];
        assert_eq!(first.get_str("year"), Some("2010"));
        assert_eq!(first.get_str("month"), Some("01"));
        assert_eq!(first.get_str("day"), Some("01"));
        assert_eq!(first.get_str("dateupload"), Some("2010-01-01 00:00:00"));

        let mut again = result.records.clone();
        assert_eq!(dedup(&mut again), 0);
    }

    #[tokio::test]
    async fn test_failure_before_any_fetch_is_failed() {
        let api = ScriptedApi::with_counts(|_, _| 100).reject_requests(&[1]);
        let result = run_cell(&api, &spec(), &NoProgress).await;
        assert!(matches!(result.report.status, CellStatus::Failed { .. }));
        assert!(result.records.is_empty());
    }

    #[tokio::test]
    async fn test_failure_after_fetch_is_partial() {
        let mut spec = spec();
        spec.range = DateRange::from_years(2008, 2010).unwrap();
        let api = ScriptedApi::with_counts(|_, w| w.days() as u64 * 4).fail_requests(&[18]);
        let result = run_cell(&api, &spec, &NoProgress).await;
        assert!(matches!(result.report.status, CellStatus::Partial { .. }));
        assert!(!result.records.is_empty());
    }

    #[tokio::test]
    async fn test_empty_cell_is_complete() {
        let api = ScriptedApi::with_counts(|_, _| 0);
        let result = run_cell(&api, &spec(), &NoProgress).await;
        assert_eq!(result.report.status, CellStatus::Complete);
        assert!(result.records.is_empty());
        assert_eq!(result.report.requests, 1);
    }
}
