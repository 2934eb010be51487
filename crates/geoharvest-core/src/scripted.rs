//! In-memory [`SearchApi`] for tests and dry runs.
//!
//! Two modes:
//!
//! - **Counts**: the total is a deterministic function of `(bbox, window)`
//!   and rows are synthesised to match it.
//! - **Dataset**: a fixed list of records with `longitude`, `latitude` and
//!   `datetaken` fields; a request matches the records inside the bbox
//!   (edges inclusive) taken inside the window.
//!
//! Every request is recorded so tests can assert on the exact call
//! sequence, and individual requests can be made to fail.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::api::{SearchApi, SearchPage, SearchRequest};
use crate::error::{HarvestError, Result};
use crate::models::{BoundingBox, DateWindow, ExtraFilters, Record};

type CountFn = Box<dyn Fn(&BoundingBox, &DateWindow) -> u64 + Send + Sync>;

enum Source {
    Counts(CountFn),
    Dataset(Vec<Record>),
}

/// A request as seen by [`ScriptedApi`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// 1-based position in the request sequence.
    pub seq: u64,
    pub bbox: BoundingBox,
    pub window: DateWindow,
    pub page: u32,
    pub page_size: u32,
    pub filters: ExtraFilters,
    /// Total the API answered with (0 for failed requests).
    pub total: u64,
}

impl RecordedCall {
    /// Probes are the only requests made with page size 1.
    pub fn is_probe(&self) -> bool {
        self.page_size == 1
    }
}

/// Scripted, call-recording search API.
pub struct ScriptedApi {
    source: Source,
    calls: Mutex<Vec<RecordedCall>>,
    failing: Mutex<BTreeSet<u64>>,
    rejecting: Mutex<BTreeSet<u64>>,
}

impl ScriptedApi {
    /// Totals computed by `count`; rows are synthesised.
    pub fn with_counts<F>(count: F) -> Self
    where
        F: Fn(&BoundingBox, &DateWindow) -> u64 + Send + Sync + 'static,
    {
        Self::from_source(Source::Counts(Box::new(count)))
    }

    /// Totals and rows drawn from a fixed record set.
    pub fn with_dataset(records: Vec<Record>) -> Self {
        Self::from_source(Source::Dataset(records))
    }

    fn from_source(source: Source) -> Self {
        Self {
            source,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(BTreeSet::new()),
            rejecting: Mutex::new(BTreeSet::new()),
        }
    }

    /// Make the requests at these 1-based sequence numbers fail transiently.
    pub fn fail_requests(self, seqs: &[u64]) -> Self {
        if let Ok(mut failing) = self.failing.lock() {
            failing.extend(seqs.iter().copied());
        }
        self
    }

    /// Make the requests at these 1-based sequence numbers be rejected.
    pub fn reject_requests(self, seqs: &[u64]) -> Self {
        if let Ok(mut rejecting) = self.rejecting.lock() {
            rejecting.extend(seqs.iter().copied());
        }
        self
    }

    /// Every request made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn matching(bbox: &BoundingBox, window: &DateWindow, records: &[Record]) -> Vec<Record> {
        records
            .iter()
            .filter(|r| {
                let x = r.get("longitude").and_then(as_f64);
                let y = r.get("latitude").and_then(as_f64);
                let inside = match (x, y) {
                    (Some(x), Some(y)) => bbox.contains(x, y),
                    _ => false,
                };
                inside && r.taken().is_some_and(|t| window.contains_taken(t))
            })
            .cloned()
            .collect()
    }

    /// Total plus the rows at `[offset, offset + size)`.
    fn answer(
        &self,
        bbox: &BoundingBox,
        window: &DateWindow,
        offset: u64,
        size: u64,
    ) -> (u64, Vec<Record>) {
        match &self.source {
            Source::Counts(count) => {
                let total = count(bbox, window);
                let end = total.min(offset.saturating_add(size));
                let rows = (offset.min(end)..end)
                    .map(|i| synthesize(bbox, window, i))
                    .collect();
                (total, rows)
            }
            Source::Dataset(records) => {
                let all = Self::matching(bbox, window, records);
                let total = all.len() as u64;
                let rows = all
                    .into_iter()
                    .skip(offset as usize)
                    .take(size as usize)
                    .collect();
                (total, rows)
            }
        }
    }
}

#[async_trait]
impl SearchApi for ScriptedApi {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchPage> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| HarvestError::transient("scripted api lock poisoned"))?;
        let seq = calls.len() as u64 + 1;

        let fail = self.failing.lock().map(|f| f.contains(&seq)).unwrap_or(false);
        let reject = self
            .rejecting
            .lock()
            .map(|r| r.contains(&seq))
            .unwrap_or(false);

        let mut call = RecordedCall {
            seq,
            bbox: *request.bbox,
            window: request.window,
            page: request.page,
            page_size: request.page_size,
            filters: request.filters.clone(),
            total: 0,
        };

        if fail {
            calls.push(call);
            return Err(HarvestError::transient(format!(
                "scripted failure on request {}",
                seq
            )));
        }
        if reject {
            calls.push(call);
            return Err(HarvestError::rejected(format!(
                "scripted rejection on request {}",
                seq
            )));
        }

        let size = request.page_size.max(1) as u64;
        let offset = (request.page.max(1) as u64 - 1) * size;
        let (total, mut rows) = self.answer(request.bbox, &request.window, offset, size);
        if request.page_size == 1 {
            // probes only need the total
            rows.clear();
        }
        call.total = total;
        calls.push(call);

        Ok(SearchPage { total, rows })
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn synthesize(bbox: &BoundingBox, window: &DateWindow, i: u64) -> Record {
    let id = format!("{}:{}:{}", bbox.to_query_param(), window.start, i);
    Record::from_value(json!({
        "id": id,
        "datetaken": format!("{} 12:00:00", window.start),
        "dateupload": "1262304000",
        "longitude": bbox.min_x(),
        "latitude": bbox.min_y(),
    }))
    .unwrap_or_default()
}
