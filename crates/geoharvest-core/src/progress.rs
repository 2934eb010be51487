//! Structured progress events.
//!
//! Every probe, resize, fetch, and cell transition is reported as a
//! [`HarvestEvent`] through a [`ProgressReporter`]. Reporting is purely
//! observational; the controller never reads anything back from it.

use serde::Serialize;

use crate::models::{BoundingBox, DateWindow};

/// Which way the controller resized a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeDirection {
    Grow,
    Shrink,
}

/// Coarse cell status carried by [`HarvestEvent::CellFinished`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Complete,
    Partial,
    Failed,
}

/// A single progress event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HarvestEvent {
    CellStarted {
        cell: usize,
        bbox: BoundingBox,
    },
    /// A count-only probe returned.
    Probed {
        cell: usize,
        window: DateWindow,
        count: u64,
        requests: u64,
    },
    Resized {
        cell: usize,
        direction: ResizeDirection,
        from_days: i64,
        to_days: i64,
        count: u64,
    },
    /// About to request every page of `window`.
    Fetching {
        cell: usize,
        window: DateWindow,
        count: u64,
        pages: u32,
    },
    Fetched {
        cell: usize,
        window: DateWindow,
        rows: usize,
        requests: u64,
    },
    /// A one-day window was still over the cap and was not fetched.
    WindowSkipped {
        cell: usize,
        window: DateWindow,
        count: u64,
    },
    CellFinished {
        cell: usize,
        state: CellState,
        records: usize,
        requests: u64,
    },
}

/// Receives progress events. Called from cell tasks, possibly concurrently.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: HarvestEvent);
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: HarvestEvent) {}
}
