//! Adaptive date-window controller.
//!
//! The search API never returns more than [`CAP`] records for one query, so
//! a cell's date range has to be cut into windows that each match at most
//! that many. The controller walks the range from start to end and sizes
//! every window with a multiplicative feedback rule:
//!
//! | Probed count | Action |
//! |--------------|--------|
//! | `> cap` | shrink width ×0.85 and re-probe, **repeat until `<= cap`** |
//! | `0 < n < band_floor` | grow width ×1.25 and re-probe, **once per window** |
//! | `0` or in `(band_floor, cap]` | fetch |
//!
//! Shrinking is exhaustive because fetching an over-cap window silently
//! loses records. Growing is a single step per window because it only saves
//! requests. After a fetch the next window starts one day before the
//! previous end, and the duplicates from that overlap are removed later.
//!
//! ```text
//!  Init ─▶ Probing ─┬─▶ Shrinking ─┐
//!             ▲     ├─▶ Growing ───┤
//!             │     └─▶ Fetching ──┴─▶ Advancing ─▶ Done
//!             └──────────────────────────┘
//! ```
//!
//! Window widths keep sub-day precision; query dates are truncated to whole
//! days. One day is the minimum width: a one-day window still over the cap
//! is reported as skipped and the controller moves past it.

use chrono::Duration;
use serde::Serialize;

use crate::error::{HarvestError, Result};
use crate::models::{DateRange, DateWindow, Record};
use crate::progress::{HarvestEvent, ProgressReporter, ResizeDirection};
use crate::query::{page_count, BoundedQueryClient, PAGE_SIZE};

/// Maximum number of records the API returns for one query.
pub const CAP: u64 = 4000;
/// Non-zero counts below this trigger a growth step.
pub const BAND_FLOOR: u64 = 3000;
pub const GROW_FACTOR: f64 = 1.25;
pub const SHRINK_FACTOR: f64 = 0.85;

/// Tunables for the window controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowPolicy {
    pub cap: u64,
    pub band_floor: u64,
    pub grow_factor: f64,
    pub shrink_factor: f64,
    pub page_size: u32,
    pub min_width_days: i64,
    /// End the cell as soon as a fetched window matched nothing.
    pub stop_on_empty_window: bool,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            cap: CAP,
            band_floor: BAND_FLOOR,
            grow_factor: GROW_FACTOR,
            shrink_factor: SHRINK_FACTOR,
            page_size: PAGE_SIZE,
            min_width_days: 1,
            stop_on_empty_window: true,
        }
    }
}

impl WindowPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.cap == 0 {
            return Err(HarvestError::InvalidPolicy("cap must be > 0".into()));
        }
        if self.band_floor >= self.cap {
            return Err(HarvestError::InvalidPolicy(format!(
                "band_floor ({}) must be below cap ({})",
                self.band_floor, self.cap
            )));
        }
        if !(self.grow_factor > 1.0 && self.grow_factor.is_finite()) {
            return Err(HarvestError::InvalidPolicy(
                "grow_factor must be > 1.0".into(),
            ));
        }
        if !(self.shrink_factor > 0.0 && self.shrink_factor < 1.0) {
            return Err(HarvestError::InvalidPolicy(
                "shrink_factor must be in (0.0, 1.0)".into(),
            ));
        }
        if self.page_size == 0 {
            return Err(HarvestError::InvalidPolicy("page_size must be >= 1".into()));
        }
        if self.min_width_days < 1 {
            return Err(HarvestError::InvalidPolicy(
                "min_width_days must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerPhase {
    Init,
    Probing,
    Shrinking,
    Growing,
    Fetching,
    Advancing,
    Done,
}

/// Mutable sizing state, owned by one controller run.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowState {
    pub window: DateWindow,
    pub width: Duration,
    pub requests: u64,
}

impl WindowState {
    /// The first window covers the whole range.
    fn initial(range: &DateRange) -> Self {
        Self {
            window: range.as_window(),
            width: Duration::days(range.days()),
            requests: 0,
        }
    }

    pub fn width_days(&self) -> i64 {
        self.width.num_days()
    }

    /// Place the window at `start`, keeping the current width; the end is
    /// truncated to whole days and clamped to the range end.
    ///
    /// A clamped window also clamps the width, so the next resize starts
    /// from the window that is actually queried.
    fn anchor(&mut self, start: chrono::NaiveDate, range: &DateRange, min_days: i64) {
        let days = self.width.num_days().max(min_days);
        let end = start + Duration::days(days);
        if end > range.end {
            self.window = DateWindow::new(start, range.end);
            self.width = range.end - start;
        } else {
            self.window = DateWindow::new(start, end);
        }
    }

    fn scale(&mut self, factor: f64, min_days: i64) {
        let ms = (self.width.num_milliseconds() as f64 * factor) as i64;
        self.width = Duration::milliseconds(ms).max(Duration::days(min_days));
    }
}

/// A window whose pages were fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchedWindow {
    pub window: DateWindow,
    pub count: u64,
    pub rows: usize,
}

/// A minimum-width window that still exceeded the cap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedWindow {
    pub window: DateWindow,
    pub count: u64,
}

/// Everything one controller run produced.
///
/// `failure` is set when a query error ended the run early; records fetched
/// before it are kept.
#[derive(Debug, Default)]
pub struct ControllerOutcome {
    pub records: Vec<Record>,
    pub initial_count: u64,
    pub requests: u64,
    pub fetched: Vec<FetchedWindow>,
    pub skipped: Vec<SkippedWindow>,
    pub failure: Option<HarvestError>,
}

/// Walks one cell's date range end to end.
pub struct WindowController<'a> {
    cell: usize,
    client: BoundedQueryClient<'a>,
    range: DateRange,
    policy: &'a WindowPolicy,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> WindowController<'a> {
    pub fn new(
        cell: usize,
        client: BoundedQueryClient<'a>,
        range: DateRange,
        policy: &'a WindowPolicy,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            cell,
            client,
            range,
            policy,
            reporter,
        }
    }

    /// Run to completion. Never returns an error: query failures are
    /// recorded on the outcome.
    pub async fn run(mut self) -> ControllerOutcome {
        let mut outcome = ControllerOutcome::default();
        if let Err(e) = self.drive(&mut outcome).await {
            log::warn!("cell {}: stopped early: {}", self.cell, e);
            outcome.failure = Some(e);
        }
        outcome.requests = self.client.requests();
        outcome
    }

    async fn drive(&mut self, out: &mut ControllerOutcome) -> Result<()> {
        if self.range.is_empty() {
            return Ok(());
        }

        let range = self.range;
        let min_days = self.policy.min_width_days;
        let mut state = WindowState::initial(&range);
        let mut count = 0u64;
        let mut grow_pending = true;
        let mut phase = ControllerPhase::Init;

        loop {
            log::trace!("cell {}: {:?} {}", self.cell, phase, state.window);
            phase = match phase {
                ControllerPhase::Init => {
                    count = self.probe(&mut state).await?;
                    out.initial_count = count;
                    ControllerPhase::Probing
                }

                ControllerPhase::Probing => {
                    if count > self.policy.cap {
                        ControllerPhase::Shrinking
                    } else if grow_pending
                        && count > 0
                        && count < self.policy.band_floor
                        && state.window.end < range.end
                    {
                        ControllerPhase::Growing
                    } else {
                        ControllerPhase::Fetching
                    }
                }

                ControllerPhase::Growing => {
                    grow_pending = false;
                    count = self
                        .resize(&mut state, ResizeDirection::Grow, count)
                        .await?;
                    ControllerPhase::Probing
                }

                ControllerPhase::Shrinking => {
                    grow_pending = false;
                    if state.width_days() <= min_days {
                        let skipped = SkippedWindow {
                            window: state.window,
                            count,
                        };
                        log::warn!(
                            "cell {}: {}",
                            self.cell,
                            HarvestError::WindowTooNarrow {
                                start: state.window.start,
                                count,
                                cap: self.policy.cap,
                            }
                        );
                        self.reporter.report(HarvestEvent::WindowSkipped {
                            cell: self.cell,
                            window: skipped.window,
                            count,
                        });
                        out.skipped.push(skipped);

                        // no overlap here: re-probing the same day would loop
                        let next_start = state.window.end;
                        if next_start >= range.end {
                            ControllerPhase::Done
                        } else {
                            state.anchor(next_start, &range, min_days);
                            count = self.probe(&mut state).await?;
                            grow_pending = true;
                            ControllerPhase::Probing
                        }
                    } else {
                        count = self
                            .resize(&mut state, ResizeDirection::Shrink, count)
                            .await?;
                        ControllerPhase::Probing
                    }
                }

                ControllerPhase::Fetching => {
                    let window = state.window;
                    self.reporter.report(HarvestEvent::Fetching {
                        cell: self.cell,
                        window,
                        count,
                        pages: page_count(count, self.client.page_size()),
                    });
                    let rows = self.client.fetch_all(window, count).await?;
                    state.requests = self.client.requests();
                    log::info!(
                        "cell {}: fetched {} rows for {} ({} requests so far)",
                        self.cell,
                        rows.len(),
                        window,
                        state.requests
                    );
                    self.reporter.report(HarvestEvent::Fetched {
                        cell: self.cell,
                        window,
                        rows: rows.len(),
                        requests: state.requests,
                    });
                    out.fetched.push(FetchedWindow {
                        window,
                        count,
                        rows: rows.len(),
                    });
                    out.records.extend(rows);
                    ControllerPhase::Advancing
                }

                ControllerPhase::Advancing => {
                    let prev = state.window;
                    // one-day overlap, but always move forward by at least a day
                    let next_start =
                        (prev.end - Duration::days(1)).max(prev.start + Duration::days(1));

                    if prev.end >= range.end
                        || next_start > range.end
                        || (count == 0 && self.policy.stop_on_empty_window)
                    {
                        ControllerPhase::Done
                    } else {
                        state.anchor(next_start, &range, min_days);
                        count = self.probe(&mut state).await?;
                        grow_pending = true;
                        ControllerPhase::Probing
                    }
                }

                ControllerPhase::Done => break,
            };
        }
        Ok(())
    }

    async fn probe(&mut self, state: &mut WindowState) -> Result<u64> {
        let count = self.client.probe_count(state.window).await?;
        state.requests = self.client.requests();
        log::debug!(
            "cell {}: {} matches {} records",
            self.cell,
            state.window,
            count
        );
        self.reporter.report(HarvestEvent::Probed {
            cell: self.cell,
            window: state.window,
            count,
            requests: state.requests,
        });
        Ok(count)
    }

    /// Scale the width, re-anchor at the current start, and re-probe.
    async fn resize(
        &mut self,
        state: &mut WindowState,
        direction: ResizeDirection,
        count: u64,
    ) -> Result<u64> {
        let min_days = self.policy.min_width_days;
        let from_days = state.window.days();
        let factor = match direction {
            ResizeDirection::Grow => self.policy.grow_factor,
            ResizeDirection::Shrink => self.policy.shrink_factor,
        };
        let start = state.window.start;

        // Keep scaling until the whole-day window changes; re-probing an
        // identical window costs a request and tells us nothing.
        loop {
            state.scale(factor, min_days);
            state.anchor(start, &self.range, min_days);
            let days = state.window.days();
            let done = match direction {
                ResizeDirection::Grow => days > from_days || state.window.end >= self.range.end,
                ResizeDirection::Shrink => days < from_days || state.width_days() <= min_days,
            };
            if done {
                break;
            }
        }

        let to_days = state.window.days();
        match direction {
            ResizeDirection::Grow => log::info!(
                "cell {}: {} records, increasing window from {} to {} days",
                self.cell,
                count,
                from_days,
                to_days
            ),
            ResizeDirection::Shrink => log::info!(
                "cell {}: {} records over cap, reducing window from {} to {} days",
                self.cell,
                count,
                from_days,
                to_days
            ),
        }

        let new_count = self.probe(state).await?;
        self.reporter.report(HarvestEvent::Resized {
            cell: self.cell,
            direction,
            from_days,
            to_days,
            count: new_count,
        });
        Ok(new_count)
    }
}
