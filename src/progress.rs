//! Harvest progress reporting.
//!
//! Renders the core's [`HarvestEvent`]s so long extractions show what each
//! cell is doing: probes, window resizes, page fetches. Progress goes to
//! **stderr** so stdout stays parseable for scripts.

use std::io::Write;

use geoharvest_core::progress::{
    CellState, HarvestEvent, NoProgress, ProgressReporter, ResizeDirection,
};

/// Human-friendly lines: `cell 3  probe [2008-01-01, 2008-07-14)  3,812 records`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: HarvestEvent) {
        let line = match &event {
            HarvestEvent::CellStarted { cell, bbox } => {
                format!("cell {}  start  {}\n", cell, bbox)
            }
            HarvestEvent::Probed {
                cell,
                window,
                count,
                requests,
            } => format!(
                "cell {}  probe  {}  {} records  ({} requests)\n",
                cell,
                window,
                format_number(*count),
                format_number(*requests)
            ),
            HarvestEvent::Resized {
                cell,
                direction,
                from_days,
                to_days,
                count,
            } => {
                let verb = match direction {
                    ResizeDirection::Grow => "grow",
                    ResizeDirection::Shrink => "shrink",
                };
                format!(
                    "cell {}  {}  {} -> {} days  {} records\n",
                    cell,
                    verb,
                    from_days,
                    to_days,
                    format_number(*count)
                )
            }
            HarvestEvent::Fetching {
                cell,
                window,
                count,
                pages,
            } => format!(
                "cell {}  fetch  {}  {} records in {} pages\n",
                cell,
                window,
                format_number(*count),
                pages
            ),
            HarvestEvent::Fetched {
                cell,
                window,
                rows,
                requests,
            } => format!(
                "cell {}  done   {}  current date {}  {} rows  ({} requests)\n",
                cell,
                window,
                window.end,
                format_number(*rows as u64),
                format_number(*requests)
            ),
            HarvestEvent::WindowSkipped {
                cell,
                window,
                count,
            } => format!(
                "cell {}  SKIP   {}  {} records exceed the cap at minimum width\n",
                cell,
                window,
                format_number(*count)
            ),
            HarvestEvent::CellFinished {
                cell,
                state,
                records,
                requests,
            } => {
                let state = match state {
                    CellState::Complete => "complete",
                    CellState::Partial => "PARTIAL",
                    CellState::Failed => "FAILED",
                };
                format!(
                    "cell {}  {}  {} records  ({} requests)\n",
                    cell,
                    state,
                    format_number(*records as u64),
                    format_number(*requests)
                )
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: HarvestEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
