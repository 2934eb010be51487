//! Spatial grid partitioning.
//!
//! Smaller boxes match fewer records per day, so a dense region is split
//! into an `n × n` grid before any date windowing happens.

use crate::error::{HarvestError, Result};
use crate::models::BoundingBox;

/// Split `bbox` into `segments²` equal cells.
///
/// Cells are produced row by row from the south-west corner, x varying
/// fastest. The last row and column reuse the input's max edges so the
/// union is exactly `bbox` regardless of floating-point accumulation.
///
/// # Errors
///
/// [`HarvestError::PartitionInput`] if `segments` is zero.
pub fn partition(bbox: &BoundingBox, segments: u32) -> Result<Vec<BoundingBox>> {
    if segments < 1 {
        return Err(HarvestError::partition("segment count must be >= 1"));
    }

    let n = segments as usize;
    let dx = bbox.width() / segments as f64;
    let dy = bbox.height() / segments as f64;

    let edge = |origin: f64, step: f64, max: f64, i: usize| {
        if i == n {
            max
        } else {
            origin + i as f64 * step
        }
    };

    let mut cells = Vec::with_capacity(n * n);
    for j in 0..n {
        let y0 = edge(bbox.min_y(), dy, bbox.max_y(), j);
        let y1 = edge(bbox.min_y(), dy, bbox.max_y(), j + 1);
        for i in 0..n {
            let x0 = edge(bbox.min_x(), dx, bbox.max_x(), i);
            let x1 = edge(bbox.min_x(), dx, bbox.max_x(), i + 1);
            cells.push(BoundingBox::new(x0, y0, x1, y1)?);
        }
    }
    Ok(cells)
}
