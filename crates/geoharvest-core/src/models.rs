//! Core data models used throughout geoharvest.
//!
//! Bounding boxes and date windows describe *what* is queried; [`Record`]
//! is what comes back. Records are an open attribute set (a JSON object)
//! because the remote API decides which extra fields it returns.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{HarvestError, Result};

/// An axis-aligned geographic box: `(min_x, min_y, max_x, max_y)`.
///
/// Immutable once constructed; [`BoundingBox::new`] enforces
/// `min_x < max_x` and `min_y < max_y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
            return Err(HarvestError::partition(
                "bounding box coordinates must be finite",
            ));
        }
        if min_x >= max_x || min_y >= max_y {
            return Err(HarvestError::partition(format!(
                "bounding box must satisfy min < max on both axes, got [{}, {}, {}, {}]",
                min_x, min_y, max_x, max_y
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Build from a `[min_x, min_y, max_x, max_y]` slice.
    pub fn from_slice(coords: &[f64]) -> Result<Self> {
        match coords {
            [a, b, c, d] => Self::new(*a, *b, *c, *d),
            _ => Err(HarvestError::partition(format!(
                "bounding box needs exactly 4 coordinates, got {}",
                coords.len()
            ))),
        }
    }

    pub fn min_x(&self) -> f64 {
        self.min_x
    }
    pub fn min_y(&self) -> f64 {
        self.min_y
    }
    pub fn max_x(&self) -> f64 {
        self.max_x
    }
    pub fn max_y(&self) -> f64 {
        self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Area shared with `other` (zero when they only touch or are disjoint).
    pub fn intersection_area(&self, other: &BoundingBox) -> f64 {
        let w = self.max_x.min(other.max_x) - self.min_x.max(other.min_x);
        let h = self.max_y.min(other.max_y) - self.min_y.max(other.min_y);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    /// Inclusive point containment.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Comma-separated form expected by the search API: `"min_x,min_y,max_x,max_y"`.
    pub fn to_query_param(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}, {:.4}, {:.4}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// The full date range of a run, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(HarvestError::partition(format!(
                "date range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// `[Jan 1 start_year, Jan 1 (end_year + 1))`; the end year is inclusive.
    pub fn from_years(start_year: i32, end_year: i32) -> Result<Self> {
        if end_year < start_year {
            return Err(HarvestError::partition(format!(
                "end year {} is before start year {}",
                end_year, start_year
            )));
        }
        let start = NaiveDate::from_ymd_opt(start_year, 1, 1)
            .ok_or_else(|| HarvestError::partition(format!("invalid year {}", start_year)))?;
        let end = end_year
            .checked_add(1)
            .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
            .ok_or_else(|| HarvestError::partition(format!("invalid year {}", end_year)))?;
        Self::new(start, end)
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn as_window(&self) -> DateWindow {
        DateWindow {
            start: self.start,
            end: self.end,
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.start, self.end)
    }
}

/// One query window `[start, end)` inside a cell's [`DateRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Whether `taken` (a `YYYY-MM-DD...` string) falls inside the window.
    pub fn contains_taken(&self, taken: &str) -> bool {
        match taken.get(0..10).and_then(|s| s.parse::<NaiveDate>().ok()) {
            Some(day) => day >= self.start && day < self.end,
            None => false,
        }
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Extra API filter parameters, forwarded verbatim on every request.
///
/// The core never inspects these values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraFilters(BTreeMap<String, String>);

impl ExtraFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Field names the pipeline relies on.
pub mod fields {
    pub const ID: &str = "id";
    pub const DATE_TAKEN: &str = "datetaken";
    pub const DATE_UPLOAD: &str = "dateupload";
    pub const YEAR: &str = "year";
    pub const MONTH: &str = "month";
    pub const DAY: &str = "day";
}

/// One retrieved observation.
///
/// Keys are kept sorted (serde_json's default map), which makes the
/// full-row identity used for deduplication independent of the order in
/// which the API listed the fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Wrap a JSON value; returns `None` if it is not an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Record identifier; the API sends it as a string but numbers are accepted.
    pub fn id(&self) -> Option<String> {
        match self.0.get(fields::ID)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Taken timestamp, `YYYY-MM-DD hh:mm:ss`.
    pub fn taken(&self) -> Option<&str> {
        self.get_str(fields::DATE_TAKEN)
    }

    /// Digest over every key and value; two records with the same digest
    /// are duplicates.
    pub fn identity(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for (key, value) in &self.0 {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.to_string().as_bytes());
            hasher.update([0u8]);
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bbox_rejects_inverted_axes() {
        assert!(BoundingBox::new(1.0, 0.0, 0.0, 1.0).is_err());
        assert!(BoundingBox::new(0.0, 1.0, 1.0, 1.0).is_err());
        assert!(BoundingBox::new(0.0, 0.0, f64::NAN, 1.0).is_err());
        assert!(BoundingBox::new(-79.2201, 43.7838, -78.7961, 44.0474).is_ok());
    }

    #[test]
    fn bbox_from_slice_needs_four() {
        assert!(BoundingBox::from_slice(&[0.0, 0.0, 1.0]).is_err());
        let b = BoundingBox::from_slice(&[0.0, 0.0, 2.0, 1.0]).unwrap();
        assert_eq!(b.area(), 2.0);
        assert_eq!(b.to_query_param(), "0,0,2,1");
    }

    #[test]
    fn intersection_of_touching_boxes_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let b = BoundingBox::new(1.0, 0.0, 2.0, 1.0).unwrap();
        let c = BoundingBox::new(0.5, 0.5, 1.5, 1.5).unwrap();
        assert_eq!(a.intersection_area(&b), 0.0);
        assert!((a.intersection_area(&c) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn date_range_from_years_is_end_exclusive() {
        let r = DateRange::from_years(2008, 2010).unwrap();
        assert_eq!(r.start, NaiveDate::from_ymd_opt(2008, 1, 1).unwrap());
        assert_eq!(r.end, NaiveDate::from_ymd_opt(2011, 1, 1).unwrap());
        assert_eq!(r.days(), 366 + 365 + 365);
        assert!(DateRange::from_years(2010, 2008).is_err());
    }

    #[test]
    fn window_contains_taken() {
        let w = DateWindow::new(
            NaiveDate::from_ymd_opt(2010, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2010, 3, 5).unwrap(),
        );
        assert!(w.contains_taken("2010-03-01 00:00:00"));
        assert!(w.contains_taken("2010-03-04 23:59:59"));
        assert!(!w.contains_taken("2010-03-05 00:00:00"));
        assert!(!w.contains_taken("garbage"));
    }

    #[test]
    fn identity_ignores_field_order() {
        let a = Record::from_value(json!({"id": "1", "datetaken": "2010-01-01", "tags": "x"}))
            .unwrap();
        let b = Record::from_value(json!({"tags": "x", "datetaken": "2010-01-01", "id": "1"}))
            .unwrap();
        let c = Record::from_value(json!({"id": "1", "datetaken": "2010-01-01", "tags": "y"}))
            .unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn date_range_rejects_unrepresentable_years() {
        assert!(DateRange::from_years(2008, i32::MAX).is_err());
        assert!(DateRange::from_years(2010, 2009).is_err());
        let r = DateRange::from_years(2008, 2010).unwrap();
        assert_eq!(r.days(), 1096);
    }

    #[test]
    fn record_id_accepts_numbers() {
        let r = Record::from_value(json!({"id": 42})).unwrap();
        assert_eq!(r.id().as_deref(), Some("42"));
        assert!(Record::from_value(json!([1, 2])).is_none());
    }
}
