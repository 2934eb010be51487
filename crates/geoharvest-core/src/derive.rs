//! Derived timestamp fields.
//!
//! `dateupload` arrives as epoch seconds and is rewritten as a UTC
//! `YYYY-MM-DD hh:mm:ss` string. `year`, `month` and `day` are cut from
//! fixed offsets of `datetaken`, which is only safe while the API keeps
//! the `YYYY-MM-DD...` layout, so the prefix is validated first.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use crate::models::{fields, Record};

pub const UPLOAD_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Add the derived fields to every record.
///
/// Returns the number of records whose taken timestamp could not be split.
/// Those get empty `year`/`month`/`day` values.
pub fn derive_fields(records: &mut [Record]) -> usize {
    let mut malformed = 0;
    for record in records.iter_mut() {
        if let Some(upload) = record.get(fields::DATE_UPLOAD).and_then(format_upload) {
            record.set(fields::DATE_UPLOAD, upload);
        }

        let parts = record.taken().and_then(split_taken);
        let (year, month, day) = match parts {
            Some((y, m, d)) => (y.to_string(), m.to_string(), d.to_string()),
            None => {
                malformed += 1;
                log::warn!(
                    "record {}: unexpected datetaken {:?}",
                    record.id().unwrap_or_default(),
                    record.taken()
                );
                (String::new(), String::new(), String::new())
            }
        };
        record.set(fields::YEAR, year);
        record.set(fields::MONTH, month);
        record.set(fields::DAY, day);
    }
    malformed
}

/// Epoch seconds (string or number) to a UTC timestamp string.
///
/// Anything else, including an already formatted timestamp, yields `None`.
pub fn format_upload(value: &Value) -> Option<String> {
    let secs = match value {
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0).map(|dt| dt.format(UPLOAD_FORMAT).to_string())
}

/// `("YYYY", "MM", "DD")` from a `YYYY-MM-DD...` string.
pub fn split_taken(taken: &str) -> Option<(&str, &str, &str)> {
    let prefix = taken.get(0..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()?;
    Some((&prefix[0..4], &prefix[5..7], &prefix[8..10]))
}
