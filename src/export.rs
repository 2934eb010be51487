//! Persist the merged result set as CSV, optionally zip-compressed.
//!
//! Produces `{dir}/{run_name}.csv`, or `{dir}/{run_name}.zip` holding a
//! single `{run_name}.csv` entry. Rows are written in the order given,
//! which after the run-level merge is ascending taken timestamp.
//!
//! Columns are the union of all record keys: the identity and timestamp
//! columns first, then every other key in sorted order. Fields follow
//! RFC 4180 quoting. Non-string values (numbers, booleans, nested objects)
//! are written as their JSON text; missing values are empty.

use anyhow::{Context, Result};
use geoharvest_core::models::{fields, Record};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const LEADING_COLUMNS: [&str; 6] = [
    fields::ID,
    fields::DATE_TAKEN,
    fields::DATE_UPLOAD,
    fields::YEAR,
    fields::MONTH,
    fields::DAY,
];

/// Column order for a set of records.
pub fn columns(records: &[Record]) -> Vec<String> {
    let rest: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.fields().keys().map(String::as_str))
        .filter(|k| !LEADING_COLUMNS.contains(k))
        .collect();

    LEADING_COLUMNS
        .iter()
        .copied()
        .chain(rest)
        .map(str::to_string)
        .collect()
}

/// Write `records` as CSV to any writer.
pub fn write_csv<W: Write>(records: &[Record], out: &mut W) -> Result<()> {
    let columns = columns(records);

    let header: Vec<String> = columns.iter().map(|c| quote_field(c)).collect();
    writeln!(out, "{}", header.join(","))?;

    for record in records {
        let line: Vec<String> = columns
            .iter()
            .map(|c| quote_field(&cell_text(record.get(c))))
            .collect();
        writeln!(out, "{}", line.join(","))?;
    }
    Ok(())
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// RFC 4180: quote when the field holds a comma, quote, CR or LF, and
/// double any embedded quotes.
pub fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Write the result file and return its path.
pub fn write_records(
    records: &[Record],
    dir: &Path,
    run_name: &str,
    zipped: bool,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let csv_name = format!("{}.csv", run_name);
    let path = if zipped {
        dir.join(format!("{}.zip", run_name))
    } else {
        dir.join(&csv_name)
    };

    let file = File::create(&path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut out = BufWriter::new(file);

    if zipped {
        let mut zip = zip::ZipWriter::new(&mut out);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        zip.start_file(csv_name.as_str(), options)
            .with_context(|| format!("Failed to start zip entry {}", csv_name))?;
        write_csv(records, &mut zip)?;
        zip.finish().context("Failed to finish zip archive")?;
    } else {
        write_csv(records, &mut out)?;
    }
    out.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    log::info!("wrote {} records to {}", records.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Read;

    fn records() -> Vec<Record> {
        vec![
            Record::from_value(json!({
                "id": "1",
                "datetaken": "2010-01-01 10:00:00",
                "dateupload": "2010-01-02 00:00:00",
                "year": "2010", "month": "01", "day": "01",
                "title": "Lake, \"Ontario\"",
                "views": 12,
            }))
            .unwrap(),
            Record::from_value(json!({
                "id": "2",
                "datetaken": "2010-01-03 10:00:00",
                "dateupload": "2010-01-04 00:00:00",
                "year": "2010", "month": "01", "day": "03",
                "tags": "snow\nice",
            }))
            .unwrap(),
        ]
    }

    #[test]
    fn test_columns_leading_then_sorted() {
        assert_eq!(
            columns(&records()),
            vec![
                "id", "datetaken", "dateupload", "year", "month", "day", "tags", "title",
                "views"
            ]
        );
    }

    #[test]
    fn test_quote_field() {
        assert_eq!(quote_field("plain"), "plain");
        assert_eq!(quote_field("a,b"), "\"a,b\"");
        assert_eq!(quote_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(quote_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_write_csv() {
        let mut buf = Vec::new();
        write_csv(&records(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let expected = "id,datetaken,dateupload,year,month,day,tags,title,views\n\
            1,2010-01-01 10:00:00,2010-01-02 00:00:00,2010,01,01,,\"Lake, \"\"Ontario\"\"\",12\n\
            2,2010-01-03 10:00:00,2010-01-04 00:00:00,2010,01,03,\"snow\nice\",,\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_write_plain_csv() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_records(&records(), tmp.path(), "run", false).unwrap();
        assert_eq!(path, tmp.path().join("run.csv"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_write_zipped_csv() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out_dir = tmp.path().join("nested").join("out");
        let path = write_records(&records(), &out_dir, "run", true).unwrap();
        assert_eq!(path, out_dir.join("run.zip"));

        let file = File::open(&path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_name("run.csv").unwrap();
        let mut text = String::new();
        entry.read_to_string(&mut text).unwrap();

        let mut expected = Vec::new();
        write_csv(&records(), &mut expected).unwrap();
        assert_eq!(text.as_bytes(), expected.as_slice());
    }
}
