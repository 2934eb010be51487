//! Sorting and full-row deduplication of result sets.
//!
//! Applied once per cell and once more over the whole run: overlapping
//! date windows and records sitting on a shared cell edge both produce
//! exact duplicates.

use std::collections::HashSet;

use crate::models::Record;

/// Stable sort by taken timestamp; records without one go last.
pub fn sort_by_taken(records: &mut [Record]) {
    records.sort_by(|a, b| match (a.taken(), b.taken()) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// Drop rows identical to an earlier row, keeping first occurrences in order.
///
/// Returns the number of rows removed.
pub fn dedup(records: &mut Vec<Record>) -> usize {
    let before = records.len();
    let mut seen = HashSet::with_capacity(before);
    records.retain(|r| seen.insert(r.identity()));
    before - records.len()
}

/// Concatenate per-cell results, sort globally, and deduplicate.
pub fn merge(parts: Vec<Vec<Record>>) -> Vec<Record> {
    let mut all: Vec<Record> = parts.into_iter().flatten().collect();
    sort_by_taken(&mut all);
    let dropped = dedup(&mut all);
    if dropped > 0 {
        log::info!("merge: dropped {} duplicate rows", dropped);
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: &str, taken: &str) -> Record {
        Record::from_value(json!({"id": id, "datetaken": taken, "owner": "o"})).unwrap()
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let mut rows = vec![
            rec("1", "2010-01-01 00:00:00"),
            rec("2", "2010-01-02 00:00:00"),
            rec("1", "2010-01-01 00:00:00"),
        ];
        assert_eq!(dedup(&mut rows), 1);
        let ids: Vec<String> = rows.iter().filter_map(Record::id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let mut rows = vec![
            rec("1", "2010-01-01 00:00:00"),
            rec("1", "2010-01-01 00:00:00"),
            rec("1", "2010-01-03 00:00:00"),
            rec("2", "2010-01-02 00:00:00"),
        ];
        dedup(&mut rows);
        let once = rows.clone();
        assert_eq!(dedup(&mut rows), 0);
        assert_eq!(rows, once);
    }

    #[test]
    fn test_same_id_different_row_is_kept() {
        let mut rows = vec![
            rec("1", "2010-01-01 00:00:00"),
            rec("1", "2010-01-01 00:00:01"),
        ];
        assert_eq!(dedup(&mut rows), 0);
    }

    #[test]
    fn test_sort_is_stable_and_missing_last() {
        let mut rows = vec![
            Record::from_value(json!({"id": "x"})).unwrap(),
            rec("b", "2010-01-02 00:00:00"),
            rec("a", "2010-01-01 00:00:00"),
            rec("c", "2010-01-02 00:00:00"),
        ];
        sort_by_taken(&mut rows);
        let ids: Vec<String> = rows.iter().filter_map(Record::id).collect();
        assert_eq!(ids, vec!["a", "b", "c", "x"]);
    }

    #[test]
    fn test_merge_across_cells() {
        let shared = rec("edge", "2010-06-01 12:00:00");
        let merged = merge(vec![
            vec![rec("a", "2010-06-02 00:00:00"), shared.clone()],
            vec![shared.clone(), rec("b", "2010-05-01 00:00:00")],
        ]);
        let ids: Vec<String> = merged.iter().filter_map(Record::id).collect();
        assert_eq!(ids, vec!["b", "edge", "a"]);
        assert_eq!(merge(vec![merged.clone()]), merged);
    }
}
