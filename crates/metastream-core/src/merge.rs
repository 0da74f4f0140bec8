//! Dedupe and merge of paginated record collections.
//!
//! The dashboard scans the table a page at a time and the same logical
//! upload can show up more than once (retried uploads, schema revisions
//! writing sibling rows). Every record gets a [`dedupe_key`]; folding a new
//! page in with [`merge_in`] keeps one record per key, letting the later
//! one win.
//!
//! # Dedupe key
//!
//! ```text
//! normalize(id | s3Key | filename) + "::" + (uploadTime | normalize(filename))
//! ```

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::models::{CanonicalRecord, SortOrder};
use crate::normalize::normalize;

/// Stable identity of the logical upload behind a record.
pub fn dedupe_key(record: &CanonicalRecord) -> String {
    let primary = [
        Some(record.id.as_str()),
        record.metadata_key(),
        Some(record.filename.as_str()),
    ]
    .into_iter()
    .map(normalize)
    .find(|s| !s.is_empty())
    .unwrap_or_default();

    let upload_time = record.upload_time.trim();
    let discriminator = if upload_time.is_empty() {
        normalize(Some(&record.filename))
    } else {
        upload_time.to_string()
    };

    format!("{}::{}", primary, discriminator)
}

/// Fold `incoming` into `existing` and return a new, sorted collection.
///
/// Records are keyed by [`dedupe_key`]; on a collision the later record
/// (in `existing ++ incoming` order) replaces the earlier one but keeps its
/// slot. Unresolvable records (no id, no filename) are dropped. The result
/// is stably sorted by `order`. Neither input is modified.
pub fn merge_in(
    existing: &[CanonicalRecord],
    incoming: &[CanonicalRecord],
    order: SortOrder,
) -> Vec<CanonicalRecord> {
    let mut merged: Vec<CanonicalRecord> = Vec::with_capacity(existing.len() + incoming.len());
    let mut slots: HashMap<String, usize> = HashMap::new();

    for record in existing.iter().chain(incoming.iter()) {
        if !record.is_resolvable() {
            continue;
        }
        let key = dedupe_key(record);
        match slots.get(&key) {
            Some(&idx) => merged[idx] = record.clone(),
            None => {
                slots.insert(key, merged.len());
                merged.push(record.clone());
            }
        }
    }

    sort_records(&mut merged, order);
    merged
}

/// Stable in-place sort by `order`.
pub fn sort_records(records: &mut [CanonicalRecord], order: SortOrder) {
    match order {
        SortOrder::Filename => {
            records.sort_by_cached_key(|r| r.filename.to_lowercase());
        }
        SortOrder::UploadTime => {
            // None (unparseable) is the smallest value, so newest-first
            // puts it at the end.
            records.sort_by_cached_key(|r| std::cmp::Reverse(parse_upload_time(&r.upload_time)));
        }
    }
}

/// Parse an upload timestamp leniently.
///
/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS[.fff]` (read as UTC), and
/// bare `YYYY-MM-DD`. Anything else is `None`.
pub fn parse_upload_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: &str, filename: &str, upload_time: &str) -> CanonicalRecord {
        CanonicalRecord {
            id: id.to_string(),
            filename: filename.to_string(),
            upload_time: upload_time.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn dedupe_key_prefers_id_then_s3_key_then_filename() {
        assert_eq!(
            dedupe_key(&rec("uploads/1-a.csv#full", "a.csv", "2024-01-01T00:00:00Z")),
            "uploads/1-a.csv::2024-01-01T00:00:00Z"
        );

        let mut r = rec("", "a.csv", "");
        r.metadata.insert("s3Key".into(), json!("uploads/1-a.csv"));
        assert_eq!(dedupe_key(&r), "uploads/1-a.csv::a.csv");

        assert_eq!(dedupe_key(&rec("", "a%20b.csv", "")), "a b.csv::a b.csv");
    }

    #[test]
    fn incoming_wins_on_collision() {
        let existing = vec![
            rec("r1", "a.csv", "2024-01-01T00:00:00Z"),
            rec("r2", "b.csv", "2024-01-02T00:00:00Z"),
        ];
        let mut newer = rec("r1", "a.csv", "2024-01-01T00:00:00Z");
        newer.user_id = "u-new".into();
        let incoming = vec![newer.clone()];

        let merged = merge_in(&existing, &incoming, SortOrder::Filename);
        assert_eq!(merged.len(), 2);
        let a: Vec<_> = merged
            .iter()
            .filter(|r| dedupe_key(r) == dedupe_key(&newer))
            .collect();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0], &newer);
        // Inputs untouched.
        assert_eq!(existing[0].user_id, "");
    }

    #[test]
    fn length_bounds_with_unique_keys() {
        let existing = vec![rec("r1", "a.csv", ""), rec("r2", "b.csv", "")];
        let incoming = vec![rec("r3", "c.csv", "")];
        let merged = merge_in(&existing, &incoming, SortOrder::Filename);
        assert!(merged.len() <= existing.len() + incoming.len());
        assert!(merged.len() >= existing.len().max(incoming.len()));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn duplicates_within_one_page_collapse() {
        let incoming = vec![
            rec("r1", "a.csv", "t"),
            rec("r1#full", "a.csv", "t"),
            rec("r1", "a.csv", "t2"),
        ];
        let merged = merge_in(&[], &incoming, SortOrder::Filename);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "r1#full");
    }

    #[test]
    fn unresolvable_records_are_dropped() {
        let merged = merge_in(&[rec("", " ", "")], &[rec("r1", "", "")], SortOrder::Filename);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "r1");
    }

    #[test]
    fn sort_by_filename_is_case_insensitive_and_stable() {
        let merged = merge_in(
            &[rec("1", "b.csv", ""), rec("2", "A.csv", "")],
            &[rec("3", "a.csv", "x")],
            SortOrder::Filename,
        );
        let ids: Vec<_> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn sort_by_upload_time_newest_first_bad_times_last() {
        let merged = merge_in(
            &[
                rec("old", "o.csv", "2023-01-01T00:00:00Z"),
                rec("bad", "x.csv", "not a date"),
                rec("new", "n.csv", "2024-06-01T12:00:00+02:00"),
                rec("empty", "e.csv", ""),
                rec("mid", "m.csv", "2023-06-01"),
            ],
            &[],
            SortOrder::UploadTime,
        );
        let ids: Vec<_> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old", "bad", "empty"]);
    }

    #[test]
    fn parse_upload_time_formats() {
        assert!(parse_upload_time("2024-01-01T00:00:00.123Z").is_some());
        assert!(parse_upload_time("2024-01-01T00:00:00").is_some());
        assert!(parse_upload_time("2024-01-01 08:30:00").is_some());
        assert!(parse_upload_time("2024-01-01").is_some());
        assert!(parse_upload_time("01/02/2024").is_none());
        assert!(parse_upload_time("").is_none());
    }
}
