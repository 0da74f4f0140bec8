//! Client-side query filters for scanned pages.
//!
//! The table scan has no server-side filtering, so each page is narrowed
//! here. A record must pass every filter that is set.

use chrono::{DateTime, NaiveDate, Utc};

use crate::merge::parse_upload_time;
use crate::models::{CanonicalRecord, QueryFilters};

/// Keep the records that pass every filter in `filters`.
///
/// Date bounds are inclusive. A date-only `date_to` covers the whole day.
/// When a date bound is set, records whose upload time does not parse are
/// excluded, as are bounds that do not parse.
pub fn apply_filters(records: Vec<CanonicalRecord>, filters: &QueryFilters) -> Vec<CanonicalRecord> {
    if filters.is_empty() {
        return records;
    }

    let filename = filters.filename.as_deref().map(str::to_lowercase);
    let term = filters.search_term.as_deref().map(str::to_lowercase);
    let from = filters.date_from.as_deref().map(|s| parse_bound(s, false));
    let to = filters.date_to.as_deref().map(|s| parse_bound(s, true));

    records
        .into_iter()
        .filter(|r| {
            if let Some(ref f) = filename {
                if !r.filename.to_lowercase().contains(f.as_str()) {
                    return false;
                }
            }
            if let Some(ref t) = term {
                if !matches_search_term(r, t) {
                    return false;
                }
            }
            if from.is_some() || to.is_some() {
                let Some(uploaded) = parse_upload_time(&r.upload_time) else {
                    return false;
                };
                if let Some(bound) = from {
                    if !bound.is_some_and(|b| uploaded >= b) {
                        return false;
                    }
                }
                if let Some(bound) = to {
                    if !bound.is_some_and(|b| uploaded <= b) {
                        return false;
                    }
                }
            }
            true
        })
        .collect()
}

/// Lowercased `term` against the filename and the serialized metadata.
fn matches_search_term(record: &CanonicalRecord, term: &str) -> bool {
    if record.filename.to_lowercase().contains(term) {
        return true;
    }
    serde_json::to_string(&record.metadata)
        .map(|s| s.to_lowercase().contains(term))
        .unwrap_or(false)
}

fn parse_bound(s: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    if end_of_day {
        if let Ok(date) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            return date.and_hms_opt(23, 59, 59).map(|n| n.and_utc());
        }
    }
    parse_upload_time(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(filename: &str, upload_time: &str) -> CanonicalRecord {
        CanonicalRecord {
            id: format!("uploads/{}", filename),
            filename: filename.to_string(),
            upload_time: upload_time.to_string(),
            ..Default::default()
        }
    }

    fn names(records: &[CanonicalRecord]) -> Vec<&str> {
        records.iter().map(|r| r.filename.as_str()).collect()
    }

    #[test]
    fn no_filters_keeps_everything() {
        let records = vec![rec("a.csv", ""), rec("b.csv", "bad")];
        assert_eq!(apply_filters(records, &QueryFilters::default()).len(), 2);
    }

    #[test]
    fn filename_filter_is_case_insensitive() {
        let records = vec![rec("Nutrients.csv", ""), rec("other.json", "")];
        let filters = QueryFilters {
            filename: Some("nutri".into()),
            ..Default::default()
        };
        assert_eq!(names(&apply_filters(records, &filters)), vec!["Nutrients.csv"]);
    }

    #[test]
    fn search_term_matches_metadata() {
        let mut with_meta = rec("x.csv", "");
        with_meta.metadata.insert("columns".into(), json!(["Sodium_mg"]));
        let records = vec![with_meta, rec("y.csv", ""), rec("sodium.txt", "")];
        let filters = QueryFilters {
            search_term: Some("SODIUM".into()),
            ..Default::default()
        };
        assert_eq!(
            names(&apply_filters(records, &filters)),
            vec!["x.csv", "sodium.txt"]
        );
    }

    #[test]
    fn date_range_inclusive_whole_day() {
        let records = vec![
            rec("before.csv", "2024-01-31T23:59:59Z"),
            rec("first.csv", "2024-02-01T00:00:00Z"),
            rec("late.csv", "2024-02-29T18:00:00Z"),
            rec("after.csv", "2024-03-01T00:00:00Z"),
            rec("unknown.csv", "yesterday"),
        ];
        let filters = QueryFilters {
            date_from: Some("2024-02-01".into()),
            date_to: Some("2024-02-29".into()),
            ..Default::default()
        };
        assert_eq!(
            names(&apply_filters(records, &filters)),
            vec!["first.csv", "late.csv"]
        );
    }

    #[test]
    fn unparseable_bound_excludes_all() {
        let filters = QueryFilters {
            date_from: Some("soon".into()),
            ..Default::default()
        };
        assert!(apply_filters(vec![rec("a.csv", "2024-01-01")], &filters).is_empty());
    }
}
