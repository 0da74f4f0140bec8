//! Core data models used throughout Metastream.
//!
//! [`RawRecord`] is whatever the metadata table hands back for one row;
//! [`CanonicalRecord`] is the single shape the rest of the system works with.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row from the metadata table, untyped and revision-tolerant.
///
/// Attribute names and casing differ between backend schema revisions
/// (`id`/`Id`/`RecordID`, `filename`/`FileName`, ...). Values are plain
/// JSON; use [`RawRecord::from_typed`] for DynamoDB attribute-typed rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value; anything but an object yields `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Look up an attribute, treating JSON `null` as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// The mapped, revision-independent record the UI works with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub id: String,
    pub filename: String,
    /// ISO-8601 timestamp; empty when the backend omits it or the view
    /// hides it.
    pub upload_time: String,
    pub metadata: Map<String, Value>,
    pub user_id: String,
}

impl CanonicalRecord {
    /// A record with neither id nor filename cannot be matched or keyed.
    pub fn is_resolvable(&self) -> bool {
        !self.id.trim().is_empty() || !self.filename.trim().is_empty()
    }

    /// The object key recorded in metadata (`s3Key`, `key`, or `S3Key`).
    pub fn metadata_key(&self) -> Option<&str> {
        ["s3Key", "key", "S3Key"]
            .iter()
            .filter_map(|k| self.metadata.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// Metadata string value by key, if present and a string.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Ordering applied to a merged record collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Alphabetical by filename, case-insensitive.
    Filename,
    /// Newest upload first; unparseable times sort last.
    #[default]
    UploadTime,
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "filename" | "name" => Ok(SortOrder::Filename),
            "upload_time" | "time" => Ok(SortOrder::UploadTime),
            other => anyhow::bail!(
                "Unknown sort order: '{}'. Must be filename or upload_time.",
                other
            ),
        }
    }
}

/// Client-side filters applied to each scanned page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilters {
    /// Case-insensitive substring of the filename.
    pub filename: Option<String>,
    /// Case-insensitive substring of the filename or serialized metadata.
    pub search_term: Option<String>,
    /// Inclusive lower bound on upload time.
    pub date_from: Option<String>,
    /// Inclusive upper bound on upload time.
    pub date_to: Option<String>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        self.filename.is_none()
            && self.search_term.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
    }
}
