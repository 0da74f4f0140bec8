//! Helpers for presenting a record's metadata as attribute rows.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::CanonicalRecord;

/// Technical metadata keys never shown, in [`canon_key`] form.
const HIDDEN_KEYS: &[&str] = &[
    "id",
    "userid",
    "s3key",
    "key",
    "s3ley", // common typo in older rows
    "mimetype",
    "sizebytes",
    "lastmodified",
    "parser",
    "preview",
    "originalname",
    "keyphrases",
];

/// Lowercase and drop everything that is not `[a-z0-9]`.
pub fn canon_key(key: &str) -> String {
    key.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

pub fn is_hidden_meta_key(key: &str) -> bool {
    HIDDEN_KEYS.contains(&canon_key(key).as_str())
}

/// Copy of `meta` without the technical keys.
pub fn filter_metadata_for_display(meta: &Map<String, Value>) -> Map<String, Value> {
    meta.iter()
        .filter(|(k, _)| !is_hidden_meta_key(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Attribute-typed tag for a value.
pub fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Array(_) => "LIST",
        Value::Object(_) => "MAP",
        Value::Number(_) => "NUMBER",
        Value::Bool(_) => "BOOL",
        Value::String(_) => "STRING",
    }
}

/// Scalars as plain text, collections as pretty JSON, null as empty.
pub fn flatten_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Human-readable size with binary units. Zero, negative or missing is
/// `"Unknown"`.
pub fn format_bytes(bytes: Option<f64>) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let Some(b) = bytes.filter(|b| b.is_finite() && *b > 0.0) else {
        return "Unknown".to_string();
    };
    let mut val = b;
    let mut unit = 0;
    while val >= 1024.0 && unit < UNITS.len() - 1 {
        val /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{:.0} {}", val, UNITS[unit])
    } else {
        format!("{:.2} {}", val, UNITS[unit])
    }
}

/// Size line for a record: `sizeBytes`, else `sizeMB`, else `"Unknown"`.
pub fn record_size(record: &CanonicalRecord) -> String {
    let bytes = record.metadata.get("sizeBytes").and_then(number_of);
    if bytes.is_some_and(|b| b > 0.0) {
        return format_bytes(bytes);
    }
    match record.metadata.get("sizeMB").and_then(number_of) {
        Some(mb) if mb > 0.0 => format!("{:.2} MB", mb),
        _ => "Unknown".to_string(),
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One line of the details table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeRow {
    pub label: String,
    pub type_tag: &'static str,
    pub value: String,
}

impl AttributeRow {
    fn new(label: &str, value: &Value) -> Self {
        Self {
            label: label.to_string(),
            type_tag: type_tag(value),
            value: flatten_value(value),
        }
    }
}

const KEY_PHRASES: (&str, &str) = ("KeyPhrases", "Key Phrases");
const CONTENT: (&str, &str) = ("Content", "Content");
const COL_COUNT: (&str, &str) = ("ColCount", "Column Count");
const CONTENT_LENGTH: (&str, &str) = ("ContentLength", "Content Length");
const ROW_COUNT: (&str, &str) = ("RowCount", "Row Count");

/// Metadata attributes shown for a file type, in display order.
pub fn attribute_order(file_type: &str) -> &'static [(&'static str, &'static str)] {
    match file_type {
        "tsv" => &[CONTENT, COL_COUNT, CONTENT_LENGTH, ROW_COUNT],
        "csv" | "xlsx" => &[KEY_PHRASES, CONTENT, COL_COUNT, CONTENT_LENGTH, ROW_COUNT],
        "json" | "txt" => &[KEY_PHRASES, CONTENT, CONTENT_LENGTH],
        _ => &[],
    }
}

/// Rows for the details table: the file name, then the type-specific
/// attributes that are present and non-null.
///
/// The file type comes from the metadata `Type`/`type` attribute. A
/// `KeyPhrases` list is shown comma-joined.
pub fn attribute_rows(record: &CanonicalRecord) -> Vec<AttributeRow> {
    let mut rows = vec![AttributeRow::new(
        "File Name",
        &Value::String(record.filename.clone()),
    )];

    let file_type = record
        .meta_str("Type")
        .or_else(|| record.meta_str("type"))
        .unwrap_or_default()
        .to_lowercase();

    for (key, label) in attribute_order(&file_type) {
        let Some(value) = record.metadata.get(*key).filter(|v| !v.is_null()) else {
            continue;
        };
        if *key == KEY_PHRASES.0 {
            if let Value::Array(items) = value {
                let joined = items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                rows.push(AttributeRow::new(label, &Value::String(joined)));
                continue;
            }
        }
        rows.push(AttributeRow::new(label, value));
    }
    rows
}
