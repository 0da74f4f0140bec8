//! Raw backend rows → [`CanonicalRecord`].
//!
//! Each canonical field is resolved through an ordered alias list: the
//! first alias present with a non-null value wins. Mapping never fails;
//! anything missing becomes an empty string or an empty metadata map.
//!
//! # Alias table
//!
//! | Field | Aliases (in order) |
//! |-------|--------------------|
//! | `id` | `id`, `Id`, `RecordID` |
//! | `filename` | `filename`, `FileName`, `fileName` |
//! | `upload_time` | `uploadTime`, `UploadTime` |
//! | `metadata` | `metadata`, `Metadata` |
//! | `user_id` | `userId`, `UserId` |

use serde_json::{Map, Number, Value};

use crate::models::{CanonicalRecord, RawRecord};

/// Canonical fields resolved through the alias table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Filename,
    UploadTime,
    Metadata,
    UserId,
}

/// Alias lookup table for the dashboard (scan) mapping.
pub const FIELD_ALIASES: &[(Field, &[&str])] = &[
    (Field::Id, &["id", "Id", "RecordID"]),
    (Field::Filename, &["filename", "FileName", "fileName"]),
    (Field::UploadTime, &["uploadTime", "UploadTime"]),
    (Field::Metadata, &["metadata", "Metadata"]),
    (Field::UserId, &["userId", "UserId"]),
];

/// Top-level list attribute holding backend-computed key phrases.
const KEY_PHRASES_ATTR: &str = "KeyPhrases";

/// Key-table attributes that stay out of the detail view's metadata.
const DETAIL_KEY_ATTRS: &[&str] = &["FileName", "RecordID", "UserId"];

/// Aliases for a canonical field.
pub fn aliases(field: Field) -> &'static [&'static str] {
    FIELD_ALIASES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, a)| *a)
        .unwrap_or(&[])
}

/// First alias present on `raw` with a non-null value.
pub fn resolve<'a>(raw: &'a RawRecord, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|name| raw.get(name))
}

fn resolve_string(raw: &RawRecord, aliases: &[&str]) -> String {
    resolve(raw, aliases).map(scalar_to_string).unwrap_or_default()
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Map a scanned row into a [`CanonicalRecord`].
///
/// A `metadata` string is parsed as JSON (parse failure or a non-object
/// gives `{}`); a top-level `KeyPhrases` list replaces
/// `metadata.keyPhrases`.
pub fn map_record(raw: &RawRecord) -> CanonicalRecord {
    let mut metadata = resolve(raw, aliases(Field::Metadata))
        .map(metadata_object)
        .unwrap_or_default();
    merge_key_phrases(raw, &mut metadata);

    CanonicalRecord {
        id: resolve_string(raw, aliases(Field::Id)),
        filename: resolve_string(raw, aliases(Field::Filename)),
        upload_time: resolve_string(raw, aliases(Field::UploadTime)),
        metadata,
        user_id: resolve_string(raw, aliases(Field::UserId)),
    }
}

/// Map a row fetched by key for the record-detail view.
///
/// Every attribute other than the table keys becomes metadata, so the
/// detail page can show whatever the extraction job wrote. An embedded
/// `metadata` blob is flattened in underneath the top-level attributes.
/// `upload_time` stays empty: the detail view does not show it.
pub fn map_detail_record(raw: &RawRecord) -> CanonicalRecord {
    let mut metadata = Map::new();

    if let Some(blob) = resolve(raw, aliases(Field::Metadata)) {
        metadata.extend(metadata_object(blob));
    }

    let blob_attrs = aliases(Field::Metadata);
    for (key, value) in raw.fields() {
        if DETAIL_KEY_ATTRS.contains(&key.as_str()) || blob_attrs.contains(&key.as_str()) {
            continue;
        }
        metadata.insert(key.clone(), value.clone());
    }
    merge_key_phrases(raw, &mut metadata);

    CanonicalRecord {
        id: resolve_string(raw, &["RecordID", "FileName"]),
        filename: resolve_string(raw, &["FileName"]),
        upload_time: String::new(),
        metadata,
        user_id: resolve_string(raw, &["UserId"]),
    }
}

fn metadata_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        Value::String(s) if s.trim().is_empty() => Map::new(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                tracing::warn!("metadata blob is not a JSON object; using empty metadata");
                Map::new()
            }
            Err(e) => {
                tracing::warn!("malformed metadata JSON ({}); using empty metadata", e);
                Map::new()
            }
        },
        _ => Map::new(),
    }
}

fn merge_key_phrases(raw: &RawRecord, metadata: &mut Map<String, Value>) {
    let Some(Value::Array(items)) = raw.get(KEY_PHRASES_ATTR) else {
        return;
    };
    let phrases: Vec<Value> = items
        .iter()
        .filter_map(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| Value::String(s.to_string()))
        .collect();
    if !phrases.is_empty() {
        metadata.insert("keyPhrases".to_string(), Value::Array(phrases));
    }
}

// ============ Attribute-typed rows ============

impl RawRecord {
    /// Build from a DynamoDB attribute-typed item (`{"S": ..}`, `{"N": ..}`,
    /// `{"L": ..}`, `{"M": ..}`, `{"BOOL": ..}`, `{"NULL": true}`).
    ///
    /// Lists and maps are unwrapped one level: their scalar members are
    /// unwrapped, nested lists and maps are kept in typed form.
    pub fn from_typed(item: &Map<String, Value>) -> Self {
        let fields = item
            .iter()
            .map(|(k, v)| (k.clone(), unwrap_attribute(v, true)))
            .collect();
        Self(fields)
    }
}

/// Unwrap one attribute value. `descend` controls whether `L`/`M`
/// containers are opened; their members are unwrapped with `descend =
/// false`.
fn unwrap_attribute(value: &Value, descend: bool) -> Value {
    let Value::Object(obj) = value else {
        return value.clone();
    };
    if obj.len() != 1 {
        return value.clone();
    }
    let Some((tag, inner)) = obj.iter().next() else {
        return value.clone();
    };

    match (tag.as_str(), inner) {
        ("S", Value::String(s)) => Value::String(s.clone()),
        ("N", Value::String(n)) => parse_number(n),
        ("BOOL", Value::Bool(b)) => Value::Bool(*b),
        ("NULL", _) => Value::Null,
        ("SS", Value::Array(items)) => Value::Array(items.clone()),
        ("NS", Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|n| n.as_str().map(parse_number).unwrap_or_else(|| n.clone()))
                .collect(),
        ),
        ("L", Value::Array(items)) if descend => Value::Array(
            items.iter().map(|v| unwrap_attribute(v, false)).collect(),
        ),
        ("M", Value::Object(map)) if descend => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), unwrap_attribute(v, false)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn parse_number(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::Number(i.into());
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(n.to_string()))
}
