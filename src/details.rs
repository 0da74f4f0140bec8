//! Record details: lookup by id, content preview and key phrases.
//!
//! # Lookup
//!
//! The id is normalized into a file name, then:
//!
//! 1. `get_by_key(name, "<name>#full")`, the full extraction row.
//! 2. If that finds nothing (or fails), `get_by_key(name, None)`, the first
//!    row under that file name.
//!
//! Rows are mapped with [`map_detail_record`], so every attribute the
//! extraction job wrote is available as metadata.
//!
//! # Content
//!
//! Previewable objects (no `mimeType`, or one mentioning text, json, csv or
//! xml) are fetched as text. A failed fetch is logged and treated as "no
//! content"; it never fails the lookup.

use std::sync::Arc;

use anyhow::{Context, Result};
use metastream_core::backend::{MetadataTable, ObjectStore};
use metastream_core::display::{
    attribute_rows, filter_metadata_for_display, record_size, AttributeRow,
};
use metastream_core::mapper::map_detail_record;
use metastream_core::normalize::normalize;
use metastream_core::phrases::{resolve_phrases, KeyPhraseDetector, PhraseOptions};
use metastream_core::{CanonicalRecord, MetastreamError};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::clients;
use crate::config::Config;

/// Sort-key suffix of the full extraction row.
const FULL_RECORD_SUFFIX: &str = "#full";

/// Everything the details view shows for one record.
#[derive(Debug, Clone, Serialize)]
pub struct RecordDetails {
    pub record: CanonicalRecord,
    pub size: String,
    pub key_phrases: Vec<String>,
    pub attributes: Vec<AttributeRow>,
    /// Metadata minus technical keys.
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

pub struct RecordDetailsLoader {
    table: Arc<dyn MetadataTable>,
    store: Arc<dyn ObjectStore>,
    detector: Arc<dyn KeyPhraseDetector>,
    options: PhraseOptions,
}

impl RecordDetailsLoader {
    pub fn new(
        table: Arc<dyn MetadataTable>,
        store: Arc<dyn ObjectStore>,
        detector: Arc<dyn KeyPhraseDetector>,
        options: PhraseOptions,
    ) -> Self {
        Self {
            table,
            store,
            detector,
            options,
        }
    }

    /// Find the record behind `id`. `Ok(None)` when nothing matches.
    pub async fn fetch_record(&self, id: &str) -> Result<Option<CanonicalRecord>> {
        let file_name = normalize(Some(id));
        if file_name.is_empty() {
            return Ok(None);
        }

        let full_id = format!("{}{}", file_name, FULL_RECORD_SUFFIX);
        match self.table.get_by_key(&file_name, Some(&full_id)).await {
            Ok(Some(raw)) => return Ok(Some(map_detail_record(&raw))),
            Ok(None) => {
                tracing::debug!("no {} row, querying by file name", full_id);
            }
            Err(e) => {
                tracing::warn!("get for {} failed, querying by file name: {:#}", full_id, e);
            }
        }

        let raw = self
            .table
            .get_by_key(&file_name, None)
            .await
            .with_context(|| format!("Failed to look up record {}", file_name))?;
        Ok(raw.as_ref().map(map_detail_record))
    }

    /// Fetch the record's object as text, if it can be previewed.
    pub async fn fetch_content(&self, record: &CanonicalRecord) -> Option<String> {
        let key = record
            .metadata_key()
            .unwrap_or_else(|| record.id.trim())
            .to_string();
        if key.is_empty() || !can_preview(record.meta_str("mimeType")) {
            return None;
        }

        match self.store.get_object_text(&key).await {
            Ok(object) => object.map(|o| o.text),
            Err(e) => {
                tracing::warn!("content fetch for {} failed: {:#}", key, e);
                None
            }
        }
    }

    /// Look up `id` and assemble its details. With `include_content` off,
    /// no object is fetched and phrases come from metadata only.
    pub async fn load(&self, id: &str, include_content: bool) -> Result<Option<RecordDetails>> {
        let Some(record) = self.fetch_record(id).await? else {
            return Ok(None);
        };

        let content = if include_content {
            self.fetch_content(&record).await
        } else {
            None
        };
        let key_phrases = resolve_phrases(
            &record,
            content.as_deref(),
            self.detector.as_ref(),
            &self.options,
        )
        .await;

        Ok(Some(RecordDetails {
            size: record_size(&record),
            attributes: attribute_rows(&record),
            metadata: filter_metadata_for_display(&record.metadata),
            key_phrases,
            content,
            record,
        }))
    }
}

// ============ CLI ============

/// Longest content excerpt `ms show` prints.
const PREVIEW_CHARS: usize = 2000;

/// `ms show`: print one record with its phrases and attribute rows.
pub async fn run_show(config: &Config, id: &str, include_content: bool, json: bool) -> Result<()> {
    let loader = RecordDetailsLoader::new(
        clients::metadata_table(config),
        clients::object_store(config),
        clients::key_phrase_detector(config),
        clients::phrase_options(config),
    );
    let Some(details) = loader.load(id, include_content).await? else {
        return Err(MetastreamError::NotFound(id.to_string()).into());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }

    println!("--- Record ---");
    println!("id:        {}", details.record.id);
    println!("file:      {}", details.record.filename);
    if !details.record.user_id.is_empty() {
        println!("user:      {}", details.record.user_id);
    }
    println!("size:      {}", details.size);
    if details.key_phrases.is_empty() {
        println!("phrases:   (none)");
    } else {
        println!("phrases:   {}", details.key_phrases.join(", "));
    }
    println!();

    println!("--- Attributes ---");
    for row in &details.attributes {
        println!("{:<16} {:<8} {}", row.label, row.type_tag, row.value);
    }
    println!();

    if let Some(content) = &details.content {
        let excerpt: String = content.chars().take(PREVIEW_CHARS).collect();
        println!("--- Content ---");
        println!("{}", excerpt);
        if excerpt.len() < content.len() {
            println!("[truncated]");
        }
    }
    Ok(())
}

fn can_preview(mime: Option<&str>) -> bool {
    let mime = mime.unwrap_or_default().to_ascii_lowercase();
    mime.is_empty() || ["text", "json", "csv", "xml"].iter().any(|t| mime.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use metastream_core::backend::memory::{InMemoryObjectStore, InMemoryTable};
    use metastream_core::RawRecord;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedDetector {
        phrases: Vec<String>,
        calls: AtomicUsize,
    }

    impl FixedDetector {
        fn new(phrases: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                phrases: phrases.iter().map(|s| s.to_string()).collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl KeyPhraseDetector for FixedDetector {
        async fn detect_key_phrases(&self, _text: &str, _lang: &str) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.phrases.clone())
        }
    }

    fn raw(v: Value) -> RawRecord {
        RawRecord::from_value(v).unwrap()
    }

    async fn fixture(detector: Arc<FixedDetector>) -> RecordDetailsLoader {
        let table = InMemoryTable::with_records([
            raw(json!({"FileName": "foods.csv", "RecordID": "foods.csv#part1", "RowCount": 1})),
            raw(json!({
                "FileName": "foods.csv", "RecordID": "foods.csv#full", "UserId": "u1",
                "Type": "CSV", "RowCount": 2, "ColCount": 2,
                "s3Key": "uploads/1-foods.csv", "mimeType": "text/csv", "sizeBytes": 2048
            })),
            raw(json!({"FileName": "legacy.csv", "RecordID": "legacy.csv#v1", "RowCount": 7})),
            raw(json!({
                "FileName": "book.xlsx", "RecordID": "book.xlsx#full", "s3Key": "uploads/2-book.xlsx",
                "mimeType": "application/octet-stream",
                "columns": ["region", "sales"]
            })),
            raw(json!({"FileName": "gone.txt", "RecordID": "gone.txt#full", "s3Key": "uploads/3-gone.txt"})),
        ]);
        let store = InMemoryObjectStore::new();
        store
            .put_object(
                "uploads/1-foods.csv",
                b"name,kcal\napple,52\n".to_vec(),
                "text/csv",
                None,
            )
            .await
            .unwrap();

        RecordDetailsLoader::new(
            Arc::new(table),
            Arc::new(store),
            detector,
            PhraseOptions::default(),
        )
    }

    #[tokio::test]
    async fn full_row_wins_and_is_enriched() {
        let detector = FixedDetector::new(&["apple", "Apple", "kcal"]);
        let loader = fixture(detector.clone()).await;

        let details = loader.load("foods.csv", true).await.unwrap().unwrap();
        assert_eq!(details.record.id, "foods.csv#full");
        assert_eq!(details.record.user_id, "u1");
        assert_eq!(details.content.as_deref(), Some("name,kcal\napple,52\n"));
        assert_eq!(details.key_phrases, vec!["apple", "kcal"]);
        assert_eq!(details.size, "2.00 KB");
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);

        let labels: Vec<_> = details.attributes.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["File Name", "Column Count", "Row Count"]);
        assert!(!details.metadata.contains_key("s3Key"));
        assert!(!details.metadata.contains_key("mimeType"));
        assert!(details.metadata.contains_key("RowCount"));
    }

    #[tokio::test]
    async fn encoded_id_with_suffix_resolves() {
        let loader = fixture(FixedDetector::new(&[])).await;
        let record = loader.fetch_record("foods%2Ecsv%23full").await.unwrap().unwrap();
        assert_eq!(record.id, "foods.csv#full");
    }

    #[tokio::test]
    async fn falls_back_to_first_row_for_file_name() {
        let loader = fixture(FixedDetector::new(&[])).await;
        let record = loader.fetch_record("legacy.csv").await.unwrap().unwrap();
        assert_eq!(record.id, "legacy.csv#v1");
        assert_eq!(record.metadata["RowCount"], json!(7));
        assert_eq!(record.upload_time, "");
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let loader = fixture(FixedDetector::new(&[])).await;
        assert!(loader.load("nope.csv", true).await.unwrap().is_none());
        assert!(loader.load("  ", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn binary_content_is_not_fetched() {
        let detector = FixedDetector::new(&["ignored"]);
        let loader = fixture(detector.clone()).await;
        let details = loader.load("book.xlsx", true).await.unwrap().unwrap();
        assert!(details.content.is_none());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
        assert_eq!(details.key_phrases, vec!["region", "sales"]);
    }

    #[tokio::test]
    async fn failed_content_fetch_is_not_fatal() {
        let loader = fixture(FixedDetector::new(&["x"])).await;
        let details = loader.load("gone.txt", true).await.unwrap().unwrap();
        assert!(details.content.is_none());
        assert_eq!(details.size, "Unknown");
    }

    #[tokio::test]
    async fn no_content_skips_the_detector() {
        let detector = FixedDetector::new(&["apple"]);
        let loader = fixture(detector.clone()).await;
        let details = loader.load("foods.csv", false).await.unwrap().unwrap();
        assert!(details.content.is_none());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn preview_rule() {
        assert!(can_preview(None));
        assert!(can_preview(Some("")));
        assert!(can_preview(Some("Application/JSON")));
        assert!(can_preview(Some("application/xml")));
        assert!(!can_preview(Some("image/png")));
    }
}
