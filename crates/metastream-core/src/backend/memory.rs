//! In-memory [`MetadataTable`] and [`ObjectStore`] for testing and WASM
//! targets.
//!
//! Both use `std::sync::RwLock`. The table keeps insertion order and uses a
//! numeric offset as its continuation token.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::models::RawRecord;

use super::{
    is_texty, MetadataTable, ObjectStore, ProgressCallback, ScanPage, TextObject, UploadProgress,
    PARTITION_KEY, SORT_KEY,
};

/// In-memory metadata table.
pub struct InMemoryTable {
    records: RwLock<Vec<RawRecord>>,
    scans: AtomicUsize,
}

impl InMemoryTable {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            scans: AtomicUsize::new(0),
        }
    }

    pub fn with_records(records: impl IntoIterator<Item = RawRecord>) -> Self {
        let table = Self::new();
        if let Ok(mut guard) = table.records.write() {
            guard.extend(records);
        }
        table
    }

    pub fn insert(&self, record: RawRecord) -> Result<()> {
        self.records
            .write()
            .map_err(|_| anyhow!("table lock poisoned"))?
            .push(record);
        Ok(())
    }

    /// Number of `scan_page` calls so far.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

fn attr_str<'a>(record: &'a RawRecord, name: &str) -> Option<&'a str> {
    record.get(name).and_then(Value::as_str)
}

#[async_trait]
impl MetadataTable for InMemoryTable {
    async fn scan_page(&self, page_size: usize, token: Option<&Value>) -> Result<ScanPage> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let start = match token {
            None => 0,
            Some(t) => t
                .as_u64()
                .ok_or_else(|| anyhow!("invalid continuation token: {}", t))?
                as usize,
        };
        let records = self.records.read().map_err(|_| anyhow!("table lock poisoned"))?;
        let end = (start + page_size.max(1)).min(records.len());
        let page = records.get(start..end).unwrap_or_default().to_vec();
        let next_token = (end < records.len()).then(|| Value::from(end as u64));
        Ok(ScanPage {
            records: page,
            next_token,
        })
    }

    async fn get_by_key(&self, primary: &str, sort: Option<&str>) -> Result<Option<RawRecord>> {
        let records = self.records.read().map_err(|_| anyhow!("table lock poisoned"))?;
        let found = records.iter().find(|r| {
            attr_str(r, PARTITION_KEY) == Some(primary)
                && sort.map_or(true, |s| attr_str(r, SORT_KEY) == Some(s))
        });
        Ok(found.cloned())
    }
}

struct StoredObject {
    body: Vec<u8>,
    content_type: String,
}

/// In-memory object store.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .read()
            .map(|o| o.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<String> {
        let total = body.len() as u64;
        if let Some(report) = progress {
            report(UploadProgress { loaded: 0, total });
        }
        self.objects
            .write()
            .map_err(|_| anyhow!("object store lock poisoned"))?
            .insert(
                key.to_string(),
                StoredObject {
                    body,
                    content_type: content_type.to_string(),
                },
            );
        if let Some(report) = progress {
            report(UploadProgress {
                loaded: total,
                total,
            });
        }
        Ok(key.to_string())
    }

    async fn get_object_text(&self, key: &str) -> Result<Option<TextObject>> {
        let objects = self
            .objects
            .read()
            .map_err(|_| anyhow!("object store lock poisoned"))?;
        let obj = objects
            .get(key)
            .ok_or_else(|| anyhow!("no such object: {}", key))?;
        if !is_texty(Some(&obj.content_type)) {
            return Ok(None);
        }
        Ok(Some(TextObject {
            text: String::from_utf8_lossy(&obj.body).into_owned(),
            content_type: Some(obj.content_type.clone()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn raw(v: Value) -> RawRecord {
        RawRecord::from_value(v).unwrap()
    }

    #[tokio::test]
    async fn scan_pages_until_exhausted() {
        let table = InMemoryTable::with_records((0..5).map(|i| raw(json!({"id": i.to_string()}))));
        let first = table.scan_page(2, None).await.unwrap();
        assert_eq!(first.records.len(), 2);
        let second = table.scan_page(2, first.next_token.as_ref()).await.unwrap();
        let third = table.scan_page(2, second.next_token.as_ref()).await.unwrap();
        assert_eq!(third.records.len(), 1);
        assert!(third.next_token.is_none());
        assert_eq!(table.scan_count(), 3);
        assert!(table.scan_page(2, Some(&json!("x"))).await.is_err());
    }

    #[tokio::test]
    async fn get_by_key_exact_and_partition_only() {
        let table = InMemoryTable::with_records([
            raw(json!({"FileName": "a.csv", "RecordID": "a.csv#v1"})),
            raw(json!({"FileName": "a.csv", "RecordID": "a.csv#full"})),
        ]);
        let exact = table.get_by_key("a.csv", Some("a.csv#full")).await.unwrap().unwrap();
        assert_eq!(exact.get("RecordID"), Some(&json!("a.csv#full")));
        let first = table.get_by_key("a.csv", None).await.unwrap().unwrap();
        assert_eq!(first.get("RecordID"), Some(&json!("a.csv#v1")));
        assert!(table.get_by_key("b.csv", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn objects_round_trip_text_only() {
        let store = InMemoryObjectStore::new();
        let seen = Mutex::new(Vec::new());
        let cb = |p: UploadProgress| seen.lock().unwrap().push(p.percent());
        store
            .put_object("uploads/a.csv", b"x,y".to_vec(), "text/csv", Some(&cb))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 100]);

        let obj = store.get_object_text("uploads/a.csv").await.unwrap().unwrap();
        assert_eq!(obj.text, "x,y");

        store
            .put_object("uploads/b.xlsx", vec![0, 1], "application/octet-stream", None)
            .await
            .unwrap();
        assert!(store.get_object_text("uploads/b.xlsx").await.unwrap().is_none());
        assert!(store.get_object_text("missing").await.is_err());
    }
}
