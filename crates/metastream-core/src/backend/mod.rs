//! Ports for the remote collaborators: the metadata table and the object
//! store.
//!
//! Both traits are async (via `async-trait`) so native adapters can do
//! network I/O while the in-memory implementations in [`memory`] return
//! ready futures. Neither port has a write path for records: the table is
//! filled by an external pipeline and hard delete is disabled.
//!
//! # Table key schema
//!
//! | Attribute | Role |
//! |-----------|------|
//! | [`PARTITION_KEY`] | partition key, the uploaded file name |
//! | [`SORT_KEY`] | sort key, e.g. `<fileName>#full` |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::RawRecord;

/// Partition key attribute of the metadata table.
pub const PARTITION_KEY: &str = "FileName";
/// Sort key attribute of the metadata table.
pub const SORT_KEY: &str = "RecordID";

/// One page of a table scan.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub records: Vec<RawRecord>,
    /// Opaque continuation token; `None` when the scan is exhausted.
    pub next_token: Option<Value>,
}

/// Read access to the metadata table.
#[async_trait]
pub trait MetadataTable: Send + Sync {
    /// Scan at most `page_size` records, continuing from `token`.
    async fn scan_page(&self, page_size: usize, token: Option<&Value>) -> Result<ScanPage>;

    /// Fetch one record by key.
    ///
    /// With a sort key this is an exact lookup; without one, the first
    /// record in the partition is returned.
    async fn get_by_key(&self, primary: &str, sort: Option<&str>) -> Result<Option<RawRecord>>;
}

/// Bytes sent so far out of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: u64,
}

impl UploadProgress {
    /// Whole percent, 100 for an empty body.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.loaded.min(self.total) * 100) / self.total) as u8
    }
}

/// Callback receiving upload progress.
pub type ProgressCallback<'a> = &'a (dyn Fn(UploadProgress) + Send + Sync);

/// A text object read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextObject {
    pub text: String,
    pub content_type: Option<String>,
}

/// Object storage for uploaded files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` and return the key written.
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<String>;

    /// Read an object as text. `Ok(None)` when the content type is not
    /// text-like.
    async fn get_object_text(&self, key: &str) -> Result<Option<TextObject>>;
}

/// Whether a content type can be previewed as text. A missing type counts.
pub fn is_texty(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return true;
    };
    let ct = ct.to_ascii_lowercase();
    ct.contains("text/")
        || ct.contains("application/json")
        || ct.contains("application/csv")
        || ct.contains("application/xml")
}
