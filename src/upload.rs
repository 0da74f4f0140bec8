//! File upload: validation, storage key, content type and the put itself.
//!
//! # Workflow
//!
//! 1. Validate the file name against the allowed extensions and the size
//!    against the configured cap.
//! 2. Build the key `<prefix><unix-millis>-<file name>`.
//! 3. Put the bytes to object storage, reporting progress.
//!
//! Waiting for the metadata record is the poller's job; see
//! [`crate::poller`].

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use metastream_core::backend::{ObjectStore, UploadProgress};
use metastream_core::MetastreamError;

use crate::clients;
use crate::config::{Config, UploadConfig};
use crate::poller::{PollConfig, PollOutcome, UploadTarget, UploadWatcher};
use crate::progress::{ProgressMode, ProgressNotifier, UploadEvent, UploadProgressReporter};

/// A file ready to be put.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn read(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("Not a file path: {}", path.display()))?;
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        Ok(Self { name, bytes })
    }
}

/// What a completed put returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub key: String,
    pub file_name: String,
    pub size: u64,
    pub content_type: String,
}

/// Case-insensitive `*.<ext>` matcher for the allowed extensions.
fn extension_set(extensions: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for ext in extensions {
        let ext = ext.trim().trim_start_matches('.');
        builder.add(
            GlobBuilder::new(&format!("*.{}", ext))
                .case_insensitive(true)
                .literal_separator(true)
                .build()?,
        );
    }
    Ok(builder.build()?)
}

fn allowed_list(extensions: &[String]) -> String {
    extensions
        .iter()
        .map(|e| format!(".{}", e.trim().trim_start_matches('.')))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check a file against the upload rules.
///
/// Fails with [`MetastreamError::InvalidFile`] when the extension is not
/// allowed or the file is larger than the cap.
pub fn validate_file(name: &str, size: u64, config: &UploadConfig) -> Result<()> {
    let allowed = extension_set(&config.allowed_extensions)?;
    if !allowed.is_match(name) {
        return Err(MetastreamError::InvalidFile(format!(
            "File type not supported. Allowed types: {}",
            allowed_list(&config.allowed_extensions)
        ))
        .into());
    }
    if size > config.max_file_size_bytes() {
        return Err(MetastreamError::InvalidFile(format!(
            "File size must be less than {}MB",
            config.max_file_size_mb
        ))
        .into());
    }
    Ok(())
}

/// Storage key for an upload made at `unix_millis`.
pub fn upload_key(prefix: &str, file_name: &str, unix_millis: i64) -> String {
    format!("{}{}-{}", prefix, unix_millis, file_name)
}

/// MIME type from the file extension.
pub fn detect_content_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "txt" => "text/plain",
        "json" => "application/json",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// Validate and put `file`.
pub async fn upload_file(
    store: &dyn ObjectStore,
    file: UploadFile,
    config: &UploadConfig,
    reporter: &dyn UploadProgressReporter,
) -> Result<UploadReceipt> {
    let size = file.bytes.len() as u64;
    validate_file(&file.name, size, config)?;

    let key = upload_key(
        &config.prefix,
        &file.name,
        chrono::Utc::now().timestamp_millis(),
    );
    let content_type = detect_content_type(&file.name);

    let file_name = file.name;
    let on_progress = |p: UploadProgress| {
        reporter.report(UploadEvent::Sending {
            file: file_name.clone(),
            loaded: p.loaded,
            total: p.total,
        })
    };
    let key = store
        .put_object(&key, file.bytes, content_type, Some(&on_progress))
        .await
        .with_context(|| format!("Upload failed for {}", file_name))?;

    tracing::info!("uploaded {} as {}", file_name, key);
    Ok(UploadReceipt {
        key,
        file_name: file_name.clone(),
        size,
        content_type: content_type.to_string(),
    })
}

// ============ CLI ============

/// `ms upload`: put the file, then (unless `wait` is off) poll until its
/// metadata record appears. Ctrl-C stops the wait, not the upload.
pub async fn run_upload(config: &Config, path: &Path, wait: bool, mode: ProgressMode) -> Result<()> {
    let file = UploadFile::read(path)?;
    let reporter: Arc<dyn UploadProgressReporter> = Arc::from(mode.reporter());
    let store = clients::object_store(config);

    let receipt = upload_file(store.as_ref(), file, &config.upload, reporter.as_ref()).await?;
    println!(
        "Uploaded {} ({} bytes) as {}",
        receipt.file_name, receipt.size, receipt.key
    );

    if !wait {
        println!("Processing. It will appear in `ms list` shortly.");
        return Ok(());
    }

    let watcher = UploadWatcher::new(
        clients::metadata_table(config),
        Arc::new(ProgressNotifier::new(&receipt.file_name, reporter)),
        PollConfig::from(&config.poll),
    );
    let handle = watcher.watch(UploadTarget::new(&receipt.key, &receipt.file_name));

    let outcome = tokio::select! {
        joined = handle => joined.context("Poll task failed")?,
        _ = tokio::signal::ctrl_c() => {
            watcher.shutdown();
            PollOutcome::Cancelled
        }
    };

    match outcome {
        PollOutcome::Found(record) => {
            println!("Processing complete: {} is indexed as {}", receipt.file_name, record.id);
        }
        PollOutcome::TimedOut { attempts } => {
            println!(
                "No metadata yet after {} attempts. It may still appear in `ms list` later.",
                attempts
            );
        }
        PollOutcome::Cancelled => {
            println!("Stopped waiting. The upload itself succeeded.");
        }
    }
    Ok(())
}
