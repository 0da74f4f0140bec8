//! Paginated dashboard over the metadata table.
//!
//! Holds the merged collection for one browsing session. Each page is
//! scanned, mapped, narrowed by the query filters and folded into the
//! collection with [`merge_in`], so revisions of the same upload collapse
//! to one entry. Hidden records stay in the collection and are removed
//! only from the view, unless `show_hidden` is set.
//!
//! Fetches are sequential: `&mut self` allows one page in flight.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use metastream_core::backend::MetadataTable;
use metastream_core::filter::apply_filters;
use metastream_core::mapper::map_record;
use metastream_core::merge::{merge_in, parse_upload_time, sort_records};
use metastream_core::normalize::normalize;
use metastream_core::phrases::local_phrases;
use metastream_core::visibility::{filter_visible, StoragePort, VisibilityKey, VisibilityStore};
use metastream_core::{CanonicalRecord, MetastreamError, QueryFilters, SortOrder};
use serde_json::{json, Value};

use crate::clients;
use crate::config::Config;

#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub page_size: usize,
    pub sort: SortOrder,
    pub filters: QueryFilters,
    pub show_hidden: bool,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            sort: SortOrder::default(),
            filters: QueryFilters::default(),
            show_hidden: false,
        }
    }
}

pub struct Dashboard<S> {
    table: Arc<dyn MetadataTable>,
    visibility: VisibilityStore<S>,
    options: DashboardOptions,
    records: Vec<CanonicalRecord>,
    next_token: Option<Value>,
    pages_loaded: usize,
}

impl<S: StoragePort> Dashboard<S> {
    pub fn new(
        table: Arc<dyn MetadataTable>,
        visibility: VisibilityStore<S>,
        options: DashboardOptions,
    ) -> Self {
        Self {
            table,
            visibility,
            options,
            records: Vec::new(),
            next_token: None,
            pages_loaded: 0,
        }
    }

    pub fn options(&self) -> &DashboardOptions {
        &self.options
    }

    pub fn visibility(&self) -> &VisibilityStore<S> {
        &self.visibility
    }

    /// Start over from the first page.
    pub async fn load(&mut self) -> Result<()> {
        self.reset();
        self.fetch_page().await
    }

    /// Fetch the next page. Returns `false` when there was nothing left.
    pub async fn load_more(&mut self) -> Result<bool> {
        if !self.has_more() {
            return Ok(false);
        }
        self.fetch_page().await?;
        Ok(true)
    }

    /// Keep fetching until the scan is exhausted or `max_pages` pages are
    /// loaded in total.
    pub async fn load_all(&mut self, max_pages: usize) -> Result<()> {
        if self.pages_loaded == 0 {
            self.load().await?;
        }
        while self.pages_loaded < max_pages && self.load_more().await? {}
        Ok(())
    }

    /// Forget the collection and the continuation token.
    pub fn reset(&mut self) {
        self.records.clear();
        self.next_token = None;
        self.pages_loaded = 0;
    }

    /// Whether another page can be fetched.
    pub fn has_more(&self) -> bool {
        self.pages_loaded == 0 || self.next_token.is_some()
    }

    pub fn pages_loaded(&self) -> usize {
        self.pages_loaded
    }

    /// Change the sort order, re-sorting what is loaded.
    pub fn set_sort(&mut self, sort: SortOrder) {
        self.options.sort = sort;
        sort_records(&mut self.records, sort);
    }

    /// Every merged record, hidden ones included.
    pub fn all_records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    /// The records to show.
    pub fn visible_records(&self) -> Vec<CanonicalRecord> {
        filter_visible(
            self.records.clone(),
            &self.visibility,
            self.options.show_hidden,
        )
    }

    pub fn hide(&self, record: &CanonicalRecord) -> Result<()> {
        self.visibility.hide(&VisibilityKey::for_record(record))
    }

    pub fn unhide(&self, record: &CanonicalRecord) -> Result<()> {
        self.visibility.unhide(&VisibilityKey::for_record(record))
    }

    /// Clear every piece of client-side state, then reload.
    pub async fn hard_refresh(&mut self) -> Result<()> {
        self.visibility
            .clear_all()
            .context("Failed to clear hidden records")?;
        self.load().await
    }

    /// Hard delete is disabled: always [`MetastreamError::OperationDisabled`].
    /// Nothing is sent to the backend.
    pub fn delete_record(&self, _record: &CanonicalRecord) -> Result<()> {
        Err(MetastreamError::OperationDisabled("delete").into())
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let page = self
            .table
            .scan_page(self.options.page_size, self.next_token.as_ref())
            .await
            .context("Failed to load metadata records")?;

        let mapped: Vec<CanonicalRecord> = page
            .records
            .iter()
            .map(map_record)
            .filter(CanonicalRecord::is_resolvable)
            .collect();
        let incoming = apply_filters(mapped, &self.options.filters);

        tracing::debug!(
            "page {}: {} scanned, {} kept",
            self.pages_loaded + 1,
            page.records.len(),
            incoming.len()
        );

        self.records = merge_in(&self.records, &incoming, self.options.sort);
        self.next_token = page.next_token;
        self.pages_loaded += 1;
        Ok(())
    }
}

// ============ CLI ============

/// Flags of `ms list`.
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub filters: QueryFilters,
    pub sort: Option<SortOrder>,
    pub all_pages: bool,
    pub show_hidden: bool,
    pub json: bool,
}

/// `ms list`: load the first page (or every page) and print it.
pub async fn run_list(config: &Config, args: ListArgs) -> Result<()> {
    let sort = match args.sort {
        Some(sort) => sort,
        None => config.dashboard.sort_order()?,
    };
    let mut dashboard = Dashboard::new(
        clients::metadata_table(config),
        clients::visibility_store(config),
        DashboardOptions {
            page_size: config.dashboard.page_size,
            sort,
            filters: args.filters,
            show_hidden: args.show_hidden,
        },
    );

    if args.all_pages {
        dashboard.load_all(usize::MAX).await?;
    } else {
        dashboard.load().await?;
    }
    let records = dashboard.visible_records();

    if args.json {
        let rows: Vec<Value> = records
            .iter()
            .map(|r| {
                json!({
                    "record": r,
                    "keyPhrases": local_phrases(r),
                    "hidden": dashboard.visibility().is_hidden(&VisibilityKey::for_record(r)),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records.");
    }
    for (i, record) in records.iter().enumerate() {
        let uploaded = parse_upload_time(&record.upload_time)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let hidden = args.show_hidden
            && dashboard
                .visibility()
                .is_hidden(&VisibilityKey::for_record(record));

        println!(
            "{}. {}{}",
            i + 1,
            record.filename,
            if hidden { " (hidden)" } else { "" }
        );
        println!("    uploaded: {}", uploaded);
        let phrases = local_phrases(record);
        if !phrases.is_empty() {
            println!("    phrases: {}", phrases.join(", "));
        }
        println!("    id: {}", record.id);
        println!();
    }
    if dashboard.has_more() {
        println!("More records available: rerun with --all-pages.");
    }
    Ok(())
}

/// `ms delete`: needs `--yes`, and even then hard delete is disabled.
pub fn run_delete(config: &Config, id: &str, yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to delete {} without --yes", id);
    }
    let dashboard = Dashboard::new(
        clients::metadata_table(config),
        clients::visibility_store(config),
        DashboardOptions::default(),
    );
    let record = CanonicalRecord {
        id: id.to_string(),
        filename: normalize(Some(id)),
        ..Default::default()
    };
    dashboard.delete_record(&record)
}
