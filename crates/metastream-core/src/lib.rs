//! # Metastream Core
//!
//! Shared, WASM-safe reconciliation logic for Metastream: key
//! normalization, schema-tolerant record mapping, dedupe/merge of scanned
//! pages, client-side filters, key-phrase resolution, the local visibility
//! store, display helpers, and the backend port traits.
//!
//! This crate contains no tokio, filesystem I/O, or network code. Native
//! adapters for the ports live in the `metastream` crate.

pub mod backend;
pub mod display;
pub mod error;
pub mod filter;
pub mod mapper;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod phrases;
pub mod visibility;

pub use error::MetastreamError;
pub use models::{CanonicalRecord, QueryFilters, RawRecord, SortOrder};
