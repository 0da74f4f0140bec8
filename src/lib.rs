//! # Metastream
//!
//! Upload datasets to object storage and browse the metadata records an
//! external extraction pipeline writes for them.
//!
//! Metastream is the client side of that pipeline. It puts files into S3,
//! waits for the asynchronous DynamoDB write with a bounded, cancellable
//! poll, and reconciles the records the table returns, which vary in shape
//! across schema revisions, into one deduplicated, sortable collection.
//! Key phrases are resolved per record, optionally enriched by Amazon
//! Comprehend, and records can be hidden locally.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  put   ┌──────┐  extraction job  ┌──────────┐
//! │ ms upload│───────▶│  S3  │─────────────────▶│ DynamoDB │
//! └────┬─────┘        └──┬───┘                  └────┬─────┘
//!      │ poll            │ get (preview)             │ scan / get
//!      ▼                 ▼                           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │ metastream-core: map → merge → filter → phrases → hide   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The pure logic lives in the `metastream-core` crate; this crate adds
//! the AWS adapters, configuration, local persistence and the `ms` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`credentials`] | AWS credential resolution |
//! | [`sigv4`] | AWS Signature V4 request signing |
//! | [`aws`] | Signed HTTP client shared by the adapters |
//! | [`s3`] | S3 object store |
//! | [`dynamo`] | DynamoDB metadata table |
//! | [`comprehend`] | Comprehend key-phrase detector |
//! | [`clients`] | Backends built from config |
//! | [`local_storage`] | File-backed storage for the hidden set |
//! | [`upload`] | Validation and upload |
//! | [`progress`] | Upload progress reporting |
//! | [`poller`] | Wait for an upload's metadata record |
//! | [`dashboard`] | Paginated, merged record listing |
//! | [`details`] | Single-record view |
//! | [`hidden`] | Visibility commands |

pub mod aws;
pub mod clients;
pub mod comprehend;
pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod details;
pub mod dynamo;
pub mod hidden;
pub mod local_storage;
pub mod poller;
pub mod progress;
pub mod s3;
pub mod sigv4;
pub mod upload;
