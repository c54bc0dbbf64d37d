//! Bulk harvesting of scholarly article metadata.
//!
//! `harvester` queries a paginated article-metadata API by keyword and pushes every record it
//! finds through a concurrent pipeline:
//!
//! - Listing pages are fetched by a bounded pool of workers that rate-limit themselves
//! - Each record is normalized and enriched with keyword tags scraped from its landing page
//! - Open-access PDFs are downloaded, checked for a PDF signature and uploaded to object storage
//! - Normalized metadata is written to a key-value table under a run-unique sequence id
//! - Per-job failures from both pools are collected into a single [`report::HarvestReport`]
//!
//! # Getting Started
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use harvester::{
//!   config::{HarvestConfig, KeySchema, KeyType, TableConfig},
//!   harvest::Harvester,
//!   storage::{MemoryKeyValueStore, MemoryObjectStore},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let config = HarvestConfig::builder("cyber physical system")
//!     .open_access_only(true)
//!     .table(TableConfig::new("Articles", KeySchema::new("ID", KeyType::Number)))
//!     .build()?;
//!
//!   let harvester = Harvester::builder(config)
//!     .key_value_store(Arc::new(MemoryKeyValueStore::new()))
//!     .object_store(Arc::new(MemoryObjectStore::new()))
//!     .build()?;
//!
//!   let report = harvester.run().await?;
//!   println!("{report}");
//!   Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`query`]: Escaping of keyword expressions and listing-page URLs
//! - [`record`]: Records as returned by the metadata API
//! - [`metadata`]: Normalized metadata as persisted to the key-value store
//! - [`keywords`]: Keyword scraping from article landing pages
//! - [`artifact`]: Download, validation and upload of open-access PDFs
//! - [`storage`]: Key-value and object storage backends
//! - [`pool`]: The page fetch pool and the record enrichment pool
//! - [`report`]: Aggregation of per-job results
//! - [`harvest`]: The driver tying everything together

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{
  collections::BTreeMap,
  fmt::Display,
  path::{Path, PathBuf},
  str::FromStr,
  sync::Arc,
  time::Duration,
};

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
#[cfg(test)]
use {tempfile::tempdir, tracing_test::traced_test};

pub mod api;
pub mod artifact;
pub mod config;
pub mod counters;
pub mod error;
pub mod format;
pub mod harvest;
pub mod keywords;
pub mod metadata;
pub mod pool;
pub mod query;
pub mod record;
pub mod report;
pub mod storage;

use crate::{
  api::*, artifact::*, config::*, counters::*, error::*, format::*, keywords::*, metadata::*,
  pool::*, query::*, record::*, report::*, storage::*,
};

/// Common traits and types for ergonomic imports.
///
/// ```no_run
/// use harvester::prelude::*;
///
/// async fn table_exists(store: &dyn KeyValueStore, table: &str) -> Result<bool, HarvestError> {
///   Ok(store.list_tables().await?.iter().any(|name| name == table))
/// }
/// ```
pub mod prelude {
  pub use crate::{
    error::HarvestError,
    keywords::KeywordSource,
    storage::{KeyValueStore, ObjectStore},
  };
}

/// Races `future` against `token`, mapping cancellation to [`HarvestError::Cancelled`].
///
/// Every outbound call in the pipeline goes through this so that a hung remote cannot keep a
/// worker alive after the run has been cancelled.
pub(crate) async fn cancellable<T, F>(token: &CancellationToken, future: F) -> Result<T>
where F: std::future::Future<Output = Result<T>> {
  tokio::select! {
    biased;
    _ = token.cancelled() => Err(HarvestError::Cancelled),
    result = future => result,
  }
}
