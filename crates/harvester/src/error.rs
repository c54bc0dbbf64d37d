//! Error types for the harvester library.
//!
//! Errors fall into two groups. Startup errors (bad configuration, missing credentials, a table
//! that never becomes active) abort the whole run and are returned straight from
//! [`Harvester::run`](crate::harvest::Harvester::run). Everything else is a per-job error: it is
//! reported through the result stream of the pool that produced it and never stops sibling jobs.
//!
//! # Examples
//!
//! ```
//! use harvester::error::HarvestError;
//!
//! let err = HarvestError::NotAnArtifact { url: "https://example.org/a.pdf".into() };
//! assert_eq!(err.to_string(), "Not a PDF - https://example.org/a.pdf");
//! ```

use thiserror::Error;

/// Error type alias used for the [`harvester`](crate) crate.
pub type Result<T> = core::result::Result<T, HarvestError>;

/// Errors that can occur while harvesting.
#[derive(Error, Debug)]
pub enum HarvestError {
  /// An HTTP request failed at the transport level.
  ///
  /// This covers connection failures, TLS errors, request timeouts and body read errors for
  /// listing pages, article landing pages and artifact downloads alike.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// A remote endpoint answered with a non-success status.
  ///
  /// The string carries the URL and the status for the report.
  #[error("API error: {0}")]
  Api(String),

  /// A listing page could not be decoded into the paginated envelope.
  #[error("Failed to parse listing page: {0}")]
  Parse(String),

  /// A downloaded artifact did not start with the PDF signature.
  #[error("Not a PDF - {url}")]
  NotAnArtifact {
    /// Where the offending bytes were downloaded from.
    url: String,
  },

  /// The key-value store rejected an operation.
  #[error("Key-value store error: {0}")]
  KeyValueStore(String),

  /// The object store rejected an operation.
  #[error("Object store error: {0}")]
  ObjectStore(String),

  /// A local file system operation failed.
  ///
  /// In the pipeline this happens while writing, rewinding or removing the temporary artifact
  /// file.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// The configuration is invalid.
  #[error("{0}")]
  Config(String),

  /// No usable credentials were found for the storage backends.
  #[error("Credentials error: {0}")]
  Credentials(String),

  /// A bounded wait on a storage backend ran out of time.
  ///
  /// Fatal when it happens while preparing the table or bucket, per-job when it happens while
  /// waiting for an uploaded object to become visible.
  #[error("Timed out waiting for {0}")]
  Timeout(String),

  /// The run was cancelled while this job was in flight.
  #[error("Cancelled")]
  Cancelled,

  /// A pool worker panicked or was aborted.
  #[error(transparent)]
  Join(#[from] tokio::task::JoinError),

  /// A configuration file could not be decoded.
  #[error(transparent)]
  TomlDe(#[from] toml::de::Error),
}
