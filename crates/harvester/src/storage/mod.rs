//! Storage backends.
//!
//! The pipeline talks to two collaborators through traits:
//!
//! - [`KeyValueStore`]: the table normalized metadata is written to
//! - [`ObjectStore`]: the bucket validated PDFs are uploaded to
//!
//! Production runs use [`DynamoStore`] and [`S3Store`]; tests and dry runs use
//! [`MemoryKeyValueStore`] and [`MemoryObjectStore`], which keep everything in process and expose
//! what was written for inspection.
//!
//! Operations that create or delete a backend resource only return once the change is visible,
//! polling for at most the configured backend wait.

use std::future::Future;

use super::*;

mod dynamo;
mod memory;
mod s3;

pub use dynamo::DynamoStore;
pub use memory::{MemoryKeyValueStore, MemoryObjectStore};
pub use s3::S3Store;

/// How long to sleep between visibility probes.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A typed attribute value of a stored item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
  /// String
  S(String),
  /// Number, in its decimal string form
  N(String),
  /// Boolean
  Bool(bool),
  /// Ordered list
  L(Vec<Attribute>),
  /// Nested map
  M(BTreeMap<String, Attribute>),
  /// Explicit absence
  Null,
}

/// A stored item: attribute name to value.
pub type Item = BTreeMap<String, Attribute>;

/// A table-oriented key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
  /// Names of all tables visible to the caller.
  async fn list_tables(&self) -> Result<Vec<String>>;

  /// Creates a table and waits until it accepts writes.
  async fn create_table(&self, table: &TableConfig) -> Result<()>;

  /// Writes an item, replacing any item with the same key.
  async fn put_item(&self, table: &str, item: Item) -> Result<()>;

  /// Deletes the item whose partition key `key` has the given value.
  async fn delete_item(&self, table: &str, key: &KeySchema, value: &str) -> Result<()>;

  /// Deletes a table.
  async fn delete_table(&self, table: &str) -> Result<()>;

  /// Creates the table unless a table of that name already exists.
  ///
  /// Returns whether a table was created.
  async fn create_table_if_not_exists(&self, table: &TableConfig) -> Result<bool> {
    if self.list_tables().await?.iter().any(|name| *name == table.name) {
      debug!("Table {} already exists", table.name);
      return Ok(false);
    }
    info!("Creating table {}", table.name);
    self.create_table(table).await?;
    Ok(true)
  }
}

/// A bucket-oriented object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
  /// Names of all buckets visible to the caller.
  async fn list_buckets(&self) -> Result<Vec<String>>;

  /// Creates a bucket and waits until it exists.
  async fn create_bucket(&self, bucket: &str) -> Result<()>;

  /// Uploads the file at `path` under `key` and waits until the object is visible.
  async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()>;

  /// Keys of all objects in a bucket.
  async fn list_objects(&self, bucket: &str) -> Result<Vec<String>>;

  /// Deletes an object and waits until it is gone.
  async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

  /// Deletes an empty bucket and waits until it is gone.
  async fn delete_bucket(&self, bucket: &str) -> Result<()>;

  /// Creates the bucket unless a bucket of that name already exists.
  ///
  /// Returns whether a bucket was created.
  async fn create_bucket_if_not_exists(&self, bucket: &str) -> Result<bool> {
    if self.list_buckets().await?.iter().any(|name| name == bucket) {
      debug!("Bucket {bucket} already exists");
      return Ok(false);
    }
    info!("Creating bucket {bucket}");
    self.create_bucket(bucket).await?;
    Ok(true)
  }
}

/// Loads the shared AWS configuration for the given credentials and checks that it is usable.
///
/// Static credentials are used as given. Ambient credentials go through the default provider
/// chain, and the run fails at startup if that chain yields nothing.
pub async fn load_aws_config(credentials: &Credentials) -> Result<aws_config::SdkConfig> {
  use aws_credential_types::provider::ProvideCredentials;

  let loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
  let loader = match credentials {
    Credentials::Static { access_key, secret_key, region } => loader
      .region(aws_config::Region::new(region.clone()))
      .credentials_provider(aws_credential_types::Credentials::new(
        access_key,
        secret_key,
        None,
        None,
        "harvester",
      )),
    Credentials::Ambient => {
      info!("Trying to find credentials in the environment");
      loader
    },
  };
  let sdk_config = loader.load().await;

  if sdk_config.region().is_none() {
    return Err(HarvestError::Credentials("no region configured".into()));
  }
  let provider = sdk_config
    .credentials_provider()
    .ok_or_else(|| HarvestError::Credentials("no credentials provider found".into()))?;
  provider.provide_credentials().await.map_err(|e| HarvestError::Credentials(e.to_string()))?;

  Ok(sdk_config)
}

/// Polls `probe` until it reports `true` or `wait` has elapsed.
pub(crate) async fn poll_until<F, Fut>(what: &str, wait: Duration, mut probe: F) -> Result<()>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<bool>>, {
  let deadline = tokio::time::Instant::now() + wait;
  loop {
    if probe().await? {
      return Ok(());
    }
    if tokio::time::Instant::now() >= deadline {
      return Err(HarvestError::Timeout(what.to_string()));
    }
    trace!("Still waiting for {what}");
    tokio::time::sleep(POLL_INTERVAL).await;
  }
}
