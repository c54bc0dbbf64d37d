//! In-process storage backends for tests and dry runs.

use std::sync::{
  atomic::{AtomicBool, AtomicUsize, Ordering},
  Mutex, MutexGuard, PoisonError,
};

use super::*;

/// Locks a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

/// Renders a key attribute the way it is addressed in [`KeyValueStore::delete_item`].
fn key_string(attribute: &Attribute) -> Option<String> {
  match attribute {
    Attribute::S(value) | Attribute::N(value) => Some(value.clone()),
    _ => None,
  }
}

/// A table held by [`MemoryKeyValueStore`].
#[derive(Debug, Clone)]
struct MemoryTable {
  /// Schema the table was created with
  config: TableConfig,
  /// Items by partition key value
  items:  BTreeMap<String, Item>,
}

/// A [`KeyValueStore`] that keeps every table in memory.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
  /// Tables by name
  tables:              Mutex<BTreeMap<String, MemoryTable>>,
  /// Puts of items with this title are rejected
  fail_puts_for_title: Mutex<Option<String>>,
  /// Successful puts so far
  puts:                AtomicUsize,
}

impl MemoryKeyValueStore {
  /// Creates an empty store.
  pub fn new() -> Self { Self::default() }

  /// Makes every put of an item titled `title` fail.
  pub fn fail_puts_for_title(&self, title: impl Into<String>) {
    *lock(&self.fail_puts_for_title) = Some(title.into());
  }

  /// All items of a table, ordered by partition key value.
  pub fn items(&self, table: &str) -> Vec<Item> {
    lock(&self.tables).get(table).map(|t| t.items.values().cloned().collect()).unwrap_or_default()
  }

  /// Number of successful puts.
  pub fn put_count(&self) -> usize { self.puts.load(Ordering::SeqCst) }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
  async fn list_tables(&self) -> Result<Vec<String>> { Ok(lock(&self.tables).keys().cloned().collect()) }

  async fn create_table(&self, table: &TableConfig) -> Result<()> {
    let mut tables = lock(&self.tables);
    if tables.contains_key(&table.name) {
      return Err(HarvestError::KeyValueStore(format!("table {} already exists", table.name)));
    }
    tables.insert(table.name.clone(), MemoryTable { config: table.clone(), items: BTreeMap::new() });
    Ok(())
  }

  async fn put_item(&self, table: &str, item: Item) -> Result<()> {
    let rejected = lock(&self.fail_puts_for_title).clone();
    if let (Some(rejected), Some(Attribute::S(title))) = (rejected, item.get("Title")) {
      if *title == rejected {
        return Err(HarvestError::KeyValueStore(format!("put rejected for \"{title}\"")));
      }
    }

    let mut tables = lock(&self.tables);
    let stored = tables
      .get_mut(table)
      .ok_or_else(|| HarvestError::KeyValueStore(format!("table {table} does not exist")))?;
    let key_name = &stored.config.primary_key.name;
    let key = item.get(key_name).and_then(key_string).ok_or_else(|| {
      HarvestError::KeyValueStore(format!("item is missing key attribute {key_name}"))
    })?;
    stored.items.insert(key, item);
    self.puts.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  async fn delete_item(&self, table: &str, _key: &KeySchema, value: &str) -> Result<()> {
    let mut tables = lock(&self.tables);
    let stored = tables
      .get_mut(table)
      .ok_or_else(|| HarvestError::KeyValueStore(format!("table {table} does not exist")))?;
    stored.items.remove(value);
    Ok(())
  }

  async fn delete_table(&self, table: &str) -> Result<()> {
    lock(&self.tables)
      .remove(table)
      .map(|_| ())
      .ok_or_else(|| HarvestError::KeyValueStore(format!("table {table} does not exist")))
  }
}

/// An [`ObjectStore`] that keeps every object in memory.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
  /// Object contents by bucket and key
  buckets:      Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
  /// Reject every upload
  fail_uploads: AtomicBool,
  /// Successful uploads so far
  uploads:      AtomicUsize,
}

impl MemoryObjectStore {
  /// Creates an empty store.
  pub fn new() -> Self { Self::default() }

  /// Makes every subsequent upload fail.
  pub fn set_fail_uploads(&self, fail: bool) { self.fail_uploads.store(fail, Ordering::SeqCst); }

  /// Contents of an object, if it exists.
  pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
    lock(&self.buckets).get(bucket).and_then(|objects| objects.get(key).cloned())
  }

  /// Number of successful uploads.
  pub fn upload_count(&self) -> usize { self.uploads.load(Ordering::SeqCst) }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
  async fn list_buckets(&self) -> Result<Vec<String>> { Ok(lock(&self.buckets).keys().cloned().collect()) }

  async fn create_bucket(&self, bucket: &str) -> Result<()> {
    lock(&self.buckets).entry(bucket.to_string()).or_default();
    Ok(())
  }

  async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
    if self.fail_uploads.load(Ordering::SeqCst) {
      return Err(HarvestError::ObjectStore(format!("upload of {key} rejected")));
    }
    let contents = tokio::fs::read(path).await?;
    let mut buckets = lock(&self.buckets);
    let objects = buckets
      .get_mut(bucket)
      .ok_or_else(|| HarvestError::ObjectStore(format!("bucket {bucket} does not exist")))?;
    objects.insert(key.to_string(), contents);
    self.uploads.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
    lock(&self.buckets)
      .get(bucket)
      .map(|objects| objects.keys().cloned().collect())
      .ok_or_else(|| HarvestError::ObjectStore(format!("bucket {bucket} does not exist")))
  }

  async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
    if let Some(objects) = lock(&self.buckets).get_mut(bucket) {
      objects.remove(key);
    }
    Ok(())
  }

  async fn delete_bucket(&self, bucket: &str) -> Result<()> {
    let mut buckets = lock(&self.buckets);
    match buckets.get(bucket) {
      None => Err(HarvestError::ObjectStore(format!("bucket {bucket} does not exist"))),
      Some(objects) if !objects.is_empty() =>
        Err(HarvestError::ObjectStore(format!("bucket {bucket} is not empty"))),
      Some(_) => {
        buckets.remove(bucket);
        Ok(())
      },
    }
  }
}
