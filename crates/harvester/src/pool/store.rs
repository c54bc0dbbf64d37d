//! The record enrichment and upload pool.

use tokio::{sync::mpsc, task::JoinSet};

use super::*;

/// Configuration of the record enrichment pool.
pub struct StorePool {
  /// Number of workers
  pub workers:   usize,
  /// Per-record pipeline
  pub processor: Arc<RecordProcessor>,
  /// Run-wide cancellation
  pub token:     CancellationToken,
}

impl StorePool {
  /// Spawns the workers.
  ///
  /// Workers take records off `records` until it is closed and drained and send exactly one
  /// [`StoreOutcome`] per record to `results`.
  pub fn spawn(
    self,
    records: SharedReceiver<RawRecord>,
    results: mpsc::Sender<StoreOutcome>,
  ) -> JoinSet<()> {
    let workers = self.workers;
    let pool = Arc::new(self);
    let mut set = JoinSet::new();
    for worker in 0..workers {
      let pool = Arc::clone(&pool);
      let records = Arc::clone(&records);
      let results = results.clone();
      set.spawn(async move { pool.run_worker(worker, records, results).await });
    }
    debug!("Started {workers} store workers");
    set
  }

  /// Loop of one worker.
  async fn run_worker(
    &self,
    worker: usize,
    records: SharedReceiver<RawRecord>,
    results: mpsc::Sender<StoreOutcome>,
  ) {
    let mut processed = 0usize;
    while let Some(record) = next_job(&records, &self.token).await {
      let outcome = self.processor.process(record).await;
      processed += 1;
      if results.send(outcome).await.is_err() {
        break;
      }
    }
    debug!(worker, processed, "Store worker finished");
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use super::*;

  /// Scraper that never finds anything.
  struct NoKeywords;

  #[async_trait]
  impl KeywordSource for NoKeywords {
    async fn keywords(&self, _url: &str) -> Result<Vec<String>> { Ok(Vec::new()) }
  }

  fn record(i: usize) -> RawRecord {
    RawRecord {
      article:       Article { title: format!("Record {i}"), ..Default::default() },
      abstract_text: String::new(),
    }
  }

  async fn run(
    records: usize,
    workers: usize,
    store: Arc<MemoryKeyValueStore>,
  ) -> Vec<StoreOutcome> {
    let processor = RecordProcessor::new(
      store,
      "Articles",
      Arc::new(NoKeywords),
      Counters::new(),
      CancellationToken::new(),
    );
    let (record_tx, record_rx) = mpsc::channel(records.max(1));
    let (result_tx, mut result_rx) = mpsc::channel(records.max(1));
    let pool =
      StorePool { workers, processor: Arc::new(processor), token: CancellationToken::new() };
    let mut set = pool.spawn(shared(record_rx), result_tx);

    for i in 0..records {
      record_tx.send(record(i)).await.unwrap();
    }
    drop(record_tx);

    let mut outcomes = Vec::new();
    while let Some(outcome) = result_rx.recv().await {
      outcomes.push(outcome);
    }
    while let Some(joined) = set.join_next().await {
      joined.unwrap();
    }
    outcomes
  }

  async fn kv_store() -> Arc<MemoryKeyValueStore> {
    let store = Arc::new(MemoryKeyValueStore::new());
    store
      .create_table(&TableConfig::new("Articles", KeySchema::new("ID", KeyType::Number)))
      .await
      .unwrap();
    store
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_sequence_ids_are_dense() {
    let store = kv_store().await;
    let outcomes = run(200, 8, Arc::clone(&store)).await;

    assert_eq!(outcomes.len(), 200);
    assert!(outcomes.iter().all(|o| o.store_result.is_ok()));
    let ids: BTreeSet<u64> = outcomes.iter().filter_map(|o| o.sequence_id).collect();
    assert_eq!(ids, (0..200u64).collect::<BTreeSet<_>>());
    assert_eq!(store.items("Articles").len(), 200);
  }

  #[tokio::test]
  async fn test_failed_puts_are_reported_per_record() {
    let store = kv_store().await;
    store.fail_puts_for_title("Record 3");
    let outcomes = run(5, 2, Arc::clone(&store)).await;

    assert_eq!(outcomes.len(), 5);
    let failed: Vec<&str> =
      outcomes.iter().filter(|o| o.store_result.is_err()).map(|o| o.title.as_str()).collect();
    assert_eq!(failed, vec!["Record 3"]);
    assert_eq!(store.put_count(), 4);
  }

  #[tokio::test]
  async fn test_empty_queue() {
    let outcomes = run(0, 3, kv_store().await).await;
    assert!(outcomes.is_empty());
  }
}
