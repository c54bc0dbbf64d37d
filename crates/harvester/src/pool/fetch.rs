//! The page fetch pool.

use tokio::{sync::mpsc, task::JoinSet};

use super::*;

/// Configuration of the page fetch pool.
pub struct FetchPool {
  /// Number of workers
  pub workers:    usize,
  /// Listing page client
  pub client:     Arc<MetadataClient>,
  /// Shared counters
  pub counters:   Arc<Counters>,
  /// Pause each worker takes after a successful page
  pub rate_limit: Duration,
  /// Run-wide cancellation
  pub token:      CancellationToken,
}

impl FetchPool {
  /// Spawns the workers.
  ///
  /// Each worker takes [`PageJob`]s off `jobs` until the queue is closed and drained, sends every
  /// record of a fetched page to `records`, and sends one [`FetchOutcome`] per job to `results`.
  /// Workers own clones of both senders, so both channels close once the last worker exits.
  pub fn spawn(
    self,
    jobs: SharedReceiver<PageJob>,
    records: mpsc::Sender<RawRecord>,
    results: mpsc::Sender<FetchOutcome>,
  ) -> JoinSet<()> {
    let workers = self.workers;
    let pool = Arc::new(self);
    let mut set = JoinSet::new();
    for worker in 0..workers {
      let pool = Arc::clone(&pool);
      let jobs = Arc::clone(&jobs);
      let records = records.clone();
      let results = results.clone();
      set.spawn(async move { pool.run_worker(worker, jobs, records, results).await });
    }
    debug!("Started {workers} fetch workers");
    set
  }

  /// Loop of one worker.
  async fn run_worker(
    &self,
    worker: usize,
    jobs: SharedReceiver<PageJob>,
    records: mpsc::Sender<RawRecord>,
    results: mpsc::Sender<FetchOutcome>,
  ) {
    while let Some(job) = next_job(&jobs, &self.token).await {
      trace!(worker, page = job.index, "Fetching listing page");
      let result = self.fetch(worker, &job, &records).await;
      if let Err(e) = &result {
        warn!(worker, page = job.index, "Failed to fetch listing page: {e}");
      }
      if results.send(FetchOutcome { page: job.index, result }).await.is_err() {
        break;
      }
    }
    trace!(worker, "Fetch worker finished");
  }

  /// Fetches one page and hands its records on.
  async fn fetch(
    &self,
    worker: usize,
    job: &PageJob,
    records: &mpsc::Sender<RawRecord>,
  ) -> Result<usize> {
    let page = cancellable(&self.token, self.client.fetch_page(&job.url)).await?;
    let count = page.records.len();
    for record in page.records {
      cancellable(&self.token, async {
        records.send(record).await.map_err(|_| HarvestError::Cancelled)
      })
      .await?;
    }

    let (pages, seen) = self.counters.record_page(count);
    info!(worker, "Pages passed: {pages}, records: {seen}");

    tokio::select! {
      _ = self.token.cancelled() => {},
      _ = tokio::time::sleep(self.rate_limit) => {},
    }
    Ok(count)
  }
}
