//! The driver of a harvesting run.
//!
//! [`Harvester::run`] goes through these steps:
//!
//! 1. Make sure the table (and, with uploads enabled, the bucket) exists
//! 2. Fetch the first listing page to learn the total number of records
//! 3. Plan the number of page jobs with [`plan_jobs`]
//! 4. Either process the first page directly, or run both pools over every planned page
//! 5. Collect every per-job failure into a [`HarvestReport`]
//!
//! Failures in steps 1 and 2 end the run with an error. Everything after that is per job and
//! ends up in the report.

use chrono::Utc;
use tokio::{sync::mpsc, task::JoinSet};

use super::*;

/// Number of page jobs to submit.
///
/// With no ceiling (`max_pages < 0`) or a ceiling above the number of full pages, every page is
/// fetched; otherwise the ceiling applies. A result of zero means the first page is processed on
/// its own, which is also the case whenever that page already holds every record.
///
/// ```
/// use harvester::harvest::plan_jobs;
///
/// assert_eq!(plan_jobs(125, 50, -1), 3);
/// assert_eq!(plan_jobs(125, 50, 2), 2);
/// assert_eq!(plan_jobs(40, 50, -1), 0);
/// ```
pub fn plan_jobs(total: usize, page_size: usize, max_pages: i64) -> usize {
  if page_size == 0 || total <= page_size {
    return 0;
  }
  let full_pages = total / page_size;
  match usize::try_from(max_pages) {
    Ok(ceiling) if full_pages >= ceiling => ceiling,
    _ => total.div_ceil(page_size),
  }
}

/// A configured harvesting run.
pub struct Harvester {
  /// Run configuration
  config:   Arc<HarvestConfig>,
  /// Destination table backend
  kv:       Arc<dyn KeyValueStore>,
  /// Destination bucket backend, present when uploads are enabled
  objects:  Option<Arc<dyn ObjectStore>>,
  /// Keyword scraper
  keywords: Arc<dyn KeywordSource>,
  /// Shared HTTP client
  http:     reqwest::Client,
  /// Shared counters
  counters: Arc<Counters>,
  /// Run-wide cancellation
  token:    CancellationToken,
}

impl std::fmt::Debug for Harvester {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Harvester")
      .field("config", &self.config)
      .field("uploads", &self.objects.is_some())
      .finish_non_exhaustive()
  }
}

/// Builder for [`Harvester`].
pub struct HarvesterBuilder {
  /// Run configuration
  config:   HarvestConfig,
  /// Destination table backend
  kv:       Option<Arc<dyn KeyValueStore>>,
  /// Destination bucket backend
  objects:  Option<Arc<dyn ObjectStore>>,
  /// Keyword scraper, defaults to scraping landing pages over HTTP
  keywords: Option<Arc<dyn KeywordSource>>,
  /// Run-wide cancellation, defaults to a fresh token
  token:    Option<CancellationToken>,
}

impl HarvesterBuilder {
  /// Sets the key-value store metadata is written to.
  pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
    self.kv = Some(store);
    self
  }

  /// Sets the object store artifacts are uploaded to.
  pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
    self.objects = Some(store);
    self
  }

  /// Replaces the keyword scraper.
  pub fn keyword_source(mut self, source: Arc<dyn KeywordSource>) -> Self {
    self.keywords = Some(source);
    self
  }

  /// Sets the token that cancels the run.
  pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
    self.token = Some(token);
    self
  }

  /// Builds the harvester.
  pub fn build(self) -> Result<Harvester> {
    self.config.validate()?;
    let kv = self
      .kv
      .ok_or_else(|| HarvestError::Config("No key-value store configured".into()))?;
    let objects = if self.config.upload_enabled() {
      Some(self.objects.ok_or_else(|| {
        HarvestError::Config("A bucket is configured but no object store was given".into())
      })?)
    } else {
      None
    };

    let http = http_client(self.config.request_timeout)?;
    let keywords =
      self.keywords.unwrap_or_else(|| Arc::new(HtmlKeywordScraper::new(http.clone())));

    Ok(Harvester {
      config: Arc::new(self.config),
      kv,
      objects,
      keywords,
      http,
      counters: Counters::new(),
      token: self.token.unwrap_or_default(),
    })
  }
}

impl Harvester {
  /// Starts building a harvester for `config`.
  pub fn builder(config: HarvestConfig) -> HarvesterBuilder {
    HarvesterBuilder { config, kv: None, objects: None, keywords: None, token: None }
  }

  /// The run configuration.
  pub fn config(&self) -> &HarvestConfig { &self.config }

  /// Current counter values.
  pub fn progress(&self) -> CounterSnapshot { self.counters.snapshot() }

  /// Runs the harvest to completion.
  ///
  /// Returns an error only if the destination could not be prepared or the first listing page
  /// could not be fetched. Per-job failures are in the report.
  pub async fn run(&self) -> Result<HarvestReport> {
    let started_at = Utc::now();
    let started = tokio::time::Instant::now();

    self.prepare_storage().await?;

    let client = Arc::new(MetadataClient::new(self.http.clone(), &self.config));
    let first_page = cancellable(&self.token, client.first_page()).await?;
    let total = first_page.summary.total;
    info!("Total number of records: {total}");

    let num_jobs = plan_jobs(total, self.config.page_size, self.config.max_pages);
    let processor = Arc::new(self.record_processor());
    let mut report = if num_jobs == 0 {
      self.process_single_page(first_page, &processor, started_at).await
    } else {
      info!("Fetching {num_jobs} pages of {} records", self.config.page_size);
      self.run_pools(client, processor, num_jobs, total, started_at).await
    };

    report.elapsed = started.elapsed();
    info!("Harvest finished in {:.2?}, {} items stored", report.elapsed, report.items_stored);
    Ok(report)
  }

  /// Creates the table and bucket if needed.
  async fn prepare_storage(&self) -> Result<()> {
    let table = &self.config.table;
    for key in std::iter::once(&table.primary_key).chain(table.sort_key.as_ref()) {
      if !ATTRIBUTE_NAMES.contains(&key.name.as_str()) {
        warn!(
          "Key {} is not an attribute of stored items ({}), every put will be rejected",
          key.name,
          ATTRIBUTE_NAMES.join(", ")
        );
      }
    }

    cancellable(&self.token, self.kv.create_table_if_not_exists(table)).await?;
    if let (Some(objects), Some(bucket)) = (&self.objects, &self.config.bucket) {
      cancellable(&self.token, objects.create_bucket_if_not_exists(bucket)).await?;
    }
    Ok(())
  }

  /// The per-record pipeline shared by both paths.
  fn record_processor(&self) -> RecordProcessor {
    let processor = RecordProcessor::new(
      Arc::clone(&self.kv),
      &self.config.table.name,
      Arc::clone(&self.keywords),
      Arc::clone(&self.counters),
      self.token.clone(),
    )
    .with_content_host(&self.config.content_host);

    match (&self.objects, &self.config.bucket) {
      (Some(objects), Some(bucket)) => processor.with_artifacts(ArtifactUploader::new(
        self.http.clone(),
        Arc::clone(objects),
        bucket,
        &self.config.scratch_dir,
      )),
      _ => processor,
    }
  }

  /// Processes the records of the first page one after another, without any pool.
  async fn process_single_page(
    &self,
    page: Page,
    processor: &RecordProcessor,
    started_at: chrono::DateTime<Utc>,
  ) -> HarvestReport {
    info!("All {} records fit on the first page, processing it directly", page.records.len());
    let total = page.summary.total;
    let mut fetch = FetchSummary::new(0);
    fetch.records_submitted = page.records.len();
    self.counters.record_page(page.records.len());

    let mut store = StoreSummary::default();
    for record in page.records {
      if self.token.is_cancelled() {
        break;
      }
      store.record(processor.process(record).await);
    }

    let mut report = HarvestReport::new(started_at, total, fetch, store, self.counters.snapshot());
    report.single_page = true;
    report
  }

  /// Runs both pools over `num_jobs` pages.
  async fn run_pools(
    &self,
    client: Arc<MetadataClient>,
    processor: Arc<RecordProcessor>,
    num_jobs: usize,
    total: usize,
    started_at: chrono::DateTime<Utc>,
  ) -> HarvestReport {
    let record_capacity = (num_jobs * self.config.page_size).max(1);
    let (job_tx, job_rx) = mpsc::channel(num_jobs);
    let (record_tx, record_rx) = mpsc::channel(record_capacity);
    let (fetch_tx, fetch_rx) = mpsc::channel(num_jobs);
    let (store_tx, store_rx) = mpsc::channel(record_capacity);

    let fetch_pool = FetchPool {
      workers: self.config.fetch_workers,
      client: Arc::clone(&client),
      counters: Arc::clone(&self.counters),
      rate_limit: self.config.rate_limit,
      token: self.token.clone(),
    };
    let store_pool =
      StorePool { workers: self.config.store_workers, processor, token: self.token.clone() };
    let fetch_workers = fetch_pool.spawn(shared(job_rx), record_tx, fetch_tx);
    let store_workers = store_pool.spawn(shared(record_rx), store_tx);

    for (index, url) in client.page_urls(num_jobs).into_iter().enumerate() {
      if job_tx.send(PageJob { index, url }).await.is_err() {
        break;
      }
    }
    drop(job_tx);

    let (mut fetch, mut store) =
      tokio::join!(drain_fetch_results(fetch_rx, num_jobs), drain_store_results(store_rx));
    fetch.errors.extend(join_workers("fetch", fetch_workers).await);
    store.errors.extend(join_workers("store", store_workers).await);

    HarvestReport::new(started_at, total, fetch, store, self.counters.snapshot())
  }
}

/// Waits for every worker of a pool, turning panics into job errors.
async fn join_workers(pool: &str, mut workers: JoinSet<()>) -> Vec<JobError> {
  let mut errors = Vec::new();
  while let Some(joined) = workers.join_next().await {
    if let Err(e) = joined {
      error!("A {pool} worker died: {e}");
      errors.push(JobError { job: format!("{pool} worker"), error: e.into() });
    }
  }
  errors
}
