//! The two worker pools of a harvest.
//!
//! ```text
//!   page jobs ──► [fetch pool] ──► records ──► [store pool] ──► store outcomes
//!                      │                                              │
//!                      └──► fetch outcomes                            │
//!                                 │                                   │
//!                                 └──────────► report ◄───────────────┘
//! ```
//!
//! Both pools pull from a bounded queue shared by their workers and push exactly one outcome per
//! dequeued job. Completion is signalled by channel closure alone: every fetch worker owns a
//! clone of the records sender, so the records queue closes when the last fetch worker exits, and
//! the store pool then drains it and exits in turn.
//!
//! Each record goes through [`RecordProcessor::process`], which is also what the single-page path
//! of the driver calls directly.

use tokio::sync::{mpsc, Mutex};

use super::*;

mod fetch;
mod store;

pub use fetch::FetchPool;
pub use store::StorePool;

/// A queue consumed by every worker of a pool.
pub type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

/// Wraps a receiver so several workers can pull from it.
pub fn shared<T>(receiver: mpsc::Receiver<T>) -> SharedReceiver<T> {
  Arc::new(Mutex::new(receiver))
}

/// Takes the next job off a shared queue.
///
/// Returns `None` once the queue is closed and drained, or as soon as the run is cancelled.
pub(crate) async fn next_job<T>(queue: &SharedReceiver<T>, token: &CancellationToken) -> Option<T> {
  let mut queue = queue.lock().await;
  tokio::select! {
    biased;
    _ = token.cancelled() => None,
    job = queue.recv() => job,
  }
}

/// Request for one listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageJob {
  /// 0-based page index
  pub index: usize,
  /// Full request URL
  pub url:   String,
}

/// Result of one page job.
#[derive(Debug)]
pub struct FetchOutcome {
  /// 0-based page index
  pub page:   usize,
  /// Number of records handed to the store pool, or why the page failed
  pub result: Result<usize>,
}

/// Result of processing one record.
#[derive(Debug)]
pub struct StoreOutcome {
  /// Title of the record, for reporting
  pub title:          String,
  /// Sequence id the record was stored under, if it got that far
  pub sequence_id:    Option<u64>,
  /// Object key of the uploaded artifact
  pub artifact_key:   Option<String>,
  /// Why the artifact step failed, when it did
  pub artifact_error: Option<HarvestError>,
  /// Whether the metadata was stored
  pub store_result:   Result<()>,
}

impl StoreOutcome {
  /// An outcome for a record that was abandoned because the run was cancelled.
  fn cancelled(title: String) -> Self {
    Self {
      title,
      sequence_id: None,
      artifact_key: None,
      artifact_error: None,
      store_result: Err(HarvestError::Cancelled),
    }
  }
}

/// Turns raw records into stored metadata.
pub struct RecordProcessor {
  /// Destination table
  store:        Arc<dyn KeyValueStore>,
  /// Name of the destination table
  table:        String,
  /// Keyword scraper
  keywords:     Arc<dyn KeywordSource>,
  /// Artifact pipeline, present only when uploading is enabled
  artifacts:    Option<ArtifactUploader>,
  /// Shared counters handing out sequence ids
  counters:     Arc<Counters>,
  /// Host prefix artifact URLs are derived from
  content_host: String,
  /// Run-wide cancellation
  token:        CancellationToken,
}

impl std::fmt::Debug for RecordProcessor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RecordProcessor")
      .field("table", &self.table)
      .field("artifacts", &self.artifacts)
      .finish_non_exhaustive()
  }
}

impl RecordProcessor {
  /// Creates a processor writing to `table`.
  pub fn new(
    store: Arc<dyn KeyValueStore>,
    table: impl Into<String>,
    keywords: Arc<dyn KeywordSource>,
    counters: Arc<Counters>,
    token: CancellationToken,
  ) -> Self {
    Self {
      store,
      table: table.into(),
      keywords,
      artifacts: None,
      counters,
      content_host: DEFAULT_CONTENT_HOST.to_string(),
      token,
    }
  }

  /// Enables uploading of open-access artifacts.
  pub fn with_artifacts(mut self, artifacts: ArtifactUploader) -> Self {
    self.artifacts = Some(artifacts);
    self
  }

  /// Sets the host prefix artifact URLs are derived from.
  pub fn with_content_host(mut self, content_host: impl Into<String>) -> Self {
    self.content_host = content_host.into();
    self
  }

  /// Normalizes, enriches and stores one record.
  ///
  /// Keyword scraping failures only cost the record its keywords, and artifact failures only its
  /// file name; the metadata is stored either way.
  pub async fn process(&self, record: RawRecord) -> StoreOutcome {
    let mut meta = ArticleMeta::from_record(&record, &self.content_host);

    if meta.link.is_empty() {
      debug!("\"{}\" has no landing page, skipping keywords", meta.title);
    } else {
      match cancellable(&self.token, self.keywords.keywords(&meta.link)).await {
        Ok(keywords) => meta.keywords = keywords,
        Err(HarvestError::Cancelled) => return StoreOutcome::cancelled(meta.title),
        Err(e) => warn!("Failed to get keywords for \"{}\": {e}", meta.title),
      }
    }

    let artifact = self.artifact(&meta).await;
    if matches!(artifact, ArtifactOutcome::Failed(HarvestError::Cancelled)) {
      return StoreOutcome::cancelled(meta.title);
    }
    meta.file_name = artifact.file_name().to_string();
    let (artifact_key, artifact_error) = match artifact {
      ArtifactOutcome::Skipped => (None, None),
      ArtifactOutcome::Uploaded { key } => (Some(key), None),
      ArtifactOutcome::Failed(e) => {
        warn!("Storing \"{}\" without its artifact: {e}", meta.title);
        (None, Some(e))
      },
    };

    let sequence_id = self.counters.assign_sequence_id();
    meta.id = sequence_id;
    let store_result = match meta.to_item() {
      Ok(item) => cancellable(&self.token, self.store.put_item(&self.table, item)).await,
      Err(e) => Err(e),
    };
    match &store_result {
      Ok(()) => debug!("Stored \"{}\" as {sequence_id}", meta.title),
      Err(e) => debug!("Failed to store \"{}\": {e}", meta.title),
    }

    StoreOutcome {
      title: meta.title,
      sequence_id: Some(sequence_id),
      artifact_key,
      artifact_error,
      store_result,
    }
  }

  /// Runs the artifact step if the record qualifies for it.
  async fn artifact(&self, meta: &ArticleMeta) -> ArtifactOutcome {
    let (Some(uploader), Some(url)) = (&self.artifacts, &meta.pdf_link) else {
      return ArtifactOutcome::Skipped;
    };
    if !meta.open_access {
      return ArtifactOutcome::Skipped;
    }
    match cancellable(&self.token, uploader.transfer(url, &meta.title)).await {
      Ok(key) => ArtifactOutcome::Uploaded { key },
      Err(e) => ArtifactOutcome::Failed(e),
    }
  }
}
