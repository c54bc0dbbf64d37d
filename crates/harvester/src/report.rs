//! Aggregation of per-job results.
//!
//! The drain functions consume a pool's outcome channel until it closes. They never stop early
//! on an error; every failure is kept, in arrival order, for the final [`HarvestReport`]. Once a
//! channel has closed, the number of outcomes received is compared with the number of jobs
//! submitted, and any shortfall (possible only when the run was cancelled or a worker died) is
//! counted as unprocessed.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::*;

/// A failed job.
#[derive(Debug)]
pub struct JobError {
  /// Which job failed
  pub job:   String,
  /// Why it failed
  pub error: HarvestError,
}

impl Display for JobError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.job, self.error)
  }
}

/// What the page fetch pool reported.
#[derive(Debug, Default)]
pub struct FetchSummary {
  /// Page jobs submitted
  pub submitted:         usize,
  /// Outcomes received
  pub received:          usize,
  /// Records handed to the store pool by successful jobs
  pub records_submitted: usize,
  /// Failed page jobs
  pub errors:            Vec<JobError>,
}

impl FetchSummary {
  /// Starts a summary for `submitted` page jobs.
  pub fn new(submitted: usize) -> Self { Self { submitted, ..Default::default() } }

  /// Adds one outcome.
  pub fn record(&mut self, outcome: FetchOutcome) {
    self.received += 1;
    match outcome.result {
      Ok(count) => self.records_submitted += count,
      Err(error) => self.errors.push(JobError { job: format!("page {}", outcome.page), error }),
    }
  }

  /// Page jobs that never reported.
  pub fn unprocessed(&self) -> usize { self.submitted.saturating_sub(self.received) }
}

/// What the record enrichment pool reported.
#[derive(Debug, Default)]
pub struct StoreSummary {
  /// Outcomes received
  pub received:        usize,
  /// Records whose metadata was stored
  pub stored:          usize,
  /// Artifacts uploaded
  pub uploaded:        usize,
  /// Sequence ids of stored records, in arrival order
  pub sequence_ids:    Vec<u64>,
  /// Records whose metadata could not be stored
  pub errors:          Vec<JobError>,
  /// Records stored without their artifact
  pub artifact_errors: Vec<JobError>,
}

impl StoreSummary {
  /// Adds one outcome.
  pub fn record(&mut self, outcome: StoreOutcome) {
    self.received += 1;
    if outcome.artifact_key.is_some() {
      self.uploaded += 1;
    }
    if let Some(error) = outcome.artifact_error {
      self.artifact_errors.push(JobError { job: outcome.title.clone(), error });
    }
    match outcome.store_result {
      Ok(()) => {
        self.stored += 1;
        if let Some(id) = outcome.sequence_id {
          self.sequence_ids.push(id);
        }
      },
      Err(error) => self.errors.push(JobError { job: outcome.title, error }),
    }
  }
}

/// Drains the fetch pool's outcome channel.
pub async fn drain_fetch_results(
  mut results: mpsc::Receiver<FetchOutcome>,
  submitted: usize,
) -> FetchSummary {
  let mut summary = FetchSummary::new(submitted);
  while let Some(outcome) = results.recv().await {
    summary.record(outcome);
  }
  if summary.unprocessed() > 0 {
    warn!("{} page jobs never reported a result", summary.unprocessed());
  }
  summary
}

/// Drains the store pool's outcome channel.
pub async fn drain_store_results(mut results: mpsc::Receiver<StoreOutcome>) -> StoreSummary {
  let mut summary = StoreSummary::default();
  while let Some(outcome) = results.recv().await {
    summary.record(outcome);
  }
  summary
}

/// Summary of a whole run.
#[derive(Debug)]
pub struct HarvestReport {
  /// When the run started
  pub started_at:         DateTime<Utc>,
  /// Wall-clock duration of the run
  pub elapsed:            Duration,
  /// Records matching the query, as reported by the first page
  pub total_records:      usize,
  /// Page jobs submitted to the fetch pool; zero on the single-page path
  pub pages_planned:      usize,
  /// Whether the first page was processed directly instead of through the pools
  pub single_page:        bool,
  /// Final counter values
  pub counters:           CounterSnapshot,
  /// Records whose metadata was stored
  pub items_stored:       usize,
  /// Artifacts uploaded
  pub artifacts_uploaded: usize,
  /// Sequence ids of stored records
  pub sequence_ids:       Vec<u64>,
  /// Failed page jobs, plus fetch workers that died
  pub fetch_errors:       Vec<JobError>,
  /// Records that could not be stored, plus store workers that died
  pub store_errors:       Vec<JobError>,
  /// Records stored without their artifact
  pub artifact_errors:    Vec<JobError>,
  /// Jobs that were submitted but never reported
  pub unprocessed:        usize,
}

impl HarvestReport {
  /// Builds a report from both pool summaries.
  pub fn new(
    started_at: DateTime<Utc>,
    total_records: usize,
    fetch: FetchSummary,
    store: StoreSummary,
    counters: CounterSnapshot,
  ) -> Self {
    let unprocessed =
      fetch.unprocessed() + fetch.records_submitted.saturating_sub(store.received);
    Self {
      started_at,
      elapsed: Duration::ZERO,
      total_records,
      pages_planned: fetch.submitted,
      single_page: false,
      counters,
      items_stored: store.stored,
      artifacts_uploaded: store.uploaded,
      sequence_ids: store.sequence_ids,
      fetch_errors: fetch.errors,
      store_errors: store.errors,
      artifact_errors: store.artifact_errors,
      unprocessed,
    }
  }

  /// Total number of errors of every kind.
  pub fn error_count(&self) -> usize {
    self.fetch_errors.len() + self.store_errors.len() + self.artifact_errors.len()
  }

  /// Whether every job succeeded.
  pub fn is_clean(&self) -> bool { self.error_count() == 0 && self.unprocessed == 0 }
}

impl Display for HarvestReport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "Started: {}", self.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(f, "Elapsed: {:.2?}", self.elapsed)?;
    writeln!(f, "Total records: {}", self.total_records)?;
    if self.single_page {
      writeln!(f, "Pages: 1 (single page)")?;
    } else {
      writeln!(f, "Pages: {} of {} planned", self.counters.pages, self.pages_planned)?;
    }
    writeln!(f, "Items stored: {}", self.items_stored)?;
    writeln!(f, "Artifacts uploaded: {}", self.artifacts_uploaded)?;
    if self.unprocessed > 0 {
      writeln!(f, "Unprocessed jobs: {}", self.unprocessed)?;
    }

    let sections = [
      ("Page errors", &self.fetch_errors),
      ("Store errors", &self.store_errors),
      ("Artifact errors", &self.artifact_errors),
    ];
    for (heading, errors) in sections {
      writeln!(f, "{heading}: {}", errors.len())?;
      for error in errors {
        writeln!(f, "  {error}")?;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn store_outcome(title: &str, id: u64, stored: bool, artifact_failed: bool) -> StoreOutcome {
    StoreOutcome {
      title:          title.into(),
      sequence_id:    Some(id),
      artifact_key:   None,
      artifact_error: artifact_failed
        .then(|| HarvestError::NotAnArtifact { url: format!("https://host/{id}.pdf") }),
      store_result:   if stored {
        Ok(())
      } else {
        Err(HarvestError::KeyValueStore("throttled".into()))
      },
    }
  }

  #[tokio::test]
  async fn test_drain_fetch_results_counts_shortfall() {
    let (tx, rx) = mpsc::channel(4);
    tx.send(FetchOutcome { page: 0, result: Ok(50) }).await.unwrap();
    tx.send(FetchOutcome { page: 2, result: Err(HarvestError::Api("503".into())) }).await.unwrap();
    drop(tx);

    let summary = drain_fetch_results(rx, 3).await;
    assert_eq!(summary.received, 2);
    assert_eq!(summary.records_submitted, 50);
    assert_eq!(summary.unprocessed(), 1);
    assert_eq!(summary.errors[0].job, "page 2");
  }

  #[tokio::test]
  async fn test_drain_store_results() {
    let (tx, rx) = mpsc::channel(4);
    tx.send(store_outcome("a", 0, true, false)).await.unwrap();
    tx.send(store_outcome("b", 1, true, true)).await.unwrap();
    tx.send(store_outcome("c", 2, false, false)).await.unwrap();
    drop(tx);

    let summary = drain_store_results(rx).await;
    assert_eq!(summary.received, 3);
    assert_eq!(summary.stored, 2);
    assert_eq!(summary.sequence_ids, vec![0, 1]);
    assert_eq!(summary.artifact_errors.len(), 1);
    assert_eq!(summary.artifact_errors[0].job, "b");
    assert_eq!(summary.errors.len(), 1);
  }

  #[test]
  fn test_report_display() {
    let mut fetch = FetchSummary::new(2);
    fetch.record(FetchOutcome { page: 0, result: Ok(2) });
    fetch.record(FetchOutcome { page: 1, result: Err(HarvestError::Parse("bad".into())) });
    let mut store = StoreSummary::default();
    store.record(store_outcome("Good", 0, true, false));

    let report = HarvestReport::new(Utc::now(), 20, fetch, store, CounterSnapshot::default());
    assert_eq!(report.unprocessed, 1);
    assert_eq!(report.error_count(), 1);
    assert!(!report.is_clean());

    let text = report.to_string();
    assert!(text.contains("Items stored: 1"));
    assert!(text.contains("Unprocessed jobs: 1"));
    assert!(text.contains("Page errors: 1"));
    assert!(text.contains("  page 1: Failed to parse listing page: bad"));
  }
}
