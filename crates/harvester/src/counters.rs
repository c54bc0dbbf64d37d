//! Progress counters shared by both pools.
//!
//! Each counter sits behind its own lock, held only for the increment itself. Values are for
//! display; nothing in the pipeline branches on them except the sequence id handed out by
//! [`Counters::assign_sequence_id`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::*;

/// Locks a counter, recovering it if a previous holder panicked.
fn lock(counter: &Mutex<u64>) -> MutexGuard<'_, u64> {
  counter.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide counters of a single run.
#[derive(Debug, Default)]
pub struct Counters {
  /// Listing pages fetched and parsed
  pages:   Mutex<u64>,
  /// Records seen on those pages
  records: Mutex<u64>,
  /// Sequence ids handed out so far
  items:   Mutex<u64>,
}

/// A point-in-time copy of [`Counters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
  /// Listing pages fetched and parsed
  pub pages:   u64,
  /// Records seen on those pages
  pub records: u64,
  /// Sequence ids handed out so far
  pub items:   u64,
}

impl Counters {
  /// Creates zeroed counters, ready to be shared across workers.
  pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

  /// Records one parsed page holding `records` records.
  ///
  /// Returns the page and record totals after the update.
  pub fn record_page(&self, records: usize) -> (u64, u64) {
    let pages = {
      let mut pages = lock(&self.pages);
      *pages += 1;
      *pages
    };
    let records = {
      let mut seen = lock(&self.records);
      *seen += records as u64;
      *seen
    };
    (pages, records)
  }

  /// Hands out the next sequence id.
  ///
  /// Ids start at zero and are dense: after `n` calls exactly `0..n` have been returned, once
  /// each, whatever the interleaving of callers.
  pub fn assign_sequence_id(&self) -> u64 {
    let mut items = lock(&self.items);
    let id = *items;
    *items += 1;
    id
  }

  /// Copies the current values.
  pub fn snapshot(&self) -> CounterSnapshot {
    CounterSnapshot {
      pages:   *lock(&self.pages),
      records: *lock(&self.records),
      items:   *lock(&self.items),
    }
  }
}
