use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub struct Metrics {
  // --- Lookups ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,
  pub(crate) stale_reads: CachePadded<AtomicU64>,

  // --- Writes ---
  pub(crate) sets: CachePadded<AtomicU64>,
  pub(crate) duplicates_rejected: CachePadded<AtomicU64>,
  pub(crate) unsets: CachePadded<AtomicU64>,

  // --- Refreshes (foreground and background) ---
  pub(crate) refreshes: CachePadded<AtomicU64>,
  pub(crate) refresh_failures: CachePadded<AtomicU64>,
  pub(crate) evicted_by_expiry: CachePadded<AtomicU64>,

  // --- Janitor ---
  pub(crate) janitor_sweeps: CachePadded<AtomicU64>,
  pub(crate) janitor_refreshes: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      stale_reads: CachePadded::new(AtomicU64::new(0)),
      sets: CachePadded::new(AtomicU64::new(0)),
      duplicates_rejected: CachePadded::new(AtomicU64::new(0)),
      unsets: CachePadded::new(AtomicU64::new(0)),
      refreshes: CachePadded::new(AtomicU64::new(0)),
      refresh_failures: CachePadded::new(AtomicU64::new(0)),
      evicted_by_expiry: CachePadded::new(AtomicU64::new(0)),
      janitor_sweeps: CachePadded::new(AtomicU64::new(0)),
      janitor_refreshes: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Records the result of one callback run made to refresh an entry.
  #[inline]
  pub(crate) fn record_refresh(&self, succeeded: bool) {
    Self::bump(&self.refreshes);
    if !succeeded {
      Self::bump(&self.refresh_failures);
    }
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      stale_reads: self.stale_reads.load(Ordering::Relaxed),
      sets: self.sets.load(Ordering::Relaxed),
      duplicates_rejected: self.duplicates_rejected.load(Ordering::Relaxed),
      unsets: self.unsets.load(Ordering::Relaxed),
      refreshes: self.refreshes.load(Ordering::Relaxed),
      refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
      evicted_by_expiry: self.evicted_by_expiry.load(Ordering::Relaxed),
      janitor_sweeps: self.janitor_sweeps.load(Ordering::Relaxed),
      janitor_refreshes: self.janitor_refreshes.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the callback cache's metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
  /// Reads served from a fresh item, cached errors included.
  pub hits: u64,
  /// Reads of absent keys.
  pub misses: u64,
  pub hit_ratio: f64,
  /// Reads answered with a stale payload and `ValueExpired`.
  pub stale_reads: u64,
  pub sets: u64,
  /// `cas` calls (or duplicate-checked `set`s) that found the key taken.
  pub duplicates_rejected: u64,
  pub unsets: u64,
  /// Callback runs made to refresh an existing entry, by anyone.
  pub refreshes: u64,
  pub refresh_failures: u64,
  /// Entries removed because they expired under `NoRefresh`.
  pub evicted_by_expiry: u64,
  pub janitor_sweeps: u64,
  /// The subset of `refreshes` performed by the janitor.
  pub janitor_refreshes: u64,
  pub uptime_secs: u64,
}

impl fmt::Display for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Cache Metrics:")?;
    writeln!(f, "  Uptime: {}s", self.uptime_secs)?;
    writeln!(f, "  Hits: {} ({:.2}%)", self.hits, self.hit_ratio * 100.0)?;
    writeln!(f, "  Misses: {}", self.misses)?;
    writeln!(f, "  Stale Reads: {}", self.stale_reads)?;
    writeln!(f, "  Sets: {}", self.sets)?;
    writeln!(f, "  Duplicates Rejected: {}", self.duplicates_rejected)?;
    writeln!(f, "  Unsets: {}", self.unsets)?;
    writeln!(
      f,
      "  Refreshes: {} ({} failed, {} by janitor)",
      self.refreshes, self.refresh_failures, self.janitor_refreshes
    )?;
    writeln!(f, "  Evicted by Expiry: {}", self.evicted_by_expiry)?;
    write!(f, "  Janitor Sweeps: {}", self.janitor_sweeps)
  }
}
