use crate::entry::CacheEntry;
use crate::handles::value::ValueCache;
use crate::metrics::Metrics;
use crate::policy::{DuplicateCheck, EntryPolicy, RefreshType};
use crate::store::ShardedStore;
use crate::task::janitor::{Janitor, Membership};

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

/// The internal, thread-safe core of the cache.
pub(crate) struct CacheShared<K, V, E, H> {
  pub(crate) store: Arc<ShardedStore<K, CacheEntry<V, E>, H>>,
  pub(crate) metrics: Arc<Metrics>,
  /// Policy applied to entries that do not override it.
  pub(crate) defaults: EntryPolicy,
  pub(crate) duplicate_check: DuplicateCheck,
  /// `None` while idle. Only ever locked briefly; never across a callback.
  pub(crate) janitor: Mutex<Option<Janitor<K>>>,
  pub(crate) values: ValueCache<K, V, H>,
}

impl<K, V, E, H> fmt::Debug for CacheShared<K, V, E, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("defaults", &self.defaults)
      .field("duplicate_check", &self.duplicate_check)
      .field("janitor", &self.janitor.lock().is_some())
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<K, V, E, H> Drop for CacheShared<K, V, E, H> {
  fn drop(&mut self) {
    if let Some(janitor) = self.janitor.get_mut().take() {
      janitor.stop();
    }
  }
}

impl<K, V, E, H> CacheShared<K, V, E, H> {
  /// Senders for the running janitor, if there is one.
  pub(crate) fn membership(&self) -> Option<Membership<K>> {
    self
      .janitor
      .lock()
      .as_ref()
      .filter(|janitor| janitor.is_alive())
      .map(Janitor::membership)
  }

  pub(crate) fn janitor_running(&self) -> bool {
    self
      .janitor
      .lock()
      .as_ref()
      .map_or(false, Janitor::is_alive)
  }

  /// Stops the janitor. Returns `false` if none was running.
  pub(crate) fn stop_janitor(&self) -> bool {
    // Taken out first so the lock is not held while joining.
    let janitor = self.janitor.lock().take();
    match janitor {
      Some(janitor) => {
        let was_alive = janitor.is_alive();
        janitor.stop();
        was_alive
      }
      None => false,
    }
  }
}

impl<K, V, E, H> CacheShared<K, V, E, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Starts the janitor unless one is already running.
  ///
  /// Entries already in the store with `RefreshType::Async` are managed from
  /// the first tick.
  pub(crate) fn start_janitor(&self, cycle: Duration) -> bool {
    let mut slot = self.janitor.lock();
    if slot.as_ref().map_or(false, Janitor::is_alive) {
      return false;
    }
    if let Some(dead) = slot.take() {
      dead.stop();
    }

    let seed = self
      .store
      .keys_where(|entry| entry.refresh_type() == RefreshType::Async);
    debug!(seeded = seed.len(), "starting janitor");

    *slot = Some(Janitor::spawn(
      Arc::clone(&self.store),
      Arc::clone(&self.metrics),
      cycle,
      seed,
    ));
    true
  }
}
