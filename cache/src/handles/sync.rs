use crate::entry::{CacheEntry, Callback, Outcome};
use crate::error::{BuildError, CacheError};
use crate::handles::value::ValueCache;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::policy::{DuplicateCheck, EntryOptions, EntryPolicy, RefreshType};
use crate::shared::CacheShared;

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::trace;

/// A thread-safe memoizing cache of callback results.
///
/// Each key maps to a callback together with its last committed outcome.
/// Handles are cheap to clone and all clones share one store (and one
/// janitor).
pub struct Cache<K, V, E, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, E, H>>,
}

impl<K, V, E, H> Clone for Cache<K, V, E, H> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<K, V, E, H> fmt::Debug for Cache<K, V, E, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cache").field("shared", &self.shared).finish()
  }
}

impl<K, V, E, H> Cache<K, V, E, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Runs `callback`, caches its outcome under `key` and returns that outcome.
  ///
  /// The result always reflects the call just made, never a previously
  /// cached value. Any existing entry is replaced, unless the cache was built
  /// with [`DuplicateCheck::On`], in which case this behaves like [`Self::cas`].
  pub fn set<F>(&self, key: K, callback: F) -> Outcome<V, E>
  where
    F: Fn() -> Result<V, E> + Send + Sync + 'static,
  {
    self.set_with(key, callback, EntryOptions::default())
  }

  /// Like [`Self::set`], overriding the cache defaults for this entry.
  pub fn set_with<F>(&self, key: K, callback: F, options: EntryOptions) -> Outcome<V, E>
  where
    F: Fn() -> Result<V, E> + Send + Sync + 'static,
  {
    if self.shared.duplicate_check == DuplicateCheck::On {
      return self.cas_with(key, callback, options);
    }

    let entry = self.new_entry(callback, &options);
    // No one else can see the entry yet; the callback runs without any
    // shard lock held.
    let outcome = entry.populate(&mut entry.item.write());
    let managed = entry.refresh_type() == RefreshType::Async;

    let replaced = self.shared.store.insert(key.clone(), entry);
    Metrics::bump(&self.shared.metrics.sets);

    let was_managed = replaced.map_or(false, |old| old.refresh_type() == RefreshType::Async);
    if managed || was_managed {
      if let Some(membership) = self.shared.membership() {
        if managed {
          membership.manage(key);
        } else {
          membership.release(key);
        }
      }
    }

    outcome
  }

  /// Check-and-set: caches `callback`'s outcome only if `key` is absent.
  ///
  /// On conflict returns [`CacheError::DuplicateEntry`] without running the
  /// callback, and the stored entry is left untouched.
  pub fn cas<F>(&self, key: K, callback: F) -> Outcome<V, E>
  where
    F: Fn() -> Result<V, E> + Send + Sync + 'static,
  {
    self.cas_with(key, callback, EntryOptions::default())
  }

  /// Like [`Self::cas`], overriding the cache defaults for this entry.
  pub fn cas_with<F>(&self, key: K, callback: F, options: EntryOptions) -> Outcome<V, E>
  where
    F: Fn() -> Result<V, E> + Send + Sync + 'static,
  {
    let entry = self.new_entry(callback, &options);
    let managed = entry.refresh_type() == RefreshType::Async;

    let outcome = {
      // Lock the item before the entry becomes visible. Readers that find
      // the reserved key wait here until the first outcome is committed.
      let mut item = entry.item.write();
      if self.shared.store.insert_if_absent(key.clone(), &entry).is_err() {
        Metrics::bump(&self.shared.metrics.duplicates_rejected);
        return Err(CacheError::DuplicateEntry { existing: None });
      }
      entry.populate(&mut item)
    };
    Metrics::bump(&self.shared.metrics.sets);

    if managed {
      if let Some(membership) = self.shared.membership() {
        membership.manage(key);
      }
    }

    outcome
  }

  /// Returns the cached outcome for `key`, applying the entry's refresh type
  /// if it has expired.
  ///
  /// A fresh entry replays its committed outcome, cached errors included,
  /// without running the callback. An expired one:
  /// - `OnAccess`: is refreshed by this call;
  /// - `Async`: yields the stale payload with `ValueExpired` while a janitor
  ///   is running, and is refreshed by this call otherwise;
  /// - `Explicit`: yields the stale payload with `ValueExpired`;
  /// - `NoRefresh`: is evicted and reported as `KeyNotFound`.
  pub fn get<Q>(&self, key: &Q) -> Outcome<V, E>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let metrics = &self.shared.metrics;
    let entry = match self.shared.store.get(key) {
      Some(entry) => entry,
      None => {
        Metrics::bump(&metrics.misses);
        return Err(CacheError::KeyNotFound);
      }
    };

    let stale = {
      let item = entry.item.read();
      if !item.is_expired(Instant::now()) {
        Metrics::bump(&metrics.hits);
        return item.outcome();
      }
      item.value.clone()
    };

    match entry.refresh_type() {
      RefreshType::Explicit => self.stale_read(stale),
      RefreshType::Async if self.shared.janitor_running() => self.stale_read(stale),
      RefreshType::NoRefresh => {
        if let Some(owned) = self.shared.store.remove_if_same(key, &entry) {
          Metrics::bump(&metrics.evicted_by_expiry);
          trace!("evicted expired entry on access");
          if let Some(membership) = self.shared.membership() {
            membership.release(owned);
          }
        }
        Metrics::bump(&metrics.misses);
        Err(CacheError::KeyNotFound)
      }
      RefreshType::OnAccess | RefreshType::Async => {
        let mut item = entry.item.write();
        // Another reader may have refreshed it while we waited for the lock.
        if !item.is_expired(Instant::now()) {
          Metrics::bump(&metrics.hits);
          return item.outcome();
        }
        let outcome = entry.refresh(&mut item);
        metrics.record_refresh(outcome.is_ok());
        outcome
      }
    }
  }

  /// Re-runs the callback for `key` now, whatever its refresh type.
  ///
  /// On success (or with `CacheAllIncludingErrors`) the new outcome is
  /// committed with a fresh TTL. Otherwise the stored outcome is kept and the
  /// previous payload is returned next to the new error.
  pub fn refresh<Q>(&self, key: &Q) -> Outcome<V, E>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let entry = self.shared.store.get(key).ok_or(CacheError::KeyNotFound)?;
    let outcome = entry.refresh(&mut entry.item.write());
    self.shared.metrics.record_refresh(outcome.is_ok());
    outcome
  }

  /// Whether `key` is present, expired or not.
  pub fn has<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.shared.store.contains(key)
  }

  /// Removes `key`. Returns `false` if it was absent.
  pub fn unset<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    match self.shared.store.remove(key) {
      Some((key, _)) => {
        Metrics::bump(&self.shared.metrics.unsets);
        if let Some(membership) = self.shared.membership() {
          membership.release(key);
        }
        true
      }
      None => false,
    }
  }

  /// Hands `key` to the janitor, which will refresh it (or evict it, for
  /// `NoRefresh`) once it expires. `Async` entries are managed automatically.
  ///
  /// Returns `false` if no janitor is running. The key does not need to exist
  /// yet; absent keys are dropped from management on the next sweep. See
  /// [`Self::release`] for how the two signals are ordered.
  pub fn manage(&self, key: K) -> bool {
    self
      .shared
      .membership()
      .map_or(false, |membership| membership.manage(key))
  }

  /// Takes `key` away from the janitor. Returns `false` if no janitor is running.
  ///
  /// Manage and release signals travel on separate channels, so a `manage`
  /// immediately followed by a `release` of the same key (or the reverse)
  /// may be applied in either order. Signals of one kind keep their order.
  pub fn release(&self, key: K) -> bool {
    self
      .shared
      .membership()
      .map_or(false, |membership| membership.release(key))
  }

  /// Starts the background janitor, sweeping managed keys every `cycle`.
  ///
  /// Returns `Ok(false)` if a janitor is already running.
  pub fn start_janitor(&self, cycle: Duration) -> Result<bool, BuildError> {
    if cycle.is_zero() {
      return Err(BuildError::ZeroJanitorCycle);
    }
    Ok(self.shared.start_janitor(cycle))
  }

  /// Stops the background janitor and waits for its thread to exit.
  ///
  /// Returns `false` if none was running. Managed keys are forgotten; a
  /// restarted janitor starts from the `Async` entries present at that time.
  pub fn stop_janitor(&self) -> bool {
    self.shared.stop_janitor()
  }

  pub fn is_janitor_running(&self) -> bool {
    self.shared.janitor_running()
  }

  /// The sibling cache of plain values. It has its own store, locks and
  /// metrics, and shares only the cache-wide defaults and duplicate check.
  pub fn values(&self) -> &ValueCache<K, V, H> {
    &self.shared.values
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  /// Number of keys, expired ones included.
  pub fn len(&self) -> usize {
    self.shared.store.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Removes every key. Managed keys are dropped by the janitor on its next
  /// sweep.
  pub fn clear(&self) {
    self.shared.store.clear();
  }

  fn new_entry<F>(&self, callback: F, options: &EntryOptions) -> Arc<CacheEntry<V, E>>
  where
    F: Fn() -> Result<V, E> + Send + Sync + 'static,
  {
    let callback: Callback<V, E> = Arc::new(callback);
    let policy = EntryPolicy::resolve(&self.shared.defaults, options);
    Arc::new(CacheEntry::new(callback, policy))
  }

  fn stale_read(&self, stale: Option<Arc<V>>) -> Outcome<V, E> {
    Metrics::bump(&self.shared.metrics.stale_reads);
    Err(CacheError::ValueExpired { stale })
  }
}
