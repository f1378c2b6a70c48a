use crate::entry::{Outcome, ValueEntry};
use crate::error::CacheError;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::policy::{DuplicateCheck, EntryOptions, RefreshType, Ttl};
use crate::store::ShardedStore;

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Instant;

use tracing::trace;

/// A cache of plain values that age like callback entries but are never
/// recomputed.
///
/// An expired value is returned as stale with [`CacheError::ValueExpired`]
/// until [`ValueCache::refresh`] rearms it, unless it was stored with
/// [`RefreshType::NoRefresh`], in which case it is evicted on access. Any
/// cache type given in [`EntryOptions`] is ignored.
pub struct ValueCache<K, V, H = ahash::RandomState> {
  store: ShardedStore<K, ValueEntry<V>, H>,
  default_ttl: Ttl,
  default_refresh_type: RefreshType,
  duplicate_check: DuplicateCheck,
  metrics: Metrics,
}

impl<K, V, H> fmt::Debug for ValueCache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ValueCache")
      .field("default_ttl", &self.default_ttl)
      .field("default_refresh_type", &self.default_refresh_type)
      .field("duplicate_check", &self.duplicate_check)
      .finish_non_exhaustive()
  }
}

impl<K, V, H> ValueCache<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher + Clone,
{
  pub(crate) fn new(
    shards: usize,
    hasher: H,
    default_ttl: Ttl,
    default_refresh_type: RefreshType,
    duplicate_check: DuplicateCheck,
  ) -> Self {
    Self {
      store: ShardedStore::new(shards, hasher),
      default_ttl,
      default_refresh_type,
      duplicate_check,
      metrics: Metrics::new(),
    }
  }

  /// Stores `value` under `key`, replacing any previous value unless the
  /// cache checks for duplicates.
  pub fn set(&self, key: K, value: V) -> Result<(), CacheError<V>> {
    self.set_with(key, value, EntryOptions::default())
  }

  pub fn set_with(&self, key: K, value: V, options: EntryOptions) -> Result<(), CacheError<V>> {
    if self.duplicate_check == DuplicateCheck::On {
      return self.cas_with(key, value, options).map(|_| ());
    }

    let entry = self.new_entry(value, &options);
    self.store.insert(key, entry);
    Metrics::bump(&self.metrics.sets);
    Ok(())
  }

  /// Stores `value` only if `key` is absent and returns it.
  ///
  /// On conflict the error carries the value already stored.
  pub fn cas(&self, key: K, value: V) -> Outcome<V> {
    self.cas_with(key, value, EntryOptions::default())
  }

  pub fn cas_with(&self, key: K, value: V, options: EntryOptions) -> Outcome<V> {
    let entry = self.new_entry(value, &options);
    match self.store.insert_if_absent(key, &entry) {
      Ok(()) => {
        Metrics::bump(&self.metrics.sets);
        Ok(entry.value.clone())
      }
      Err(existing) => {
        Metrics::bump(&self.metrics.duplicates_rejected);
        Err(CacheError::DuplicateEntry {
          existing: Some(existing.value.clone()),
        })
      }
    }
  }

  pub fn get<Q>(&self, key: &Q) -> Outcome<V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let entry = match self.store.get(key) {
      Some(entry) => entry,
      None => {
        Metrics::bump(&self.metrics.misses);
        return Err(CacheError::KeyNotFound);
      }
    };

    if !entry.is_expired(Instant::now()) {
      Metrics::bump(&self.metrics.hits);
      return Ok(entry.value.clone());
    }

    if entry.evict_on_expiry {
      if self.store.remove_if_same(key, &entry).is_some() {
        Metrics::bump(&self.metrics.evicted_by_expiry);
        trace!("evicted expired value on access");
      }
      Metrics::bump(&self.metrics.misses);
      return Err(CacheError::KeyNotFound);
    }

    Metrics::bump(&self.metrics.stale_reads);
    Err(CacheError::ValueExpired {
      stale: Some(entry.value.clone()),
    })
  }

  /// Restarts the TTL of `key` and returns its value. Values that never
  /// expire are returned untouched.
  pub fn refresh<Q>(&self, key: &Q) -> Outcome<V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let entry = self.store.get(key).ok_or(CacheError::KeyNotFound)?;
    entry.rearm();
    Metrics::bump(&self.metrics.refreshes);
    Ok(entry.value.clone())
  }

  pub fn has<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.store.contains(key)
  }

  /// Removes `key`. Returns `false` if it was absent.
  pub fn unset<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let removed = self.store.remove(key).is_some();
    if removed {
      Metrics::bump(&self.metrics.unsets);
    }
    removed
  }

  pub fn len(&self) -> usize {
    self.store.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.metrics.snapshot()
  }

  fn new_entry(&self, value: V, options: &EntryOptions) -> Arc<ValueEntry<V>> {
    Arc::new(ValueEntry::new(
      Arc::new(value),
      options.ttl.unwrap_or(self.default_ttl),
      options.refresh_type.unwrap_or(self.default_refresh_type),
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;
  use std::time::Duration;

  fn values(duplicate_check: DuplicateCheck) -> ValueCache<&'static str, u32> {
    ValueCache::new(
      4,
      ahash::RandomState::new(),
      Ttl::after(Duration::from_millis(30)),
      RefreshType::OnAccess,
      duplicate_check,
    )
  }

  #[test]
  fn duplicate_checked_set_refuses_to_overwrite() {
    let cache = values(DuplicateCheck::On);
    cache.set("k", 1).unwrap();

    let err = cache.set("k", 2).unwrap_err();
    assert!(err.is_duplicate_entry());
    assert_eq!(err.stale().map(|v| **v), Some(1));
    assert_eq!(*cache.get("k").unwrap(), 1);
  }

  #[test]
  fn refresh_rearms_an_expired_value() {
    let cache = values(DuplicateCheck::Off);
    cache.set("k", 7).unwrap();
    thread::sleep(Duration::from_millis(60));

    assert!(cache.get("k").unwrap_err().is_value_expired());
    assert_eq!(*cache.refresh("k").unwrap(), 7);
    assert_eq!(*cache.get("k").unwrap(), 7);
  }
}
