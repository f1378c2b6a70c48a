use crate::error::BuildError;
use crate::handles::{Cache, ValueCache};
use crate::metrics::Metrics;
use crate::policy::{CacheType, DuplicateCheck, EntryPolicy, RefreshType, Ttl};
use crate::shared::CacheShared;
use crate::store::ShardedStore;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

fn default_shards() -> usize {
  (num_cpus::get() * 4).max(1).next_power_of_two()
}

/// Plain-data form of the builder settings, suitable for loading from a
/// configuration file.
///
/// Missing fields take the same defaults as [`CacheBuilder::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfig {
  pub default_ttl: Ttl,
  pub default_cache_type: CacheType,
  pub default_refresh_type: RefreshType,
  pub duplicate_check: DuplicateCheck,
  /// `None` picks a count from the number of CPUs.
  pub shards: Option<usize>,
  /// Starts a janitor with this cycle when the cache is built.
  pub janitor_cycle: Option<Duration>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      default_ttl: Ttl::default(),
      default_cache_type: CacheType::default(),
      default_refresh_type: RefreshType::default(),
      duplicate_check: DuplicateCheck::default(),
      shards: None,
      janitor_cycle: None,
    }
  }
}

/// A builder for creating [`Cache`] instances.
///
/// `K` is the key type, `V` the payload produced by callbacks and `E` the
/// error they may return.
pub struct CacheBuilder<K, V, E, H = ahash::RandomState> {
  default_ttl: Ttl,
  default_cache_type: CacheType,
  default_refresh_type: RefreshType,
  duplicate_check: DuplicateCheck,
  shards: usize,
  janitor_cycle: Option<Duration>,
  hasher: H,
  _marker: PhantomData<fn() -> (K, V, E)>,
}

impl<K, V, E, H> fmt::Debug for CacheBuilder<K, V, E, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("default_ttl", &self.default_ttl)
      .field("default_cache_type", &self.default_cache_type)
      .field("default_refresh_type", &self.default_refresh_type)
      .field("duplicate_check", &self.duplicate_check)
      .field("shards", &self.shards)
      .field("janitor_cycle", &self.janitor_cycle)
      .finish_non_exhaustive()
  }
}

// --- Configuration Methods ---
impl<K, V, E, H> CacheBuilder<K, V, E, H> {
  /// Sets the TTL of entries stored without an override. Defaults to one
  /// minute, which a zero duration also selects.
  pub fn default_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
    self.default_ttl = ttl.into().non_zero().unwrap_or_default();
    self
  }

  /// Sets how callback errors are cached by default.
  pub fn default_cache_type(mut self, cache_type: CacheType) -> Self {
    self.default_cache_type = cache_type;
    self
  }

  /// Sets how expired entries are handled by default.
  pub fn default_refresh_type(mut self, refresh_type: RefreshType) -> Self {
    self.default_refresh_type = refresh_type;
    self
  }

  /// Makes `set` refuse to overwrite existing keys, on both the callback
  /// cache and its value cache.
  pub fn duplicate_check(mut self, duplicate_check: DuplicateCheck) -> Self {
    self.duplicate_check = duplicate_check;
    self
  }

  /// Sets the number of independently locked shards.
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = shards;
    self
  }

  /// Starts a janitor with the given sweep cycle as part of `build`.
  pub fn janitor(mut self, cycle: Duration) -> Self {
    self.janitor_cycle = Some(cycle);
    self
  }

  /// Sets the hasher used to pick shards and to hash keys within them.
  pub fn hasher<S>(self, hasher: S) -> CacheBuilder<K, V, E, S> {
    CacheBuilder {
      default_ttl: self.default_ttl,
      default_cache_type: self.default_cache_type,
      default_refresh_type: self.default_refresh_type,
      duplicate_check: self.duplicate_check,
      shards: self.shards,
      janitor_cycle: self.janitor_cycle,
      hasher,
      _marker: PhantomData,
    }
  }

  /// Validates the builder configuration.
  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    if self.janitor_cycle.map_or(false, |cycle| cycle.is_zero()) {
      return Err(BuildError::ZeroJanitorCycle);
    }
    Ok(())
  }
}

// --- Default Constructor ---
impl<K, V, E, H: BuildHasher + Default> CacheBuilder<K, V, E, H> {
  /// Creates a new `CacheBuilder` with default settings: a one minute TTL,
  /// uncached errors, refresh on access, no duplicate check and no janitor.
  pub fn new() -> Self {
    Self::from_config(CacheConfig::default())
  }

  /// Creates a builder from a [`CacheConfig`]. Setters may still be chained
  /// on the result.
  pub fn from_config(config: CacheConfig) -> Self {
    Self {
      default_ttl: config.default_ttl.non_zero().unwrap_or_default(),
      default_cache_type: config.default_cache_type,
      default_refresh_type: config.default_refresh_type,
      duplicate_check: config.duplicate_check,
      shards: config.shards.unwrap_or_else(default_shards),
      janitor_cycle: config.janitor_cycle,
      hasher: H::default(),
      _marker: PhantomData,
    }
  }
}

impl<K, V, E> Default for CacheBuilder<K, V, E, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

// --- Build Methods ---
impl<K, V, E, H> CacheBuilder<K, V, E, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Builds the cache, starting its janitor if one was configured.
  pub fn build(self) -> Result<Cache<K, V, E, H>, BuildError> {
    self.validate()?;

    let defaults = EntryPolicy {
      ttl: self.default_ttl,
      cache_type: self.default_cache_type,
      refresh_type: self.default_refresh_type,
    };
    let values = ValueCache::new(
      self.shards,
      self.hasher.clone(),
      self.default_ttl,
      self.default_refresh_type,
      self.duplicate_check,
    );

    let shared = Arc::new(CacheShared {
      store: Arc::new(ShardedStore::new(self.shards, self.hasher)),
      metrics: Arc::new(Metrics::new()),
      defaults,
      duplicate_check: self.duplicate_check,
      janitor: Mutex::new(None),
      values,
    });

    if let Some(cycle) = self.janitor_cycle {
      shared.start_janitor(cycle);
    }
    debug!(
      shards = self.shards,
      janitor = self.janitor_cycle.is_some(),
      "cache built"
    );

    Ok(Cache { shared })
  }
}
