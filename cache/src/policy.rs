//! Policy knobs that decide how an entry ages and what happens once it has.
//!
//! Every entry carries a [`Ttl`], a [`CacheType`] and a [`RefreshType`]. The
//! cache-wide defaults live on the builder and can be overridden for a single
//! `set`/`cas` call through [`EntryOptions`].

use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The default time-to-live applied when nothing else is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// How long an entry stays fresh after it was produced.
///
/// `Ttl::Never` is a real value and not the same as leaving the TTL unset:
/// an unset TTL in [`EntryOptions`] falls back to the cache default. A zero
/// duration counts as unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Ttl {
  /// The entry never expires. It can still be refreshed explicitly.
  Never,
  /// The entry expires this long after it was last produced.
  After(Duration),
}

impl Ttl {
  /// Shorthand for `Ttl::After(duration)`.
  pub const fn after(duration: Duration) -> Self {
    Ttl::After(duration)
  }

  /// `None` for a zero duration, which stands for "use the default".
  #[inline]
  pub(crate) fn non_zero(self) -> Option<Self> {
    match self {
      Ttl::After(duration) if duration.is_zero() => None,
      ttl => Some(ttl),
    }
  }

  /// Returns the instant at which an item produced at `now` goes stale,
  /// or `None` when it never does.
  #[inline]
  pub(crate) fn deadline(&self, now: Instant) -> Option<Instant> {
    match self {
      Ttl::Never => None,
      // A duration too large to represent behaves like `Never`.
      Ttl::After(duration) => now.checked_add(*duration),
    }
  }
}

impl Default for Ttl {
  fn default() -> Self {
    Ttl::After(DEFAULT_TTL)
  }
}

impl From<Duration> for Ttl {
  fn from(duration: Duration) -> Self {
    Ttl::After(duration)
  }
}

/// Governs whether the outcome of a failed callback is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CacheType {
  /// Errors are handed to the caller but never committed to the entry.
  /// An entry whose first call failed is stored already expired.
  #[default]
  ReturnErrorUncached,
  /// Whatever the callback returns, error or not, is cached for the full TTL.
  CacheAllIncludingErrors,
  /// On a failed refresh the previous payload is kept and returned alongside
  /// the new error.
  ReturnStaleOnError,
}

/// Governs what happens when an expired entry is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RefreshType {
  /// The accessing caller refreshes the entry synchronously.
  #[default]
  OnAccess,
  /// The janitor refreshes the entry in the background. Readers get the
  /// stale payload with [`CacheError::ValueExpired`](crate::CacheError::ValueExpired)
  /// until it does. Without a running janitor this behaves like `OnAccess`.
  Async,
  /// Nothing refreshes the entry automatically. Readers get the stale payload
  /// with `ValueExpired` until `refresh` is called.
  Explicit,
  /// An expired entry is evicted on access and reported as missing.
  NoRefresh,
}

/// Whether a plain `set` refuses to overwrite an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DuplicateCheck {
  /// `set` overwrites silently.
  #[default]
  Off,
  /// `set` behaves like `cas`.
  On,
}

/// Per-call overrides for a single `set` or `cas`.
///
/// Fields left as `None` take the cache-wide default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryOptions {
  pub(crate) ttl: Option<Ttl>,
  pub(crate) cache_type: Option<CacheType>,
  pub(crate) refresh_type: Option<RefreshType>,
}

impl EntryOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Overrides the time-to-live of this entry. A zero duration keeps the
  /// cache default.
  pub fn ttl(mut self, ttl: impl Into<Ttl>) -> Self {
    self.ttl = ttl.into().non_zero();
    self
  }

  /// Overrides how this entry caches callback errors.
  pub fn cache_type(mut self, cache_type: CacheType) -> Self {
    self.cache_type = Some(cache_type);
    self
  }

  /// Overrides how this entry is refreshed once expired.
  pub fn refresh_type(mut self, refresh_type: RefreshType) -> Self {
    self.refresh_type = Some(refresh_type);
    self
  }
}

/// The fully resolved policy of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryPolicy {
  pub(crate) ttl: Ttl,
  pub(crate) cache_type: CacheType,
  pub(crate) refresh_type: RefreshType,
}

impl EntryPolicy {
  pub(crate) fn resolve(defaults: &EntryPolicy, options: &EntryOptions) -> Self {
    Self {
      ttl: options.ttl.unwrap_or(defaults.ttl),
      cache_type: options.cache_type.unwrap_or(defaults.cache_type),
      refresh_type: options.refresh_type.unwrap_or(defaults.refresh_type),
    }
  }
}
