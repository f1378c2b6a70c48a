use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// The cache was configured with zero shards, which is not allowed.
  ZeroShards,
  /// The janitor was configured with a zero cycle, which would spin.
  ZeroJanitorCycle,
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroShards => write!(f, "shard count cannot be zero"),
      BuildError::ZeroJanitorCycle => write!(f, "janitor cycle cannot be zero"),
    }
  }
}

impl Error for BuildError {}

/// The error half of every cache lookup.
///
/// Several variants carry a payload next to the error: a stale value on
/// expiry, the previous value when a refresh failed, or the existing value
/// when a value-cache CAS lost. Always check [`CacheError::stale`] before
/// discarding one.
pub enum CacheError<V, E = std::convert::Infallible> {
  /// The key is absent, or was evicted because it expired with
  /// [`RefreshType::NoRefresh`](crate::RefreshType::NoRefresh).
  KeyNotFound,
  /// A check-and-set found the key already present.
  ///
  /// The value cache reports the payload it kept; the callback cache does not.
  DuplicateEntry { existing: Option<Arc<V>> },
  /// The entry expired and is not refreshed on access.
  ValueExpired { stale: Option<Arc<V>> },
  /// The callback failed. `error` is exactly what the callback returned.
  Producer {
    error: Arc<E>,
    stale: Option<Arc<V>>,
  },
}

impl<V, E> CacheError<V, E> {
  /// Returns the payload that accompanies this error, if any.
  pub fn stale(&self) -> Option<&Arc<V>> {
    match self {
      CacheError::KeyNotFound => None,
      CacheError::DuplicateEntry { existing } => existing.as_ref(),
      CacheError::ValueExpired { stale } => stale.as_ref(),
      CacheError::Producer { stale, .. } => stale.as_ref(),
    }
  }

  /// Consumes the error, returning the accompanying payload.
  pub fn into_stale(self) -> Option<Arc<V>> {
    match self {
      CacheError::KeyNotFound => None,
      CacheError::DuplicateEntry { existing } => existing,
      CacheError::ValueExpired { stale } => stale,
      CacheError::Producer { stale, .. } => stale,
    }
  }

  /// Returns the callback's own error when this is a producer failure.
  pub fn producer_error(&self) -> Option<&E> {
    match self {
      CacheError::Producer { error, .. } => Some(error.as_ref()),
      _ => None,
    }
  }

  pub fn is_key_not_found(&self) -> bool {
    matches!(self, CacheError::KeyNotFound)
  }

  pub fn is_duplicate_entry(&self) -> bool {
    matches!(self, CacheError::DuplicateEntry { .. })
  }

  pub fn is_value_expired(&self) -> bool {
    matches!(self, CacheError::ValueExpired { .. })
  }
}

impl<V, E> Clone for CacheError<V, E> {
  fn clone(&self) -> Self {
    match self {
      CacheError::KeyNotFound => CacheError::KeyNotFound,
      CacheError::DuplicateEntry { existing } => CacheError::DuplicateEntry {
        existing: existing.clone(),
      },
      CacheError::ValueExpired { stale } => CacheError::ValueExpired {
        stale: stale.clone(),
      },
      CacheError::Producer { error, stale } => CacheError::Producer {
        error: error.clone(),
        stale: stale.clone(),
      },
    }
  }
}

// Manual Debug so that `V` needs no bounds.
impl<V, E: fmt::Debug> fmt::Debug for CacheError<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CacheError::KeyNotFound => f.write_str("KeyNotFound"),
      CacheError::DuplicateEntry { existing } => f
        .debug_struct("DuplicateEntry")
        .field("has_existing", &existing.is_some())
        .finish(),
      CacheError::ValueExpired { stale } => f
        .debug_struct("ValueExpired")
        .field("has_stale", &stale.is_some())
        .finish(),
      CacheError::Producer { error, stale } => f
        .debug_struct("Producer")
        .field("error", error)
        .field("has_stale", &stale.is_some())
        .finish(),
    }
  }
}

impl<V, E: fmt::Display> fmt::Display for CacheError<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CacheError::KeyNotFound => write!(f, "cache does not contain given key"),
      CacheError::DuplicateEntry { .. } => write!(f, "cache already contains key"),
      CacheError::ValueExpired { .. } => write!(f, "the cache value has expired"),
      CacheError::Producer { error, .. } => write!(f, "cached call failed: {}", error),
    }
  }
}

impl<V, E: Error + 'static> Error for CacheError<V, E> {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      CacheError::Producer { error, .. } => Some(error.as_ref()),
      _ => None,
    }
  }
}
