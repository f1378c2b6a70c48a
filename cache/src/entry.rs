use crate::error::CacheError;
use crate::policy::{CacheType, EntryPolicy, RefreshType, Ttl};

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

/// The producing function behind a cached entry.
pub type Callback<V, E> = Arc<dyn Fn() -> Result<V, E> + Send + Sync>;

/// What every cache read hands back: the payload, or an error that may still
/// carry one.
pub type Outcome<V, E = std::convert::Infallible> = Result<Arc<V>, CacheError<V, E>>;

/// The mutable part of an entry. Replaced wholesale on every commit.
pub(crate) struct Item<V, E> {
  /// Absent when the committing call failed.
  pub(crate) value: Option<Arc<V>>,
  pub(crate) error: Option<Arc<E>>,
  /// `None` means the item never expires.
  pub(crate) expires_at: Option<Instant>,
}

impl<V, E> Item<V, E> {
  /// An item that is already stale. Only observable if the first callback
  /// of a reserved entry panicked.
  fn placeholder() -> Self {
    Self {
      value: None,
      error: None,
      expires_at: Some(Instant::now()),
    }
  }

  #[inline]
  pub(crate) fn is_expired(&self, now: Instant) -> bool {
    matches!(self.expires_at, Some(at) if at <= now)
  }

  /// Replays the committed outcome, cached error included.
  pub(crate) fn outcome(&self) -> Outcome<V, E> {
    match (&self.value, &self.error) {
      (_, Some(error)) => Err(CacheError::Producer {
        error: error.clone(),
        stale: self.value.clone(),
      }),
      (Some(value), None) => Ok(value.clone()),
      (None, None) => Err(CacheError::KeyNotFound),
    }
  }
}

/// A callback-backed cache slot.
///
/// The policy is fixed at construction; only the item changes, and only
/// while its write lock is held.
pub(crate) struct CacheEntry<V, E> {
  callback: Callback<V, E>,
  pub(crate) policy: EntryPolicy,
  pub(crate) item: RwLock<Item<V, E>>,
}

impl<V, E> fmt::Debug for CacheEntry<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheEntry")
      .field("policy", &self.policy)
      .finish_non_exhaustive()
  }
}

impl<V, E> CacheEntry<V, E> {
  /// Creates an entry with a stale placeholder item. Call [`Self::populate`]
  /// before anyone else can see it.
  pub(crate) fn new(callback: Callback<V, E>, policy: EntryPolicy) -> Self {
    Self {
      callback,
      policy,
      item: RwLock::new(Item::placeholder()),
    }
  }

  #[inline]
  pub(crate) fn refresh_type(&self) -> RefreshType {
    self.policy.refresh_type
  }

  /// Produces the first item of a freshly created entry.
  ///
  /// Unlike a refresh, a failure always replaces the placeholder. Unless
  /// errors are cached, the item is stamped already expired so the error is
  /// never served as fresh.
  pub(crate) fn populate(&self, item: &mut Item<V, E>) -> Outcome<V, E> {
    let result = (self.callback)();
    let now = Instant::now();

    match result {
      Ok(value) => self.commit_value(item, value, now),
      Err(error) => {
        let error = Arc::new(error);
        let expires_at = match self.policy.cache_type {
          CacheType::CacheAllIncludingErrors => self.policy.ttl.deadline(now),
          _ => Some(now),
        };
        *item = Item {
          value: None,
          error: Some(error.clone()),
          expires_at,
        };
        Err(CacheError::Producer { error, stale: None })
      }
    }
  }

  /// Re-runs the callback and applies the entry's cache type to the result.
  ///
  /// The caller holds the item's write lock, which serializes refreshes of
  /// this entry.
  pub(crate) fn refresh(&self, item: &mut Item<V, E>) -> Outcome<V, E> {
    let result = (self.callback)();
    let now = Instant::now();

    match result {
      Ok(value) => self.commit_value(item, value, now),
      Err(error) => {
        let error = Arc::new(error);
        match self.policy.cache_type {
          CacheType::CacheAllIncludingErrors => {
            *item = Item {
              value: None,
              error: Some(error.clone()),
              expires_at: self.policy.ttl.deadline(now),
            };
            Err(CacheError::Producer { error, stale: None })
          }
          // The stored item is left exactly as it was. The caller still
          // gets the previous payload next to the fresh error.
          CacheType::ReturnStaleOnError | CacheType::ReturnErrorUncached => {
            Err(CacheError::Producer {
              error,
              stale: item.value.clone(),
            })
          }
        }
      }
    }
  }

  fn commit_value(&self, item: &mut Item<V, E>, value: V, now: Instant) -> Outcome<V, E> {
    let value = Arc::new(value);
    *item = Item {
      value: Some(value.clone()),
      error: None,
      expires_at: self.policy.ttl.deadline(now),
    };
    Ok(value)
  }
}

/// A fixed-payload slot of the value cache.
#[derive(Debug)]
pub(crate) struct ValueEntry<V> {
  pub(crate) value: Arc<V>,
  ttl: Ttl,
  /// Expired entries are treated as missing instead of stale.
  pub(crate) evict_on_expiry: bool,
  expires_at: RwLock<Option<Instant>>,
}

impl<V> ValueEntry<V> {
  pub(crate) fn new(value: Arc<V>, ttl: Ttl, refresh_type: RefreshType) -> Self {
    Self {
      value,
      ttl,
      evict_on_expiry: refresh_type == RefreshType::NoRefresh,
      expires_at: RwLock::new(ttl.deadline(Instant::now())),
    }
  }

  #[inline]
  pub(crate) fn is_expired(&self, now: Instant) -> bool {
    matches!(*self.expires_at.read(), Some(at) if at <= now)
  }

  /// Pushes the deadline out by one TTL. A `Never` entry is left alone.
  pub(crate) fn rearm(&self) {
    if let Ttl::After(_) = self.ttl {
      *self.expires_at.write() = self.ttl.deadline(Instant::now());
    }
  }
}
