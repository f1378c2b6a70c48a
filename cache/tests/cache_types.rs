mod common;

use common::{wait_past, CallCounter, TestCache, TestError, SHORT_TTL};
use fibre_memo::{CacheBuilder, CacheType, EntryOptions, RefreshType};

fn cache_with(cache_type: CacheType) -> TestCache {
  CacheBuilder::new()
    .default_cache_type(cache_type)
    .build()
    .unwrap()
}

#[test]
fn test_uncached_error_is_retried_on_next_get() {
  let cache = cache_with(CacheType::ReturnErrorUncached);
  let counter = CallCounter::new();

  let err = cache
    .set("key1".to_string(), counter.failing_for(1))
    .unwrap_err();
  assert_eq!(err.producer_error(), Some(&TestError("call 1".to_string())));
  assert!(err.stale().is_none());
  // The key is stored even though the call failed.
  assert!(cache.has("key1"));

  // The failed item is already stale, so the next read calls again.
  assert_eq!(*cache.get("key1").unwrap(), 2);
  assert_eq!(counter.calls(), 2);
}

#[test]
fn test_uncached_refresh_failure_keeps_the_previous_value() {
  let cache = cache_with(CacheType::ReturnErrorUncached);
  let counter = CallCounter::new();
  cache
    .set("key1".to_string(), counter.succeeding_for(1))
    .unwrap();

  let err = cache.refresh("key1").unwrap_err();
  assert_eq!(err.producer_error(), Some(&TestError("call 2".to_string())));
  assert_eq!(err.stale().map(|v| **v), Some(1));

  // The stored item is untouched and still fresh.
  assert_eq!(*cache.get("key1").unwrap(), 1);
  assert_eq!(counter.calls(), 2);

  let metrics = cache.metrics();
  assert_eq!(metrics.refreshes, 1);
  assert_eq!(metrics.refresh_failures, 1);
}

#[test]
fn test_stale_on_error_returns_the_previous_value_with_the_error() {
  let cache: TestCache = CacheBuilder::new()
    .default_cache_type(CacheType::ReturnStaleOnError)
    .default_ttl(SHORT_TTL)
    .build()
    .unwrap();
  let counter = CallCounter::new();
  cache
    .set("key1".to_string(), counter.succeeding_for(1))
    .unwrap();

  wait_past(SHORT_TTL);
  let err = cache.get("key1").unwrap_err();
  assert_eq!(err.producer_error(), Some(&TestError("call 2".to_string())));
  assert_eq!(err.into_stale().map(|v| *v), Some(1));

  // Nothing was committed, so the entry is still expired and the next read
  // tries again.
  let err = cache.get("key1").unwrap_err();
  assert_eq!(err.producer_error(), Some(&TestError("call 3".to_string())));
  assert_eq!(err.stale().map(|v| **v), Some(1));
  assert_eq!(counter.calls(), 3);
}

#[test]
fn test_cache_all_replays_the_cached_error() {
  let cache = cache_with(CacheType::CacheAllIncludingErrors);
  let counter = CallCounter::new();

  let err = cache
    .set("key1".to_string(), counter.failing_for(1))
    .unwrap_err();
  assert_eq!(err.producer_error(), Some(&TestError("call 1".to_string())));

  for _ in 0..3 {
    let replay = cache.get("key1").unwrap_err();
    assert_eq!(replay.producer_error(), Some(&TestError("call 1".to_string())));
  }
  assert_eq!(counter.calls(), 1);
  // Replaying a cached outcome counts as a hit.
  assert_eq!(cache.metrics().hits, 3);
}

#[test]
fn test_cache_all_commits_a_failed_refresh() {
  let cache = cache_with(CacheType::CacheAllIncludingErrors);
  let counter = CallCounter::new();
  cache
    .set("key1".to_string(), counter.succeeding_for(1))
    .unwrap();

  let err = cache.refresh("key1").unwrap_err();
  assert!(err.stale().is_none());

  let replay = cache.get("key1").unwrap_err();
  assert_eq!(replay.producer_error(), Some(&TestError("call 2".to_string())));
  assert_eq!(counter.calls(), 2);
}

#[test]
fn test_cache_all_error_recovers_after_ttl() {
  let cache = cache_with(CacheType::ReturnErrorUncached);
  let counter = CallCounter::new();

  let options = EntryOptions::new()
    .cache_type(CacheType::CacheAllIncludingErrors)
    .refresh_type(RefreshType::OnAccess)
    .ttl(SHORT_TTL);
  assert!(cache
    .set_with("key1".to_string(), counter.failing_for(1), options)
    .is_err());

  assert!(cache.get("key1").is_err());
  wait_past(SHORT_TTL);
  assert_eq!(*cache.get("key1").unwrap(), 2);
}
