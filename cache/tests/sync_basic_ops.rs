mod common;

use common::{build_test_cache, CallCounter, TestError};
use std::error::Error;

#[test]
fn test_sync_set_returns_the_fresh_result() {
  let cache = build_test_cache();
  let counter = CallCounter::new();

  let value = cache.set("key1".to_string(), counter.counting()).unwrap();
  assert_eq!(*value, 1);
  assert_eq!(counter.calls(), 1);

  // Served from memory.
  assert_eq!(*cache.get("key1").unwrap(), 1);
  assert_eq!(*cache.get("key1").unwrap(), 1);
  assert_eq!(counter.calls(), 1);

  let metrics = cache.metrics();
  assert_eq!(metrics.sets, 1);
  assert_eq!(metrics.hits, 2);
  assert_eq!(metrics.misses, 0);
}

#[test]
fn test_sync_set_replaces_the_existing_entry() {
  let cache = build_test_cache();
  cache.set("key1".to_string(), || Ok(10)).unwrap();

  let value = cache.set("key1".to_string(), || Ok(20)).unwrap();
  assert_eq!(*value, 20);
  assert_eq!(*cache.get("key1").unwrap(), 20);
  assert_eq!(cache.len(), 1);
}

#[test]
fn test_sync_get_missing_key() {
  let cache = build_test_cache();

  let err = cache.get("nope").unwrap_err();
  assert!(err.is_key_not_found());
  assert!(err.stale().is_none());
  assert_eq!(err.to_string(), "cache does not contain given key");
  assert_eq!(cache.metrics().misses, 1);
}

#[test]
fn test_sync_has_and_unset() {
  let cache = build_test_cache();
  cache.set("key1".to_string(), || Ok(1)).unwrap();
  assert!(cache.has("key1"));

  assert!(cache.unset("key1"));
  assert!(!cache.unset("key1"), "Double unset should fail");
  assert!(!cache.has("key1"));
  assert!(cache.get("key1").unwrap_err().is_key_not_found());
  assert_eq!(cache.metrics().unsets, 1);
}

#[test]
fn test_sync_refresh_reruns_the_callback() {
  let cache = build_test_cache();
  let counter = CallCounter::new();
  cache.set("key1".to_string(), counter.counting()).unwrap();

  assert_eq!(*cache.refresh("key1").unwrap(), 2);
  assert_eq!(*cache.get("key1").unwrap(), 2);
  assert_eq!(counter.calls(), 2);
  assert_eq!(cache.metrics().refreshes, 1);

  assert!(cache.refresh("missing").unwrap_err().is_key_not_found());
}

#[test]
fn test_sync_producer_error_is_passed_through() {
  let cache = build_test_cache();

  let err = cache
    .set("key1".to_string(), || Err(TestError("boom".to_string())))
    .unwrap_err();

  assert_eq!(err.producer_error(), Some(&TestError("boom".to_string())));
  assert!(err.stale().is_none());
  assert_eq!(err.to_string(), "cached call failed: test error: boom");

  let source = err.source().expect("producer error should be the source");
  assert_eq!(
    source.downcast_ref::<TestError>(),
    Some(&TestError("boom".to_string()))
  );
}

#[test]
fn test_sync_clear_and_len() {
  let cache = build_test_cache();
  for i in 0..10 {
    cache.set(format!("key{}", i), move || Ok(i)).unwrap();
  }
  assert_eq!(cache.len(), 10);
  assert!(!cache.is_empty());

  cache.clear();
  assert!(cache.is_empty());
  assert!(!cache.has("key3"));
}

#[test]
fn test_sync_clones_share_one_store() {
  let cache = build_test_cache();
  let other = cache.clone();

  cache.set("key1".to_string(), || Ok(5)).unwrap();
  assert_eq!(*other.get("key1").unwrap(), 5);

  assert!(other.unset("key1"));
  assert!(!cache.has("key1"));
}
