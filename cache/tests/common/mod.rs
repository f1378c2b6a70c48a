#![allow(dead_code)]

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fibre_memo::{Cache, CacheBuilder};

pub const SHORT_TTL: Duration = Duration::from_millis(40);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError(pub String);

impl fmt::Display for TestError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "test error: {}", self.0)
  }
}

impl Error for TestError {}

pub type TestCache = Cache<String, u32, TestError>;

pub fn build_test_cache() -> TestCache {
  CacheBuilder::new().shards(4).build().unwrap()
}

/// Sleeps well past `ttl`.
pub fn wait_past(ttl: Duration) {
  thread::sleep(ttl * 2 + Duration::from_millis(10));
}

/// Hands out callbacks that count their invocations.
///
/// Successful calls return the 1-based call number, so the value a caller
/// sees tells which invocation produced it.
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn calls(&self) -> usize {
    self.0.load(Ordering::SeqCst)
  }

  pub fn counting(&self) -> impl Fn() -> Result<u32, TestError> + Send + Sync + 'static {
    let calls = self.0.clone();
    move || Ok(calls.fetch_add(1, Ordering::SeqCst) as u32 + 1)
  }

  /// The first `n` calls succeed, every later one fails.
  pub fn succeeding_for(&self, n: usize) -> impl Fn() -> Result<u32, TestError> + Send + Sync + 'static {
    let calls = self.0.clone();
    move || {
      let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
      if call <= n {
        Ok(call as u32)
      } else {
        Err(TestError(format!("call {}", call)))
      }
    }
  }

  /// Like [`Self::counting`], but every call after the first `n` sleeps for
  /// `pause` once it has been counted.
  pub fn slow_after(&self, n: usize, pause: Duration) -> impl Fn() -> Result<u32, TestError> + Send + Sync + 'static {
    let calls = self.0.clone();
    move || {
      let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
      if call > n {
        thread::sleep(pause);
      }
      Ok(call as u32)
    }
  }

  /// The first `n` calls fail, every later one succeeds.
  pub fn failing_for(&self, n: usize) -> impl Fn() -> Result<u32, TestError> + Send + Sync + 'static {
    let calls = self.0.clone();
    move || {
      let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
      if call <= n {
        Err(TestError(format!("call {}", call)))
      } else {
        Ok(call as u32)
      }
    }
  }
}
