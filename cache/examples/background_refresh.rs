use fibre_memo::{CacheBuilder, CacheError, CacheType, RefreshType};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Unavailable;

impl std::fmt::Display for Unavailable {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("upstream unavailable")
  }
}

impl std::error::Error for Unavailable {}

fn main() {
  // RUST_LOG=fibre_memo=trace shows every sweep.
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
    .init();

  // Entries go stale after 300ms. A janitor sweeping every 100ms refreshes
  // them in the background while readers get the stale value.
  let cache = CacheBuilder::<String, u32, Unavailable>::new()
    .default_ttl(Duration::from_millis(300))
    .default_refresh_type(RefreshType::Async)
    .default_cache_type(CacheType::ReturnStaleOnError)
    .janitor(Duration::from_millis(100))
    .build()
    .expect("Failed to build cache");

  let version = Arc::new(AtomicU32::new(0));
  let upstream = {
    let version = version.clone();
    move || {
      let v = version.fetch_add(1, Ordering::SeqCst) + 1;
      // Every third call fails; the previous value stays in place.
      if v % 3 == 0 {
        Err(Unavailable)
      } else {
        Ok(v)
      }
    }
  };

  cache
    .set("config".to_string(), upstream)
    .expect("first call succeeds");

  for _ in 0..12 {
    thread::sleep(Duration::from_millis(150));
    match cache.get("config") {
      Ok(value) => println!("fresh: {}", value),
      Err(CacheError::ValueExpired { stale }) => println!("stale: {:?}", stale),
      Err(err) => println!("error: {} (stale: {:?})", err, err.stale()),
    }
  }

  cache.stop_janitor();
  println!("\n{}", cache.metrics());
}
