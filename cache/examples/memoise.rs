use fibre_memo::{CacheBuilder, DuplicateCheck, EntryOptions, RefreshType, Ttl};
use std::convert::Infallible;
use std::thread;
use std::time::{Duration, Instant};

fn slow_call() -> Result<u64, Infallible> {
  thread::sleep(Duration::from_secs(1));
  Ok(42)
}

fn main() {
  // Nothing expires unless told otherwise, and `set` never overwrites.
  let cache = CacheBuilder::<&str, u64, Infallible>::new()
    .default_ttl(Ttl::Never)
    .duplicate_check(DuplicateCheck::On)
    .build()
    .expect("Failed to build cache");

  let started = Instant::now();
  cache.set("slow_call", slow_call).expect("slow_call cannot fail");
  println!("First call took {:?}", started.elapsed());

  cache
    .values()
    .set("simple_value", 42)
    .expect("simple_value is not set yet");

  println!("\nGet value from callback cache multiple times:");
  for _ in 0..3 {
    let started = Instant::now();
    let value = cache.get("slow_call");
    println!("Got {:?} in {:?}", value, started.elapsed());
  }

  println!("\nGet value, refreshing it each time:");
  for _ in 0..3 {
    let started = Instant::now();
    let value = cache.refresh("slow_call");
    println!("Got {:?} in {:?}", value, started.elapsed());
  }

  println!("\nGet value from the value cache:");
  for _ in 0..3 {
    println!("Got {:?}", cache.values().get("simple_value"));
  }

  // Duplicate check is on, so a second set is refused without calling.
  match cache.set("slow_call", slow_call) {
    Ok(value) => println!("\nUnexpectedly replaced slow_call with {}", value),
    Err(err) => println!("\nSecond set of slow_call refused: {}", err),
  }

  // A specific TTL and refresh behaviour for one entry.
  cache
    .set_with(
      "slow_call_with_refresh",
      slow_call,
      EntryOptions::new()
        .ttl(Duration::from_secs(10))
        .refresh_type(RefreshType::OnAccess),
    )
    .expect("slow_call cannot fail");

  println!("\n{}", cache.metrics());
}
