//! A concurrent memoizing cache: it stores the outcome of a callback under a
//! key and decides, per entry, what happens once that outcome goes stale.
//!
//! # Features
//! - **Memoized callbacks**: `set` runs a producing function once and serves
//!   its result (or its error) to later `get` calls until the TTL runs out.
//! - **Per-entry policy**: every entry carries a [`Ttl`], a [`CacheType`]
//!   deciding whether errors are cached, and a [`RefreshType`] deciding
//!   whether an expired entry is refreshed on access, in the background,
//!   only on demand, or evicted.
//! - **Background janitor**: an optional thread that refreshes or evicts
//!   expired managed keys on a fixed cycle.
//! - **Value cache**: a sibling store of plain values with the same expiry
//!   rules, reached through [`Cache::values`].
//! - **High Concurrency**: a sharded store plus a lock per entry. Callbacks
//!   never run under a shard lock.
//! - **Observability**: counters exposed as a [`MetricsSnapshot`].
//!
//! ```
//! use fibre_memo::{CacheBuilder, EntryOptions, Ttl};
//!
//! let cache = CacheBuilder::<&str, u64, String>::new().build().unwrap();
//!
//! let answer = cache.set("answer", || Ok(42)).unwrap();
//! assert_eq!(*answer, 42);
//!
//! // Served from memory; the callback does not run again.
//! assert_eq!(*cache.get("answer").unwrap(), 42);
//!
//! cache
//!   .set_with("pinned", || Ok(7), EntryOptions::new().ttl(Ttl::Never))
//!   .unwrap();
//! assert!(cache.has("pinned"));
//! ```

// Public modules that form the API
pub mod builder;
pub mod error;
pub mod handles;
pub mod metrics;
pub mod policy;

// Internal, crate-only modules
mod entry;
mod shared;
mod store;
mod task;

// Re-export the primary user-facing types for convenience
pub use builder::{CacheBuilder, CacheConfig};
pub use entry::{Callback, Outcome};
pub use error::{BuildError, CacheError};
pub use handles::{Cache, ValueCache};
pub use metrics::MetricsSnapshot;
pub use policy::{CacheType, DuplicateCheck, EntryOptions, RefreshType, Ttl, DEFAULT_TTL};
