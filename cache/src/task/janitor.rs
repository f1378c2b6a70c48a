use crate::entry::CacheEntry;
use crate::metrics::Metrics;
use crate::policy::RefreshType;
use crate::store::ShardedStore;

use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ahash::HashSet;
use crossbeam_channel::{bounded, never, select, tick, Receiver, Sender};
use tracing::{debug, trace, warn};

/// Capacity of the "manage" and "release" channels.
///
/// Kept at one on purpose: it bounds how many membership changes can sit
/// unacknowledged. Producers never wait long because a consumer is always
/// draining, either the main loop or the per-tick drain thread.
const MEMBERSHIP_CHANNEL_CAPACITY: usize = 1;

/// The sending half of the janitor's membership channels.
///
/// Sends only block until the single slot frees up. Once the janitor has
/// stopped, every send fails immediately.
#[derive(Debug)]
pub(crate) struct Membership<K> {
  manage: Sender<K>,
  release: Sender<K>,
}

impl<K> Clone for Membership<K> {
  fn clone(&self) -> Self {
    Self {
      manage: self.manage.clone(),
      release: self.release.clone(),
    }
  }
}

impl<K> Membership<K> {
  /// Asks the janitor to start supervising `key`.
  pub(crate) fn manage(&self, key: K) -> bool {
    self.manage.send(key).is_ok()
  }

  /// Asks the janitor to stop supervising `key`.
  pub(crate) fn release(&self, key: K) -> bool {
    self.release.send(key).is_ok()
  }
}

/// Handle to the background sweeper of one cache.
///
/// Dropping the handle (or calling [`Janitor::stop`]) closes the stop channel,
/// which the janitor thread treats as cancellation.
pub(crate) struct Janitor<K> {
  handle: JoinHandle<()>,
  stop: Sender<()>,
  membership: Membership<K>,
}

impl<K> Janitor<K>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
{
  /// Spawns the janitor thread, seeded with the keys it starts out managing.
  pub(crate) fn spawn<V, E, H>(
    store: Arc<ShardedStore<K, CacheEntry<V, E>, H>>,
    metrics: Arc<Metrics>,
    cycle: Duration,
    seed: Vec<K>,
  ) -> Self
  where
    V: Send + Sync + 'static,
    E: Send + Sync + 'static,
    H: BuildHasher + Clone + Send + Sync + 'static,
  {
    let (stop_tx, stop_rx) = bounded::<()>(0);
    let (manage_tx, manage_rx) = bounded(MEMBERSHIP_CHANNEL_CAPACITY);
    let (release_tx, release_rx) = bounded(MEMBERSHIP_CHANNEL_CAPACITY);

    let sweeper = Sweeper {
      store,
      metrics,
      managed: seed.into_iter().collect(),
      release: release_tx.clone(),
    };

    let handle = thread::spawn(move || sweeper.run(cycle, stop_rx, manage_rx, release_rx));

    Self {
      handle,
      stop: stop_tx,
      membership: Membership {
        manage: manage_tx,
        release: release_tx,
      },
    }
  }
}

impl<K> Janitor<K> {
  pub(crate) fn membership(&self) -> Membership<K> {
    self.membership.clone()
  }

  /// Whether the janitor thread is still alive. It can only exit early if a
  /// callback panicked during a sweep.
  pub(crate) fn is_alive(&self) -> bool {
    !self.handle.is_finished()
  }

  /// Signals the janitor thread to stop and waits for it, unless called from
  /// the janitor thread itself (for example from inside a callback).
  pub(crate) fn stop(self) {
    let Janitor {
      handle,
      stop,
      membership,
    } = self;
    drop(stop);
    drop(membership);

    if handle.thread().id() != thread::current().id() && handle.join().is_err() {
      warn!("janitor thread panicked before shutdown");
    }
  }
}

#[derive(Debug, Default)]
struct SweepStats {
  refreshed: usize,
  failed: usize,
  evicted: usize,
  released: usize,
}

/// State owned by the janitor thread.
struct Sweeper<K, V, E, H> {
  store: Arc<ShardedStore<K, CacheEntry<V, E>, H>>,
  metrics: Arc<Metrics>,
  managed: HashSet<K>,
  /// Used by the sweep to release keys. Consumed by the drain thread while a
  /// sweep runs.
  release: Sender<K>,
}

impl<K, V, E, H> Sweeper<K, V, E, H>
where
  K: Eq + Hash + Clone + Send + Sync,
  V: Send + Sync,
  E: Send + Sync,
  H: BuildHasher + Clone,
{
  fn run(
    mut self,
    cycle: Duration,
    stop: Receiver<()>,
    manage: Receiver<K>,
    release: Receiver<K>,
  ) {
    let ticker = tick(cycle);
    debug!(
      cycle_ms = cycle.as_millis() as u64,
      managed = self.managed.len(),
      "janitor started"
    );

    loop {
      select! {
        // Nothing is ever sent on `stop`; it disconnects when the handle goes.
        recv(stop) -> _ => break,
        recv(manage) -> msg => match msg {
          Ok(key) => {
            self.managed.insert(key);
          }
          Err(_) => break,
        },
        recv(release) -> msg => {
          if let Ok(key) = msg {
            self.managed.remove(&key);
          }
        },
        recv(ticker) -> _ => self.tick(&manage, &release),
      }
    }

    debug!("janitor stopped");
  }

  /// Runs one sweep while a scoped drain thread keeps consuming membership
  /// signals into a private copy of the managed set. The copy replaces
  /// `managed` once the sweep is done.
  fn tick(&mut self, manage: &Receiver<K>, release: &Receiver<K>) {
    let (cancel_tx, cancel_rx) = bounded::<()>(0);
    let copy = self.managed.clone();
    let sweeper = &*self;

    let drained = thread::scope(|scope| {
      let drain = scope.spawn(move || drain_membership(copy, manage, release, &cancel_rx));

      let started = Instant::now();
      let stats = sweeper.sweep();
      Metrics::bump(&sweeper.metrics.janitor_sweeps);
      trace!(
        refreshed = stats.refreshed,
        failed = stats.failed,
        evicted = stats.evicted,
        released = stats.released,
        elapsed_us = started.elapsed().as_micros() as u64,
        "janitor sweep finished"
      );

      drop(cancel_tx);
      drain.join()
    });

    match drained {
      Ok(managed) => self.managed = managed,
      Err(_) => warn!("membership drain panicked; keeping the previous managed set"),
    }
  }

  /// Visits every managed key once.
  fn sweep(&self) -> SweepStats {
    let mut stats = SweepStats::default();

    for key in self.managed.iter() {
      // Brief shard read lock inside `get`; released before the entry lock.
      let entry = match self.store.get(key) {
        Some(entry) => entry,
        None => {
          // Unset since it was managed.
          let _ = self.release.send(key.clone());
          stats.released += 1;
          continue;
        }
      };

      let mut item = entry.item.write();
      if !item.is_expired(Instant::now()) {
        continue;
      }

      if entry.refresh_type() == RefreshType::NoRefresh {
        drop(item);
        let _ = self.release.send(key.clone());
        stats.released += 1;
        if self.store.remove_if_same(key, &entry).is_some() {
          Metrics::bump(&self.metrics.evicted_by_expiry);
          stats.evicted += 1;
        }
        continue;
      }

      // The error, if any, has already been applied per cache type.
      let succeeded = entry.refresh(&mut item).is_ok();
      drop(item);

      self.metrics.record_refresh(succeeded);
      Metrics::bump(&self.metrics.janitor_refreshes);
      if succeeded {
        stats.refreshed += 1;
      } else {
        stats.failed += 1;
        debug!("background refresh failed; result applied per cache type");
      }
    }

    stats
  }
}

/// Applies membership signals to `managed` until `cancel` disconnects, then
/// hands the updated set back.
///
/// A membership channel that disconnects is only dropped from the select.
/// The sweep may still be sending releases after the janitor was told to
/// stop, and those sends must always find a consumer.
fn drain_membership<K>(
  mut managed: HashSet<K>,
  manage: &Receiver<K>,
  release: &Receiver<K>,
  cancel: &Receiver<()>,
) -> HashSet<K>
where
  K: Eq + Hash,
{
  let mut manage = manage.clone();
  let mut release = release.clone();

  loop {
    select! {
      recv(cancel) -> _ => return managed,
      recv(manage) -> msg => match msg {
        Ok(key) => {
          managed.insert(key);
        }
        Err(_) => manage = never(),
      },
      recv(release) -> msg => match msg {
        Ok(key) => {
          managed.remove(&key);
        }
        Err(_) => release = never(),
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn drain_applies_signals_until_cancelled() {
    let (manage_tx, manage_rx) = bounded(MEMBERSHIP_CHANNEL_CAPACITY);
    let (release_tx, release_rx) = bounded(MEMBERSHIP_CHANNEL_CAPACITY);
    let (cancel_tx, cancel_rx) = bounded::<()>(0);

    let mut seed = HashSet::default();
    seed.insert("a");
    seed.insert("b");

    let drained = thread::scope(|scope| {
      let drain = scope.spawn(|| drain_membership(seed, &manage_rx, &release_rx, &cancel_rx));

      // A signal is applied as soon as it leaves its slot; waiting for the
      // slot keeps the cross-channel order deterministic.
      let settle = |tx: &Sender<&'static str>| {
        while !tx.is_empty() {
          thread::yield_now();
        }
      };
      manage_tx.send("c").unwrap();
      settle(&manage_tx);
      release_tx.send("a").unwrap();
      settle(&release_tx);

      drop(cancel_tx);
      drain.join().unwrap()
    });

    let mut keys: Vec<_> = drained.into_iter().collect();
    keys.sort();
    assert_eq!(keys, vec!["b", "c"]);
  }

  #[test]
  fn drain_outlives_a_disconnected_manage_channel() {
    let (manage_tx, manage_rx) = bounded::<&'static str>(MEMBERSHIP_CHANNEL_CAPACITY);
    let (release_tx, release_rx) = bounded(MEMBERSHIP_CHANNEL_CAPACITY);
    let (cancel_tx, cancel_rx) = bounded::<()>(0);

    let mut seed = HashSet::default();
    seed.insert("a");
    seed.insert("b");
    seed.insert("c");

    let drained = thread::scope(|scope| {
      let drain = scope.spawn(|| drain_membership(seed, &manage_rx, &release_rx, &cancel_rx));

      // What stopping the janitor does to the foreground senders.
      drop(manage_tx);

      // More releases than the channel holds: each one after the first only
      // fits once the drain has taken the previous one.
      release_tx.send("a").unwrap();
      release_tx.send("b").unwrap();
      release_tx.send("c").unwrap();
      while !release_tx.is_empty() {
        thread::yield_now();
      }

      drop(cancel_tx);
      drain.join().unwrap()
    });

    assert!(drained.is_empty());
  }
}
