use core::fmt;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<Q: Hash + ?Sized, H: BuildHasher>(hasher: &H, key: &Q) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

pub(crate) type ShardMap<K, T, H> = HashMap<K, Arc<T>, H>;

/// The key -> slot mapping, partitioned into independently locked shards.
///
/// A shard lock only ever guards the map structure. It is held just long
/// enough to insert, remove or clone out an `Arc` to a slot; slots carry
/// their own locks for their contents. No user code runs under a shard lock.
pub(crate) struct ShardedStore<K, T, H> {
  shards: Box<[CachePadded<RwLock<ShardMap<K, T, H>>>]>,
  hasher: H,
}

impl<K, T, H> fmt::Debug for ShardedStore<K, T, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedStore")
      .field("num_shards", &self.shards.len())
      .finish()
  }
}

impl<K, T, H> ShardedStore<K, T, H>
where
  K: Eq + Hash,
  H: BuildHasher + Clone,
{
  /// Creates a new `ShardedStore` with the specified number of shards and hasher.
  pub(crate) fn new(num_shards: usize, hasher: H) -> Self {
    let mut shards = Vec::with_capacity(num_shards);
    for _ in 0..num_shards {
      let shard_map = HashMap::with_hasher(hasher.clone());
      shards.push(CachePadded::new(RwLock::new(shard_map)));
    }

    Self {
      shards: shards.into_boxed_slice(),
      hasher,
    }
  }

  /// Returns the lock guarding the shard that owns `key`.
  #[inline]
  fn shard<Q>(&self, key: &Q) -> &RwLock<ShardMap<K, T, H>>
  where
    Q: Hash + ?Sized,
  {
    // `Borrow` guarantees `Q` hashes like the owned `K`, so lookups by
    // borrowed form land on the same shard as the insert did.
    // The builder rejects zero shards.
    let index = hash_key(&self.hasher, key) as usize % self.shards.len();
    &self.shards[index]
  }

  /// Clones out the slot for `key`. The shard lock is released on return.
  pub(crate) fn get<Q>(&self, key: &Q) -> Option<Arc<T>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.shard(key).read().get(key).cloned()
  }

  pub(crate) fn contains<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.shard(key).read().contains_key(key)
  }

  /// Inserts unconditionally, returning the slot that was replaced.
  pub(crate) fn insert(&self, key: K, slot: Arc<T>) -> Option<Arc<T>> {
    self.shard(&key).write().insert(key, slot)
  }

  /// Inserts only if `key` is absent. The check and the insert happen under
  /// one write lock.
  ///
  /// Returns the slot already present on conflict.
  pub(crate) fn insert_if_absent(&self, key: K, slot: &Arc<T>) -> Result<(), Arc<T>> {
    let mut guard = self.shard(&key).write();
    if let Some(existing) = guard.get(&key) {
      return Err(existing.clone());
    }
    guard.insert(key, slot.clone());
    Ok(())
  }

  /// Removes `key`, handing back the owned key together with its slot.
  pub(crate) fn remove<Q>(&self, key: &Q) -> Option<(K, Arc<T>)>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.shard(key).write().remove_entry(key)
  }

  /// Removes `key` only if it still maps to `slot`.
  ///
  /// Callers that decided to evict based on a slot they looked up earlier
  /// use this so that a concurrent `set` of a new slot is not thrown away.
  /// Hands back the owned key if the slot was removed.
  pub(crate) fn remove_if_same<Q>(&self, key: &Q, slot: &Arc<T>) -> Option<K>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let mut guard = self.shard(key).write();
    match guard.get(key) {
      Some(current) if Arc::ptr_eq(current, slot) => guard.remove_entry(key).map(|(key, _)| key),
      _ => None,
    }
  }

  /// Total number of keys across all shards. Shards are locked one at a
  /// time, so the figure is only a snapshot under concurrent writes.
  pub(crate) fn len(&self) -> usize {
    self.shards.iter().map(|shard| shard.read().len()).sum()
  }

  /// Collects the keys whose slot satisfies `predicate`, one shard at a time.
  pub(crate) fn keys_where(&self, mut predicate: impl FnMut(&T) -> bool) -> Vec<K>
  where
    K: Clone,
  {
    let mut keys = Vec::new();
    for shard in self.shards.iter() {
      let guard = shard.read();
      keys.extend(
        guard
          .iter()
          .filter(|(_, slot)| predicate(slot.as_ref()))
          .map(|(key, _)| key.clone()),
      );
    }
    keys
  }

  pub(crate) fn clear(&self) {
    for shard in self.shards.iter() {
      shard.write().clear();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn store(shards: usize) -> ShardedStore<String, u32, ahash::RandomState> {
    ShardedStore::new(shards, ahash::RandomState::new())
  }

  #[test]
  fn borrowed_lookups_find_owned_keys() {
    let store = store(8);
    for i in 0..64 {
      store.insert(format!("key-{}", i), Arc::new(i));
    }

    assert_eq!(store.len(), 64);
    for i in 0..64 {
      assert_eq!(store.get(format!("key-{}", i).as_str()).map(|v| *v), Some(i));
    }
  }

  #[test]
  fn insert_if_absent_reports_the_existing_slot() {
    let store = store(1);
    let first = Arc::new(1);
    assert!(store.insert_if_absent("k".to_string(), &first).is_ok());

    let existing = store.insert_if_absent("k".to_string(), &Arc::new(2)).unwrap_err();
    assert!(Arc::ptr_eq(&existing, &first));
  }

  #[test]
  fn remove_if_same_spares_a_replaced_slot() {
    let store = store(2);
    let old = Arc::new(1);
    store.insert("k".to_string(), old.clone());
    store.insert("k".to_string(), Arc::new(2));

    assert_eq!(store.remove_if_same("k", &old), None);
    assert!(store.contains("k"));

    let current = store.get("k").unwrap();
    assert_eq!(store.remove_if_same("k", &current), Some("k".to_string()));
    assert!(!store.contains("k"));
  }
}
