//! Per-key mutual exclusion
//!
//! [`KeyLockRegistry`] hands out one guard per key. Two tasks asking for the same key are
//! served one after the other, in arrival order. Tasks asking for different keys never wait
//! on each other, except for the short critical section on the registry map itself.
//!
//! Entries are created on demand and dropped as soon as a guard is released while no other
//! task holds a handle to the entry. Creating and evicting both happen under the same map
//! lock, so a waiter can never attach itself to an entry that is being removed.

use log::debug;
use std::{
    collections::HashMap,
    fmt::Debug,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Entries<K> = HashMap<K, Arc<AsyncMutex<()>>>;

#[derive(Debug)]
pub struct KeyLockRegistry<K> {
    entries: Arc<Mutex<Entries<K>>>,
}

impl<K> Clone for KeyLockRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<K> Default for KeyLockRegistry<K> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Error returned by [`KeyLockRegistry::acquire_timeout`]
#[derive(Debug, thiserror::Error)]
#[error("timed out after {0:?} waiting for the key lock")]
pub struct Elapsed(pub Duration);

impl<K> KeyLockRegistry<K>
where
    K: Clone + Debug + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    ///
    /// Waiters for the same key are granted the guard first-in, first-out.
    pub async fn acquire(&self, key: K) -> KeyGuard<K> {
        let entry = self.entry(&key);
        let guard = entry.lock_owned().await;
        debug!("acquired key lock for {key:?}");

        KeyGuard {
            entries: self.entries.clone(),
            key,
            guard: Some(guard),
        }
    }

    /// Same as [`acquire`](Self::acquire), but gives up after `timeout`
    pub async fn acquire_timeout(&self, key: K, timeout: Duration) -> Result<KeyGuard<K>, Elapsed> {
        let entry = self.entry(&key);
        let res = tokio::time::timeout(timeout, entry.clone().lock_owned()).await;
        match res {
            Ok(guard) => {
                debug!("acquired key lock for {key:?}");
                Ok(KeyGuard {
                    entries: self.entries.clone(),
                    key,
                    guard: Some(guard),
                })
            }
            Err(_) => {
                // Our handle kept the entry alive, so clean up behind us if we were the last
                drop(entry);
                evict_if_idle(&mut lock_entries(&self.entries), &key);
                Err(Elapsed(timeout))
            }
        }
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        lock_entries(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch or create the entry for `key`
    ///
    /// The returned handle is cloned while the map is locked, which keeps the entry from
    /// being evicted until the handle is dropped.
    fn entry(&self, key: &K) -> Arc<AsyncMutex<()>> {
        lock_entries(&self.entries)
            .entry(key.clone())
            .or_default()
            .clone()
    }
}

/// Exclusive access to one key, released on drop
#[must_use = "the key is unlocked as soon as the guard is dropped"]
#[derive(Debug)]
pub struct KeyGuard<K>
where
    K: Eq + Hash,
{
    entries: Arc<Mutex<Entries<K>>>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> KeyGuard<K>
where
    K: Eq + Hash,
{
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K> Drop for KeyGuard<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        // Unlock first, so the entry's handle count only reflects waiters and the map
        drop(self.guard.take());
        evict_if_idle(&mut lock_entries(&self.entries), &self.key);
    }
}

/// The registry map never holds invariants across a panic, so poisoning is ignored.
fn lock_entries<K>(entries: &Mutex<Entries<K>>) -> MutexGuard<'_, Entries<K>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remove `key` if the map holds the only handle to its entry
fn evict_if_idle<K>(entries: &mut Entries<K>, key: &K)
where
    K: Eq + Hash,
{
    let idle = entries
        .get(key)
        .map(|entry| Arc::strong_count(entry) == 1)
        .unwrap_or(false);
    if idle {
        entries.remove(key);
    }
}
