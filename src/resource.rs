// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Reference-counted sharing of heavy, cacheable assets.
//!
//! Decoded samples and loaded voice banks are expensive to produce, so every play
//! source that needs the same asset shares one copy. A [`ResourceRegistry`] maps a key
//! (usually a file path) to a loaded payload and a reference count. Each
//! [`SharedResource`] handle holds one reference; the payload is dropped when the last
//! handle is released.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

/// Errors raised while loading a resource. Nothing is registered when loading fails.
#[derive(Debug, thiserror::Error)]
pub enum ResourceLoadError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("unsupported resource {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    #[error("{0}")]
    Other(String),
}

struct Entry<T> {
    payload: Arc<T>,
    refs: usize,
}

/// Completion signal for a load in progress.
struct Pending {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl Pending {
    fn new() -> Pending {
        Pending {
            done: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.condvar.wait(&mut done);
        }
    }

    fn finish(&self) {
        *self.done.lock() = true;
        self.condvar.notify_all();
    }
}

enum Slot<T> {
    /// A loader is running for this key outside the registry lock.
    Loading(Arc<Pending>),
    Ready(Entry<T>),
}

type Entries<K, T> = Arc<Mutex<HashMap<K, Slot<T>>>>;

/// Publishes the end of a load. Dropping it without a published payload (loader error
/// or unwind) removes the placeholder, so nothing partial stays registered.
struct LoadGuard<'a, K: Eq + Hash, T> {
    entries: &'a Mutex<HashMap<K, Slot<T>>>,
    key: &'a K,
    pending: Arc<Pending>,
}

impl<K: Eq + Hash, T> Drop for LoadGuard<'_, K, T> {
    fn drop(&mut self) {
        {
            let mut entries = self.entries.lock();
            let ours = matches!(
                entries.get(self.key),
                Some(Slot::Loading(pending)) if Arc::ptr_eq(pending, &self.pending)
            );
            if ours {
                entries.remove(self.key);
            }
        }
        self.pending.finish();
    }
}

/// A registry of shared resources keyed by `K`.
///
/// The registry lock covers the key map only. It is held for lookups, inserts and
/// removals, never while a loader runs or a payload is dropped, so a slow load of one
/// key doesn't stall other keys.
pub struct ResourceRegistry<K, T> {
    /// Name used in log output.
    name: &'static str,
    entries: Entries<K, T>,
}

impl<K, T> ResourceRegistry<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    T: Send + Sync + 'static,
{
    /// Creates an empty registry.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns a handle to the resource stored under `key`, loading it with `loader` if
    /// it is not registered yet.
    ///
    /// Concurrent first acquisitions of one key wait for a single load. A failing loader
    /// registers nothing; callers that were waiting on it then try their own loader.
    pub fn acquire_or_create<F>(
        &self,
        key: K,
        loader: F,
    ) -> Result<SharedResource<K, T>, ResourceLoadError>
    where
        F: FnOnce(&K) -> Result<T, ResourceLoadError>,
    {
        let pending = loop {
            let mut entries = self.entries.lock();
            let in_progress = match entries.get_mut(&key) {
                Some(Slot::Ready(entry)) => {
                    entry.refs += 1;
                    debug!(
                        registry = self.name,
                        key = ?key,
                        refs = entry.refs,
                        "Using existing reference"
                    );
                    let payload = entry.payload.clone();
                    return Ok(self.handle(key, payload));
                }
                Some(Slot::Loading(pending)) => Some(pending.clone()),
                None => None,
            };

            match in_progress {
                Some(pending) => {
                    drop(entries);
                    debug!(registry = self.name, key = ?key, "Waiting for load in progress");
                    pending.wait();
                }
                None => {
                    let pending = Arc::new(Pending::new());
                    entries.insert(key.clone(), Slot::Loading(pending.clone()));
                    break pending;
                }
            }
        };

        let guard = LoadGuard {
            entries: self.entries.as_ref(),
            key: &key,
            pending,
        };

        info!(registry = self.name, key = ?key, "Loading resource");
        let payload = Arc::new(loader(&key)?);
        self.entries.lock().insert(
            key.clone(),
            Slot::Ready(Entry {
                payload: payload.clone(),
                refs: 1,
            }),
        );
        drop(guard);

        Ok(self.handle(key, payload))
    }

    fn handle(&self, key: K, payload: Arc<T>) -> SharedResource<K, T> {
        SharedResource {
            key,
            payload,
            entries: self.entries.clone(),
            registry: self.name,
        }
    }

    /// Returns another handle to an already registered resource, if any.
    pub fn acquire(&self, key: &K) -> Option<SharedResource<K, T>> {
        let payload = {
            let mut entries = self.entries.lock();
            let Some(Slot::Ready(entry)) = entries.get_mut(key) else {
                return None;
            };
            entry.refs += 1;
            entry.payload.clone()
        };
        Some(self.handle(key.clone(), payload))
    }

    /// Returns the number of outstanding handles for `key` (0 when not registered).
    pub fn ref_count(&self, key: &K) -> usize {
        match self.entries.lock().get(key) {
            Some(Slot::Ready(entry)) => entry.refs,
            _ => 0,
        }
    }

    /// Returns true if `key` is loaded and registered.
    pub fn contains(&self, key: &K) -> bool {
        matches!(self.entries.lock().get(key), Some(Slot::Ready(_)))
    }

    /// Returns the number of loaded resources.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Returns true if nothing is loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits every loaded payload. Used for memory accounting.
    pub fn for_each<F: FnMut(&K, &T)>(&self, mut f: F) {
        for (key, slot) in self.entries.lock().iter() {
            if let Slot::Ready(entry) = slot {
                f(key, &entry.payload);
            }
        }
    }
}

impl<K, T> fmt::Debug for ResourceRegistry<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("name", &self.name)
            .field("entries", &self.len())
            .finish()
    }
}

/// One counted reference to a registered resource.
///
/// Cloning takes another reference. Dropping (or calling [`SharedResource::release`])
/// gives it back; releasing the last reference removes the registry entry and drops the
/// payload.
pub struct SharedResource<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    key: K,
    payload: Arc<T>,
    entries: Entries<K, T>,
    registry: &'static str,
}

impl<K, T> SharedResource<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// The key this resource was registered under.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The shared payload.
    pub fn payload(&self) -> &Arc<T> {
        &self.payload
    }

    /// Gives this reference back to the registry.
    pub fn release(self) {
        drop(self)
    }
}

impl<K, T> Clone for SharedResource<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn clone(&self) -> Self {
        if let Some(Slot::Ready(entry)) = self.entries.lock().get_mut(&self.key) {
            entry.refs += 1;
        }
        Self {
            key: self.key.clone(),
            payload: self.payload.clone(),
            entries: self.entries.clone(),
            registry: self.registry,
        }
    }
}

impl<K, T> Drop for SharedResource<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn drop(&mut self) {
        // The registry's copy of the payload leaves the map under the lock but is
        // dropped after it is released.
        let removed = {
            let mut entries = self.entries.lock();
            let remaining = match entries.get_mut(&self.key) {
                Some(Slot::Ready(entry)) => {
                    entry.refs = entry.refs.saturating_sub(1);
                    entry.refs
                }
                _ => return,
            };
            if remaining > 0 {
                debug!(
                    registry = self.registry,
                    key = ?self.key,
                    refs = remaining,
                    "Un-referencing resource"
                );
                return;
            }
            entries.remove(&self.key)
        };
        info!(registry = self.registry, key = ?self.key, "Releasing resource");
        drop(removed);
    }
}

impl<K, T> Deref for SharedResource<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    type Target = T;

    fn deref(&self) -> &T {
        &self.payload
    }
}

impl<K, T> fmt::Debug for SharedResource<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedResource")
            .field("registry", &self.registry)
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use crossbeam_channel::bounded;

    /// Payload that counts how many times it has been dropped.
    struct Tracked {
        drops: Arc<AtomicUsize>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn loader_for(
        loads: &Arc<AtomicUsize>,
        drops: &Arc<AtomicUsize>,
    ) -> impl FnOnce(&String) -> Result<Tracked, ResourceLoadError> {
        let loads = loads.clone();
        let drops = drops.clone();
        move |_| {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Tracked { drops })
        }
    }

    #[test]
    fn test_load_once_destroy_after_last_release() {
        let registry: ResourceRegistry<String, Tracked> = ResourceRegistry::new("test");
        let loads = Arc::new(AtomicUsize::new(0));
        let drops = Arc::new(AtomicUsize::new(0));

        let first = registry
            .acquire_or_create("kick.wav".to_string(), loader_for(&loads, &drops))
            .unwrap();
        let second = registry
            .acquire_or_create("kick.wav".to_string(), loader_for(&loads, &drops))
            .unwrap();
        let third = second.clone();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(registry.ref_count(&"kick.wav".to_string()), 3);

        first.release();
        drop(third);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert!(registry.contains(&"kick.wav".to_string()));

        second.release();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.ref_count(&"kick.wav".to_string()), 0);
    }

    #[test]
    fn test_reload_after_full_release() {
        let registry: ResourceRegistry<String, Tracked> = ResourceRegistry::new("test");
        let loads = Arc::new(AtomicUsize::new(0));
        let drops = Arc::new(AtomicUsize::new(0));

        let handle = registry
            .acquire_or_create("pad.wav".to_string(), loader_for(&loads, &drops))
            .unwrap();
        drop(handle);
        let handle = registry
            .acquire_or_create("pad.wav".to_string(), loader_for(&loads, &drops))
            .unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        drop(handle);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_load_registers_nothing() {
        let registry: ResourceRegistry<String, Tracked> = ResourceRegistry::new("test");

        let result = registry.acquire_or_create("missing.wav".to_string(), |_| {
            Err(ResourceLoadError::Other("no such file".to_string()))
        });

        assert!(result.is_err());
        assert!(registry.is_empty());
        assert!(registry.acquire(&"missing.wav".to_string()).is_none());
    }

    #[test]
    fn test_independent_keys() {
        let registry: ResourceRegistry<String, Tracked> = ResourceRegistry::new("test");
        let loads = Arc::new(AtomicUsize::new(0));
        let drops = Arc::new(AtomicUsize::new(0));

        let a = registry
            .acquire_or_create("a".to_string(), loader_for(&loads, &drops))
            .unwrap();
        let b = registry
            .acquire_or_create("b".to_string(), loader_for(&loads, &drops))
            .unwrap();
        assert_eq!(registry.len(), 2);

        drop(a);
        assert_eq!(registry.len(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(b.key(), "b");
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let registry: Arc<ResourceRegistry<String, Tracked>> =
            Arc::new(ResourceRegistry::new("test"));
        let loads = Arc::new(AtomicUsize::new(0));
        let drops = Arc::new(AtomicUsize::new(0));

        // Keep one reference alive so the payload survives the whole run.
        let anchor = registry
            .acquire_or_create("bank.sf2".to_string(), loader_for(&loads, &drops))
            .unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let joins: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                let loads = loads.clone();
                let drops = drops.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..200 {
                        let handle = registry
                            .acquire_or_create("bank.sf2".to_string(), loader_for(&loads, &drops))
                            .unwrap();
                        let copy = handle.clone();
                        drop(handle);
                        drop(copy);
                    }
                })
            })
            .collect();
        for join in joins {
            join.join().unwrap();
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(registry.ref_count(&"bank.sf2".to_string()), 1);

        drop(anchor);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_slow_load_does_not_block_other_keys() {
        let registry: Arc<ResourceRegistry<String, Tracked>> =
            Arc::new(ResourceRegistry::new("test"));
        let loads = Arc::new(AtomicUsize::new(0));
        let drops = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = bounded::<()>(1);
        let (release_tx, release_rx) = bounded::<()>(1);

        let held = registry
            .acquire_or_create("held.wav".to_string(), loader_for(&loads, &drops))
            .unwrap();

        let slow = {
            let registry = registry.clone();
            let drops = drops.clone();
            thread::spawn(move || {
                registry
                    .acquire_or_create("slow.wav".to_string(), move |_| {
                        started_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok(Tracked { drops })
                    })
                    .unwrap()
            })
        };
        started_rx.recv().unwrap();

        // While the slow loader runs, other keys load and existing handles clone and drop.
        let (done_tx, done_rx) = bounded(1);
        let other = {
            let registry = registry.clone();
            let loads = loads.clone();
            let drops = drops.clone();
            thread::spawn(move || {
                let fast = registry
                    .acquire_or_create("fast.wav".to_string(), loader_for(&loads, &drops))
                    .unwrap();
                let copy = held.clone();
                drop(copy);
                drop(held);
                done_tx.send(fast.key().clone()).unwrap();
            })
        };
        assert_eq!(
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            "fast.wav"
        );
        other.join().unwrap();

        // Still loading, so not visible yet.
        assert!(!registry.contains(&"slow.wav".to_string()));
        assert_eq!(registry.ref_count(&"slow.wav".to_string()), 0);

        // A second caller for the loading key waits for that load instead of loading again.
        let waiter = {
            let registry = registry.clone();
            let loads = loads.clone();
            let drops = drops.clone();
            thread::spawn(move || {
                registry
                    .acquire_or_create("slow.wav".to_string(), loader_for(&loads, &drops))
                    .unwrap()
            })
        };

        release_tx.send(()).unwrap();
        let first = slow.join().unwrap();
        let second = waiter.join().unwrap();
        assert!(Arc::ptr_eq(first.payload(), second.payload()));
        assert_eq!(registry.ref_count(&"slow.wav".to_string()), 2);
        // Only held.wav and fast.wav went through the counting loader.
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_load_wakes_waiters() {
        let registry: Arc<ResourceRegistry<String, Tracked>> =
            Arc::new(ResourceRegistry::new("test"));
        let loads = Arc::new(AtomicUsize::new(0));
        let drops = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = bounded::<()>(1);
        let (release_tx, release_rx) = bounded::<()>(1);

        let failing = {
            let registry = registry.clone();
            thread::spawn(move || {
                registry
                    .acquire_or_create("bank.sf2".to_string(), move |_| {
                        started_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Err(ResourceLoadError::Other("corrupt".to_string()))
                    })
                    .is_err()
            })
        };
        started_rx.recv().unwrap();

        let waiter = {
            let registry = registry.clone();
            let loads = loads.clone();
            let drops = drops.clone();
            thread::spawn(move || {
                registry
                    .acquire_or_create("bank.sf2".to_string(), loader_for(&loads, &drops))
                    .unwrap()
            })
        };

        release_tx.send(()).unwrap();
        assert!(failing.join().unwrap());
        let handle = waiter.join().unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(registry.ref_count(handle.key()), 1);
    }
}
