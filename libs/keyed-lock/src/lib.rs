//! Keyed try-lock registry
//!
//! **Problem**: several callers may race to mutate the same row (edit, delete,
//! batch-delete). The storage layer keeps the final state consistent, but a
//! losing caller would still re-run its side effects (emails, audit events)
//! on top of the winner's.
//!
//! **Solution**: a process-wide registry of currently held keys. Acquisition
//! is a single non-blocking check-and-insert; a caller that finds its key
//! already held is rejected immediately instead of queueing.
//!
//! # Guarantees
//! - Exactly one holder per key at any instant (check-and-insert is atomic
//!   per map entry).
//! - `try_acquire` never blocks and performs no I/O; the critical section is
//!   one shard lock inside the map.
//! - Release is tied to [`KeyGuard`] drop, so it happens exactly once on
//!   every exit path, normal or error.
//! - The registry only ever contains keys that are held right now; released
//!   keys are removed, so the map does not accumulate history.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use tracing::trace;

/// Cloneable handle to a shared try-lock registry.
///
/// Clones share the same registry, so any clone can contend with any other.
///
/// # Example
/// ```rust
/// use keyed_lock::KeyedLock;
///
/// let locks: KeyedLock<String> = KeyedLock::new();
///
/// let guard = locks.try_acquire("post:42".to_string());
/// assert!(guard.is_some());
///
/// // Second attempt on the same key is rejected, not queued.
/// assert!(locks.try_acquire("post:42".to_string()).is_none());
///
/// drop(guard);
/// assert!(locks.try_acquire("post:42".to_string()).is_some());
/// ```
pub struct KeyedLock<K>
where
    K: Hash + Eq + Clone,
{
    held: Arc<DashMap<K, ()>>,
}

impl<K> KeyedLock<K>
where
    K: Hash + Eq + Clone + Display,
{
    pub fn new() -> Self {
        Self {
            held: Arc::new(DashMap::new()),
        }
    }

    /// Attempt to take the lock for `key` without waiting.
    ///
    /// Returns `Some(guard)` when the key was free; the key stays held until
    /// the guard is dropped. Returns `None` when another holder owns the key
    /// right now.
    ///
    /// # Thread Safety
    /// Safe to call from any number of tasks or threads concurrently; for a
    /// given key, exactly one of the simultaneous callers wins.
    pub fn try_acquire(&self, key: K) -> Option<KeyGuard<K>> {
        match self.held.entry(key.clone()) {
            Entry::Occupied(_) => {
                trace!(key = %key, "lock busy");
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(());
                trace!(key = %key, "lock acquired");
                Some(KeyGuard {
                    held: Arc::clone(&self.held),
                    key: Some(key),
                })
            }
        }
    }

    /// Whether `key` is held at this instant. Diagnostic only; the answer can
    /// change before the caller acts on it.
    pub fn is_held(&self, key: &K) -> bool {
        self.held.contains_key(key)
    }

    /// Number of keys currently held (for monitoring).
    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}

impl<K> Default for KeyedLock<K>
where
    K: Hash + Eq + Clone + Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for KeyedLock<K>
where
    K: Hash + Eq + Clone,
{
    fn clone(&self) -> Self {
        Self {
            held: Arc::clone(&self.held),
        }
    }
}

/// Holds one key in the registry; dropping it releases the key.
///
/// The guard owns an `Arc` to the registry, so it may be moved across task
/// and thread boundaries and held across `.await` points.
pub struct KeyGuard<K>
where
    K: Hash + Eq + Clone,
{
    held: Arc<DashMap<K, ()>>,
    key: Option<K>,
}

impl<K> KeyGuard<K>
where
    K: Hash + Eq + Clone,
{
    /// The key this guard holds.
    pub fn key(&self) -> &K {
        // Only taken in drop.
        self.key.as_ref().expect("guard key present until drop")
    }
}

impl<K> Drop for KeyGuard<K>
where
    K: Hash + Eq + Clone,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.held.remove(&key);
        }
    }
}
