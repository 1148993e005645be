//! Change-aware keyed cache.
//!
//! Owns the authoritative key → value mapping and a log of the mutations applied
//! since the last capture. [`ChangeAwareCache::capture_changes`] drains the log
//! as a [`ChangeSet`].
//!
//! # Example
//!
//! ```
//! use change_kit::cache::ChangeAwareCache;
//!
//! let mut cache = ChangeAwareCache::new();
//! cache.add_or_update("Alice", 1);
//! cache.add_or_update("Bob", 2);
//!
//! let changes = cache.capture_changes();
//! assert_eq!(changes.adds(), 2);
//!
//! // Nothing happened since the last capture
//! assert!(cache.capture_changes().is_empty());
//! ```

use crate::change::{Change, ChangeSet};
use std::collections::HashMap;
use std::hash::Hash;

/// Keyed cache that records every mutation until it is captured.
///
/// A key that is added and then removed between two captures leaves no trace
/// in the next change set.
#[derive(Debug, Clone)]
pub struct ChangeAwareCache<K, V> {
    data: HashMap<K, V>,
    // Tombstoned slots (`None`) are records cancelled before capture.
    pending: Vec<Option<Change<K, V>>>,
    // Keys added since the last capture, with the slot of their `Add` record.
    added: HashMap<K, usize>,
}

impl<K, V> ChangeAwareCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        ChangeAwareCache {
            data: HashMap::new(),
            pending: Vec::new(),
            added: HashMap::new(),
        }
    }

    /// Insert `value` under `key`, or replace the value already stored there.
    pub fn add_or_update(&mut self, value: V, key: K) {
        match self.data.get_mut(&key) {
            Some(stored) => {
                let previous = std::mem::replace(stored, value.clone());
                self.pending
                    .push(Some(Change::update(key, value, previous)));
            }
            None => {
                self.added.insert(key.clone(), self.pending.len());
                self.pending
                    .push(Some(Change::add(key.clone(), value.clone())));
                self.data.insert(key, value);
            }
        }
    }

    /// Remove `key`. Removing an absent key is a no-op.
    pub fn remove(&mut self, key: &K) {
        let Some((key, value)) = self.data.remove_entry(key) else {
            return;
        };

        match self.added.remove(&key) {
            // Added since the last capture: cancel everything recorded for it
            // from its `Add` onwards instead of reporting a removal.
            Some(start) => {
                for slot in &mut self.pending[start..] {
                    if slot.as_ref().is_some_and(|c| c.key == key) {
                        *slot = None;
                    }
                }
            }
            None => self.pending.push(Some(Change::remove(key, value))),
        }
    }

    /// Remove every key in `keys`.
    pub fn remove_many<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
    {
        for key in keys {
            self.remove(&key);
        }
    }

    /// Record a refresh for `key` without touching its value.
    pub fn refresh(&mut self, key: &K) {
        if let Some((key, value)) = self.data.get_key_value(key) {
            self.pending
                .push(Some(Change::refresh(key.clone(), value.clone())));
        }
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        let keys: Vec<K> = self.data.keys().cloned().collect();
        self.remove_many(keys);
    }

    /// Drain the pending log as a change set.
    pub fn capture_changes(&mut self) -> ChangeSet<K, V> {
        self.added.clear();
        self.pending.drain(..).flatten().collect()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.data.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.data.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<K, V> Default for ChangeAwareCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
