//! Size-limited, expiring change-aware cache.
//!
//! [`ExpiryCache`] decorates [`ChangeAwareCache`] with two policies:
//!
//! - **Size limit**: after each batch, entries beyond `limit_size_to` are
//!   evicted oldest-inserted first. Age is an insertion sequence number
//!   assigned once per key and kept across updates.
//! - **Expiry**: each value may get a deadline computed when it is added or
//!   updated. Keys are grouped by deadline so that one timer serves every key
//!   expiring at the same instant.
//!
//! This type is synchronous and owns no timers. It reports which deadlines a
//! mutation touched; the [`engine`](crate::engine) reconciles its timers
//! against [`ExpiryCache::has_deadline`].

use crate::cache::ChangeAwareCache;
use crate::change::ChangeSet;
use crate::strategy::SourceStrategy;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Maps a value to its key.
pub type KeySelector<V, K> = Arc<dyn Fn(&V) -> K + Send + Sync>;

/// Maps a value to its time-to-live. `None` means the value never expires.
pub type ExpirySelector<V> = Arc<dyn Fn(&V) -> Option<Duration> + Send + Sync>;

/// Cached value with its eviction and expiry bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpirableItem<K, V> {
    pub value: V,
    pub key: K,
    /// `None` = never expires.
    pub expire_at: Option<Instant>,
    /// Insertion sequence number, used for FIFO eviction.
    pub index: u64,
}

/// Result of applying one batch.
#[derive(Debug)]
pub struct Applied<K, V> {
    pub changes: ChangeSet<K, V>,
    /// Number of entries evicted by the size limit.
    pub evicted: usize,
    /// Deadlines whose key group was created, changed or emptied.
    pub touched: Vec<Instant>,
}

pub struct ExpiryCache<K, V> {
    cache: ChangeAwareCache<K, ExpirableItem<K, V>>,
    key_selector: KeySelector<V, K>,
    expire_after: Option<ExpirySelector<V>>,
    limit_size_to: usize,
    strategy: SourceStrategy,
    next_index: u64,
    deadlines: BTreeMap<Instant, HashSet<K>>,
}

impl<K, V> ExpiryCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(key_selector: KeySelector<V, K>) -> Self {
        ExpiryCache {
            cache: ChangeAwareCache::new(),
            key_selector,
            expire_after: None,
            limit_size_to: 0,
            strategy: SourceStrategy::default(),
            next_index: 0,
            deadlines: BTreeMap::new(),
        }
    }

    pub fn with_expiry(mut self, expire_after: Option<ExpirySelector<V>>) -> Self {
        self.expire_after = expire_after;
        self
    }

    /// Maximum number of entries. `0` means unbounded.
    pub fn with_limit(mut self, limit_size_to: usize) -> Self {
        self.limit_size_to = limit_size_to;
        self
    }

    pub fn with_strategy(mut self, strategy: SourceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Apply one upstream batch at instant `now` and capture the result.
    pub fn apply_batch(&mut self, batch: Vec<V>, now: Instant) -> Applied<K, V> {
        let mut touched = BTreeSet::new();

        if self.strategy == SourceStrategy::Replace {
            let incoming: HashSet<K> = batch.iter().map(|v| (self.key_selector)(v)).collect();
            let stale: Vec<K> = self
                .cache
                .keys()
                .filter(|k| !incoming.contains(*k))
                .cloned()
                .collect();
            for key in stale {
                self.remove_key(&key, &mut touched);
            }
        }

        for value in batch {
            let key = (self.key_selector)(&value);
            let expire_at = self
                .expire_after
                .as_ref()
                .and_then(|f| f(&value))
                // A deadline past the clock's range never arrives.
                .and_then(|ttl| now.checked_add(ttl));

            let existing = self.cache.get(&key).map(|e| (e.index, e.expire_at));
            let index = match existing {
                Some((index, previous_expiry)) => {
                    if previous_expiry != expire_at {
                        if let Some(at) = previous_expiry {
                            self.untrack(&key, at, &mut touched);
                        }
                    }
                    index
                }
                None => {
                    self.next_index += 1;
                    self.next_index
                }
            };

            if let Some(at) = expire_at {
                if self.deadlines.entry(at).or_default().insert(key.clone()) {
                    touched.insert(at);
                }
            }

            let item = ExpirableItem {
                value,
                key: key.clone(),
                expire_at,
                index,
            };
            self.cache.add_or_update(item, key);
        }

        let evicted = self.enforce_limit(&mut touched);

        Applied {
            changes: self.capture(),
            evicted,
            touched: touched.into_iter().collect(),
        }
    }

    /// Remove every key still scheduled to expire at `deadline`.
    pub fn expire(&mut self, deadline: Instant) -> ChangeSet<K, V> {
        if let Some(keys) = self.deadlines.remove(&deadline) {
            for key in keys {
                let due = self
                    .cache
                    .get(&key)
                    .is_some_and(|e| e.expire_at == Some(deadline));
                if due {
                    self.cache.remove(&key);
                }
            }
        }
        self.capture()
    }

    /// Drop every entry and deadline without reporting the removals.
    pub fn clear(&mut self) {
        self.deadlines.clear();
        self.cache.clear();
        self.cache.capture_changes();
    }

    /// Whether any key is still waiting on `deadline`.
    pub fn has_deadline(&self, deadline: &Instant) -> bool {
        self.deadlines.contains_key(deadline)
    }

    pub fn deadlines(&self) -> impl Iterator<Item = &Instant> {
        self.deadlines.keys()
    }

    pub fn get(&self, key: &K) -> Option<&ExpirableItem<K, V>> {
        self.cache.get(key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn enforce_limit(&mut self, touched: &mut BTreeSet<Instant>) -> usize {
        if self.limit_size_to == 0 || self.cache.len() <= self.limit_size_to {
            return 0;
        }

        let excess = self.cache.len() - self.limit_size_to;
        let mut by_age: Vec<(u64, K)> = self
            .cache
            .iter()
            .map(|(k, e)| (e.index, k.clone()))
            .collect();
        by_age.sort_unstable_by_key(|(index, _)| *index);

        for (_, key) in by_age.into_iter().take(excess) {
            self.remove_key(&key, touched);
        }
        excess
    }

    fn remove_key(&mut self, key: &K, touched: &mut BTreeSet<Instant>) {
        if let Some(at) = self.cache.get(key).and_then(|e| e.expire_at) {
            self.untrack(key, at, touched);
        }
        self.cache.remove(key);
    }

    fn untrack(&mut self, key: &K, at: Instant, touched: &mut BTreeSet<Instant>) {
        if let Some(keys) = self.deadlines.get_mut(&at) {
            keys.remove(key);
            if keys.is_empty() {
                self.deadlines.remove(&at);
            }
            touched.insert(at);
        }
    }

    fn capture(&mut self) -> ChangeSet<K, V> {
        self.cache.capture_changes().transform(|item| item.value)
    }
}
