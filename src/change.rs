//! Change records and change sets.
//!
//! A [`ChangeSet`] is the unit the engine emits: every mutation applied to the
//! cache between two captures, in application order. Replaying the sets of a
//! stream onto an empty map reconstructs the cache exactly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a change record was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeReason {
    /// Key was not present and has been inserted.
    Add,
    /// Key was present and its value has been replaced.
    Update,
    /// Key has been removed.
    Remove,
    /// Key is unchanged but downstream should re-evaluate it.
    Refresh,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeReason::Add => write!(f, "Add"),
            ChangeReason::Update => write!(f, "Update"),
            ChangeReason::Remove => write!(f, "Remove"),
            ChangeReason::Refresh => write!(f, "Refresh"),
        }
    }
}

/// A single typed mutation, keyed by identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change<K, V> {
    pub reason: ChangeReason,
    pub key: K,
    /// Value after the change (for `Remove`, the value that was removed).
    pub current: V,
    /// Value before the change. Only set for `Update`.
    pub previous: Option<V>,
}

impl<K, V> Change<K, V> {
    pub fn add(key: K, value: V) -> Self {
        Change {
            reason: ChangeReason::Add,
            key,
            current: value,
            previous: None,
        }
    }

    pub fn update(key: K, current: V, previous: V) -> Self {
        Change {
            reason: ChangeReason::Update,
            key,
            current,
            previous: Some(previous),
        }
    }

    pub fn remove(key: K, value: V) -> Self {
        Change {
            reason: ChangeReason::Remove,
            key,
            current: value,
            previous: None,
        }
    }

    pub fn refresh(key: K, value: V) -> Self {
        Change {
            reason: ChangeReason::Refresh,
            key,
            current: value,
            previous: None,
        }
    }

    /// Map the carried values, keeping reason and key.
    pub fn transform<U, F>(self, mut f: F) -> Change<K, U>
    where
        F: FnMut(V) -> U,
    {
        Change {
            reason: self.reason,
            key: self.key,
            current: f(self.current),
            previous: self.previous.map(f),
        }
    }
}

/// Per-reason record counts of one or more change sets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub adds: usize,
    pub updates: usize,
    pub removes: usize,
    pub refreshes: usize,
}

impl ChangeSummary {
    pub fn total(&self) -> usize {
        self.adds + self.updates + self.removes + self.refreshes
    }

    /// Accumulate another summary into this one.
    pub fn merge(&mut self, other: &ChangeSummary) {
        self.adds += other.adds;
        self.updates += other.updates;
        self.removes += other.removes;
        self.refreshes += other.refreshes;
    }
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} ~{} -{} !{}",
            self.adds, self.updates, self.removes, self.refreshes
        )
    }
}

/// Ordered batch of change records produced by one capture.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet<K, V> {
    changes: Vec<Change<K, V>>,
}

impl<K, V> ChangeSet<K, V> {
    pub fn new() -> Self {
        ChangeSet {
            changes: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ChangeSet {
            changes: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, change: Change<K, V>) {
        self.changes.push(change);
    }

    /// Append every record of `other`, preserving its order after ours.
    pub fn append(&mut self, other: ChangeSet<K, V>) {
        self.changes.extend(other.changes);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change<K, V>> {
        self.changes.iter()
    }

    pub fn adds(&self) -> usize {
        self.count(ChangeReason::Add)
    }

    pub fn updates(&self) -> usize {
        self.count(ChangeReason::Update)
    }

    pub fn removes(&self) -> usize {
        self.count(ChangeReason::Remove)
    }

    pub fn refreshes(&self) -> usize {
        self.count(ChangeReason::Refresh)
    }

    fn count(&self, reason: ChangeReason) -> usize {
        self.changes.iter().filter(|c| c.reason == reason).count()
    }

    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        for change in &self.changes {
            match change.reason {
                ChangeReason::Add => summary.adds += 1,
                ChangeReason::Update => summary.updates += 1,
                ChangeReason::Remove => summary.removes += 1,
                ChangeReason::Refresh => summary.refreshes += 1,
            }
        }
        summary
    }

    /// Map every carried value, e.g. to unwrap cache bookkeeping.
    pub fn transform<U, F>(self, mut f: F) -> ChangeSet<K, U>
    where
        F: FnMut(V) -> U,
    {
        ChangeSet {
            changes: self
                .changes
                .into_iter()
                .map(|c| c.transform(&mut f))
                .collect(),
        }
    }
}

impl<K, V> Default for ChangeSet<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> From<Vec<Change<K, V>>> for ChangeSet<K, V> {
    fn from(changes: Vec<Change<K, V>>) -> Self {
        ChangeSet { changes }
    }
}

impl<K, V> FromIterator<Change<K, V>> for ChangeSet<K, V> {
    fn from_iter<I: IntoIterator<Item = Change<K, V>>>(iter: I) -> Self {
        ChangeSet {
            changes: iter.into_iter().collect(),
        }
    }
}

impl<K, V> IntoIterator for ChangeSet<K, V> {
    type Item = Change<K, V>;
    type IntoIter = std::vec::IntoIter<Change<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a, K, V> IntoIterator for &'a ChangeSet<K, V> {
    type Item = &'a Change<K, V>;
    type IntoIter = std::slice::Iter<'a, Change<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_set_counts() {
        let changes: ChangeSet<&str, i32> = vec![
            Change::add("a", 1),
            Change::update("a", 2, 1),
            Change::remove("b", 7),
            Change::refresh("c", 3),
            Change::add("d", 4),
        ]
        .into();

        assert_eq!(changes.len(), 5);
        assert_eq!(changes.adds(), 2);
        assert_eq!(changes.updates(), 1);
        assert_eq!(changes.removes(), 1);
        assert_eq!(changes.refreshes(), 1);

        let summary = changes.summary();
        assert_eq!(summary.total(), 5);
        assert_eq!(summary.to_string(), "+2 ~1 -1 !1");
    }

    #[test]
    fn test_transform_maps_current_and_previous() {
        let change = Change::update("k", 2, 1).transform(|v| v * 10);
        assert_eq!(change.current, 20);
        assert_eq!(change.previous, Some(10));
        assert_eq!(change.reason, ChangeReason::Update);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut first: ChangeSet<&str, i32> = vec![Change::add("a", 1)].into();
        let second: ChangeSet<&str, i32> = vec![Change::add("b", 2), Change::remove("a", 1)].into();

        first.append(second);

        let keys: Vec<_> = first.iter().map(|c| c.key).collect();
        assert_eq!(keys, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_change_set_json() {
        let changes: ChangeSet<String, i32> = vec![Change::add("a".to_string(), 1)].into();
        let json = serde_json::to_string(&changes).expect("Failed to serialize");
        assert_eq!(
            json,
            r#"[{"reason":"Add","key":"a","current":1,"previous":null}]"#
        );

        let back: ChangeSet<String, i32> = serde_json::from_str(&json).expect("Failed to parse");
        assert_eq!(back, changes);
    }

    #[test]
    fn test_summary_merge() {
        let mut total = ChangeSummary::default();
        total.merge(&ChangeSummary {
            adds: 2,
            updates: 1,
            removes: 0,
            refreshes: 0,
        });
        total.merge(&ChangeSummary {
            adds: 1,
            updates: 0,
            removes: 3,
            refreshes: 1,
        });
        assert_eq!(total.adds, 3);
        assert_eq!(total.removes, 3);
        assert_eq!(total.total(), 8);
    }
}
