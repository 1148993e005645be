//! Consumer-side aggregation of change streams.
//!
//! [`ChangeSetAggregator`] replays change sets onto a plain map, keeping every
//! message it saw. It is what a downstream materialized view looks like in its
//! simplest form, and what the tests use to observe an engine.

use crate::change::{ChangeReason, ChangeSet, ChangeSummary};
use crate::engine::ChangeSetStream;
use crate::error::Error;
use futures::StreamExt;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;

/// Materialized view of a change stream.
#[derive(Debug, Clone)]
pub struct ChangeSetAggregator<K, V> {
    data: HashMap<K, V>,
    messages: Vec<ChangeSet<K, V>>,
    summary: ChangeSummary,
    error: Option<Error>,
    completed: bool,
}

impl<K, V> ChangeSetAggregator<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        ChangeSetAggregator {
            data: HashMap::new(),
            messages: Vec::new(),
            summary: ChangeSummary::default(),
            error: None,
            completed: false,
        }
    }

    /// Replay `changes` onto the view and record the message.
    pub fn apply(&mut self, changes: &ChangeSet<K, V>) {
        for change in changes {
            match change.reason {
                ChangeReason::Add | ChangeReason::Update => {
                    self.data.insert(change.key.clone(), change.current.clone());
                }
                ChangeReason::Remove => {
                    self.data.remove(&change.key);
                }
                ChangeReason::Refresh => {}
            }
        }
        self.summary.merge(&changes.summary());
        self.messages.push(changes.clone());
    }

    pub fn data(&self) -> &HashMap<K, V> {
        &self.data
    }

    pub fn messages(&self) -> &[ChangeSet<K, V>] {
        &self.messages
    }

    /// Totals per reason across every message.
    pub fn summary(&self) -> ChangeSummary {
        self.summary
    }

    /// Terminal error of the stream, if it failed.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Whether the stream has ended, successfully or not.
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl<K, V> ChangeSetAggregator<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Drain `stream` on a task into a shared aggregator.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(mut stream: ChangeSetStream<K, V>) -> AggregatorHandle<K, V> {
        let shared = Arc::new(Mutex::new(ChangeSetAggregator::new()));
        let inner = shared.clone();

        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let mut aggregator = lock(&inner);
                match item {
                    Ok(changes) => aggregator.apply(&changes),
                    Err(e) => aggregator.error = Some(e),
                }
            }
            lock(&inner).completed = true;
        });

        AggregatorHandle {
            inner: shared,
            task: task.abort_handle(),
        }
    }
}

impl<K, V> Default for ChangeSetAggregator<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared view of an aggregator fed by a background task.
#[derive(Clone)]
pub struct AggregatorHandle<K, V> {
    inner: Arc<Mutex<ChangeSetAggregator<K, V>>>,
    task: AbortHandle,
}

impl<K, V> AggregatorHandle<K, V> {
    /// Run `f` against the current state of the aggregator.
    pub fn with<R>(&self, f: impl FnOnce(&ChangeSetAggregator<K, V>) -> R) -> R {
        f(&lock(&self.inner))
    }

    pub fn message_count(&self) -> usize {
        self.with(|a| a.messages.len())
    }

    pub fn len(&self) -> usize {
        self.with(|a| a.data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> ChangeSummary {
        self.with(|a| a.summary)
    }

    pub fn error(&self) -> Option<Error> {
        self.with(|a| a.error.clone())
    }

    pub fn is_completed(&self) -> bool {
        self.with(|a| a.completed)
    }

    /// Stop draining. Dropping the stream cancels it.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl<K, V> AggregatorHandle<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn get(&self, key: &K) -> Option<V> {
        self.with(|a| a.data.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Change;

    #[test]
    fn test_apply_replays_changes() {
        let mut aggregator = ChangeSetAggregator::new();

        aggregator.apply(&vec![Change::add("a", 1), Change::add("b", 2)].into());
        aggregator.apply(&vec![Change::update("a", 10, 1), Change::remove("b", 2)].into());
        aggregator.apply(&vec![Change::refresh("a", 10)].into());

        assert_eq!(aggregator.data().len(), 1);
        assert_eq!(aggregator.data().get("a"), Some(&10));
        assert_eq!(aggregator.messages().len(), 3);

        let summary = aggregator.summary();
        assert_eq!(summary.adds, 2);
        assert_eq!(summary.updates, 1);
        assert_eq!(summary.removes, 1);
        assert_eq!(summary.refreshes, 1);
        assert!(aggregator.error().is_none());
        assert!(!aggregator.is_completed());
    }
}
