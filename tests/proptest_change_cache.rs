//! Property-based tests for the change-aware cache and the expiry cache.
//!
//! # Properties Tested
//!
//! 1. **Replay Property**: replaying every captured set onto an empty map
//!    reproduces the cache exactly
//! 2. **Validity Property**: every record is legal against the state before
//!    it (no Add for a present key, no Update/Remove/Refresh for an absent one)
//! 3. **Cancellation Property**: a key absent both before and after a capture
//!    window appears in no record of that window
//! 4. **Size Property**: the expiry cache never exceeds its limit and keeps
//!    the most recently first-inserted keys

use change_kit::{ChangeAwareCache, ChangeReason, ChangeSet, ChangeSetAggregator, ExpiryCache};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Instant;

// ============================================================================
// Operations
// ============================================================================

#[derive(Clone, Debug)]
enum Op {
    AddOrUpdate(u8, i32),
    Remove(u8),
    Refresh(u8),
    Capture,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..8, any::<i32>()).prop_map(|(k, v)| Op::AddOrUpdate(k, v)),
        2 => (0u8..8).prop_map(Op::Remove),
        1 => (0u8..8).prop_map(Op::Refresh),
        1 => Just(Op::Capture),
    ]
}

/// Run `ops`, returning every captured set (a final capture included) and the
/// cache afterwards.
fn run(ops: &[Op]) -> (Vec<ChangeSet<u8, i32>>, ChangeAwareCache<u8, i32>) {
    let mut cache = ChangeAwareCache::new();
    let mut sets = Vec::new();

    for op in ops {
        match op {
            Op::AddOrUpdate(k, v) => cache.add_or_update(*v, *k),
            Op::Remove(k) => cache.remove(k),
            Op::Refresh(k) => cache.refresh(k),
            Op::Capture => sets.push(cache.capture_changes()),
        }
    }
    sets.push(cache.capture_changes());
    (sets, cache)
}

/// Capture, checking no key that was absent on both sides of the window
/// shows up in the captured set.
fn capture_checked(
    cache: &mut ChangeAwareCache<u8, i32>,
    before: &mut HashSet<u8>,
    touched: &mut HashSet<u8>,
) -> Result<(), TestCaseError> {
    let set = cache.capture_changes();
    let after: HashSet<u8> = cache.keys().copied().collect();
    for key in touched.iter() {
        if !before.contains(key) && !after.contains(key) {
            prop_assert!(
                set.iter().all(|c| c.key != *key),
                "Transient key {} was reported",
                key
            );
        }
    }
    *before = after;
    touched.clear();
    Ok(())
}

// ============================================================================
// Replay Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_replay_reproduces_cache(ops in prop::collection::vec(arb_op(), 0..200)) {
        let (sets, cache) = run(&ops);

        let mut view = ChangeSetAggregator::new();
        for set in &sets {
            view.apply(set);
        }

        let expected: HashMap<u8, i32> = cache.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(view.data(), &expected);
    }

    #[test]
    fn prop_records_are_valid_transitions(ops in prop::collection::vec(arb_op(), 0..200)) {
        let (sets, _) = run(&ops);
        let mut state: HashMap<u8, i32> = HashMap::new();

        for set in &sets {
            for change in set {
                let present = state.contains_key(&change.key);
                match change.reason {
                    ChangeReason::Add => {
                        prop_assert!(!present, "Add for present key {}", change.key);
                        prop_assert!(change.previous.is_none());
                        state.insert(change.key, change.current);
                    }
                    ChangeReason::Update => {
                        prop_assert!(present, "Update for absent key {}", change.key);
                        prop_assert_eq!(change.previous, state.get(&change.key).copied());
                        state.insert(change.key, change.current);
                    }
                    ChangeReason::Remove => {
                        prop_assert_eq!(state.remove(&change.key), Some(change.current));
                    }
                    ChangeReason::Refresh => {
                        prop_assert_eq!(state.get(&change.key), Some(&change.current));
                    }
                }
            }
        }
    }

    #[test]
    fn prop_transient_keys_leave_no_trace(ops in prop::collection::vec(arb_op(), 0..200)) {
        let mut cache = ChangeAwareCache::new();
        let mut before: HashSet<u8> = HashSet::new();
        let mut touched: HashSet<u8> = HashSet::new();

        for op in &ops {
            match op {
                Op::AddOrUpdate(k, v) => {
                    cache.add_or_update(*v, *k);
                    touched.insert(*k);
                }
                Op::Remove(k) => {
                    cache.remove(k);
                    touched.insert(*k);
                }
                Op::Refresh(k) => cache.refresh(k),
                Op::Capture => capture_checked(&mut cache, &mut before, &mut touched)?,
            }
        }
        capture_checked(&mut cache, &mut before, &mut touched)?;
    }
}

// ============================================================================
// Size Properties
// ============================================================================

fn arb_batches() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(0u8..32, 0..10), 1..30)
}

proptest! {
    #[test]
    fn prop_size_limit_keeps_newest(limit in 1usize..10, batches in arb_batches()) {
        let mut cache: ExpiryCache<u8, (u8, u32)> =
            ExpiryCache::new(Arc::new(|v: &(u8, u32)| v.0)).with_limit(limit);
        let now = Instant::now();

        // Present keys, oldest first insertion first
        let mut order: Vec<u8> = Vec::new();

        for (round, batch) in batches.iter().enumerate() {
            let values: Vec<(u8, u32)> = batch.iter().map(|k| (*k, round as u32)).collect();
            let applied = cache.apply_batch(values, now);

            for key in batch {
                if !order.contains(key) {
                    order.push(*key);
                }
            }
            let excess = order.len().saturating_sub(limit);
            order.drain(..excess);

            prop_assert!(cache.len() <= limit);
            prop_assert_eq!(cache.len(), order.len());
            prop_assert_eq!(applied.evicted, excess);
            for key in &order {
                prop_assert!(cache.get(key).is_some(), "Key {} should have survived", key);
            }
        }
    }
}
