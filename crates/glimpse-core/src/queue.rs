//! Priority work queue with per-key uniqueness.
//!
//! A min-heap and the set of queued keys live behind one mutex, so the
//! two can never disagree. Lower priority numbers are served first; equal
//! priorities are served in submission order.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

struct Entry<T, K> {
    priority: i32,
    seq: u64,
    key: K,
    item: T,
}

impl<T, K> PartialEq for Entry<T, K> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T, K> Eq for Entry<T, K> {}

impl<T, K> PartialOrd for Entry<T, K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, K> Ord for Entry<T, K> {
    // BinaryHeap is a max-heap: invert so the smallest (priority, seq) pops first
    fn cmp(&self, other: &Self) -> Ordering {
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

struct Inner<T, K> {
    heap: BinaryHeap<Entry<T, K>>,
    keys: HashSet<K>,
    next_seq: u64,
}

/// Thread-safe priority queue holding at most one pending item per key.
pub struct UniqueWorkQueue<T, K> {
    inner: Mutex<Inner<T, K>>,
}

impl<T, K: Eq + Hash + Clone> Default for UniqueWorkQueue<T, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, K: Eq + Hash + Clone> UniqueWorkQueue<T, K> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                keys: HashSet::new(),
                next_seq: 0,
            }),
        }
    }

    // heap and keys are never left half-updated, so a poisoned lock is still consistent
    fn lock(&self) -> MutexGuard<'_, Inner<T, K>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue `item` unless `key` is already pending. Returns whether it was queued.
    pub fn try_enqueue(&self, item: T, key: K, priority: i32) -> bool {
        let mut inner = self.lock();
        if !inner.keys.insert(key.clone()) {
            return false;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Entry {
            priority,
            seq,
            key,
            item,
        });
        true
    }

    /// Remove the highest-priority item, releasing its key.
    ///
    /// # Panics
    ///
    /// If the dequeued key is not tracked, which means the queue itself is broken.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut inner = self.lock();
        let entry = inner.heap.pop()?;
        if !inner.keys.remove(&entry.key) {
            panic!("work queue desync: dequeued key was not tracked as queued");
        }
        Some(entry.item)
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Whether `key` is currently pending.
    pub fn contains(&self, key: &K) -> bool {
        self.lock().keys.contains(key)
    }
}
