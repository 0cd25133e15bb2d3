use anyhow::{Result, bail};
use std::collections::HashMap;
use std::hash::Hash;

/// Entry stored in the heap: a priority, the carried item, and the key the
/// entry is addressable by.
#[derive(Debug, Clone)]
pub struct HeapEntry<V, K> {
    pub priority: f64,
    pub item: V,
    pub key: K,
}

/// Binary min-heap with O(log n) decrease-key.
///
/// A `key → heap index` map is kept in sync with every swap, which makes
/// `contains`/`get` O(1) and priority updates O(log n). Ordering is
/// strict-less-than on priority; entries with equal priority keep their
/// relative positions.
#[derive(Debug, Default)]
pub struct IndexedPriorityQueue<V, K: Hash + Eq + Copy> {
    heap: Vec<HeapEntry<V, K>>,
    positions: HashMap<K, usize>,
}

impl<V, K: Hash + Eq + Copy> IndexedPriorityQueue<V, K> {
    pub fn new() -> Self {
        Self {
            heap: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.positions.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&HeapEntry<V, K>> {
        self.positions.get(key).map(|&pos| &self.heap[pos])
    }

    /// Insert a new entry. The key must not already be present.
    pub fn put(&mut self, key: K, item: V, priority: f64) -> Result<()> {
        if self.contains(&key) {
            bail!("key already present in priority queue");
        }
        self.heap.push(HeapEntry {
            priority,
            item,
            key,
        });
        self.positions.insert(key, self.heap.len() - 1);
        self.sift_up(self.heap.len() - 1);
        Ok(())
    }

    /// Replace the item and priority of an existing entry, rebalancing in
    /// whichever direction the priority moved.
    pub fn update(&mut self, key: K, item: V, priority: f64) -> Result<()> {
        let Some(&pos) = self.positions.get(&key) else {
            bail!("key not present in priority queue");
        };
        let old_priority = self.heap[pos].priority;
        self.heap[pos] = HeapEntry {
            priority,
            item,
            key,
        };
        if priority < old_priority {
            self.sift_up(pos);
        } else {
            self.sift_down(pos);
        }
        Ok(())
    }

    /// Insert the entry, or lower an existing entry's priority. A present
    /// entry is only touched when the new priority is strictly less.
    pub fn update_if_less(&mut self, key: K, item: V, priority: f64) {
        match self.get(&key).map(|entry| entry.priority) {
            Some(current) => {
                if current > priority {
                    // Key is present, so update cannot fail.
                    let _ = self.update(key, item, priority);
                }
            }
            None => {
                let _ = self.put(key, item, priority);
            }
        }
    }

    /// Remove and return the minimum-priority entry.
    pub fn pop(&mut self) -> Option<HeapEntry<V, K>> {
        if self.heap.is_empty() {
            return None;
        }
        let head = self.heap.swap_remove(0);
        self.positions.remove(&head.key);
        if !self.heap.is_empty() {
            self.positions.insert(self.heap[0].key, 0);
            self.sift_down(0);
        }
        Some(head)
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) >> 1;
            if self.heap[pos].priority < self.heap[parent].priority {
                self.swap(pos, parent);
                pos = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let end = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            if left >= end {
                break;
            }
            let right = left + 1;
            // Pick the smaller child; ties go right, matching sift-up's
            // strict comparison so equal priorities never reorder.
            let child = if right < end && !(self.heap[left].priority < self.heap[right].priority)
            {
                right
            } else {
                left
            };
            if self.heap[child].priority >= self.heap[pos].priority {
                break;
            }
            self.swap(pos, child);
            pos = child;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.positions.insert(self.heap[a].key, a);
        self.positions.insert(self.heap[b].key, b);
    }
}
