//! Bounded top-k selector used by both layer search and collection-level
//! nearest-neighbor queries.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::node::NodeId;

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: NodeId,
    distance: f64,
}

impl Entry {
    fn key(&self) -> f64 {
        self.distance
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `BinaryHeap` is a max-heap; ordering by `distance` directly keeps the
/// farthest candidate at the root, which is exactly what bounded top-k
/// eviction needs. NaN distances sort as greater than everything else so
/// a NaN entry is always the first evicted rather than silently poisoning
/// comparisons.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key()
            .partial_cmp(&other.key())
            .unwrap_or(Ordering::Greater)
    }
}

/// Retains the `k` nearest `(NodeId, distance)` pairs pushed into it,
/// smaller distance meaning closer.
///
/// A plain `BinaryHeap` ordered so the single farthest admitted candidate
/// sits at the root, evicted the moment a strictly closer one arrives once
/// the heap is full.
#[derive(Debug, Clone)]
pub struct KClosest {
    capacity: usize,
    heap: BinaryHeap<Entry>,
}

impl KClosest {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// The distance of the farthest admitted candidate, i.e. the current
    /// eviction threshold once the heap is full.
    pub fn worst_distance(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.distance)
    }

    /// Admits `id` at `distance` while under capacity; once full, admits
    /// it only if strictly closer than the current farthest admitted
    /// candidate, evicting that candidate to make room. Ties lose: an
    /// incoming candidate equal to the current worst is rejected.
    pub fn push(&mut self, id: NodeId, distance: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.heap.len() < self.capacity {
            self.heap.push(Entry { id, distance });
            return;
        }
        if let Some(worst) = self.heap.peek() {
            if distance < worst.distance {
                self.heap.pop();
                self.heap.push(Entry { id, distance });
            }
        }
    }

    /// Drains the selector, nearest-first.
    pub fn into_sorted(self) -> Vec<(NodeId, f64)> {
        let mut entries: Vec<Entry> = self.heap.into_vec();
        entries.sort_by(|a, b| a.key().partial_cmp(&b.key()).unwrap_or(Ordering::Equal));
        entries.into_iter().map(|e| (e.id, e.distance)).collect()
    }

    /// Pops farthest-first: the root of a max-heap is the largest/farthest
    /// element.
    pub fn pop_farthest(&mut self) -> Option<(NodeId, f64)> {
        self.heap.pop().map(|e| (e.id, e.distance))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.heap.iter().map(|e| (e.id, e.distance))
    }
}
