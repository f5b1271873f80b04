//! Binary min-heap ordered by `(sort_index, id)`.
//!
//! Only the root can be removed. Callers that need to drop an interior item
//! mark it inert and let the next `peek`/`pop` that reaches it discard it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

/// Anything that can sit in a [`MinHeap`].
pub trait HeapItem {
    fn sort_index(&self) -> f64;
    fn id(&self) -> u64;
}

impl<T: HeapItem + ?Sized> HeapItem for Rc<T> {
    fn sort_index(&self) -> f64 {
        (**self).sort_index()
    }

    fn id(&self) -> u64 {
        (**self).id()
    }
}

struct HeapEntry<T> {
    // Key captured at push time. Items are never re-keyed while inside.
    sort_index: f64,
    id: u64,
    item: T,
}

impl<T> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for HeapEntry<T> {}

impl<T> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap, so both comparisons are reversed.
        other
            .sort_index
            .total_cmp(&self.sort_index)
            .then_with(|| other.id.cmp(&self.id))
    }
}

pub struct MinHeap<T> {
    heap: BinaryHeap<HeapEntry<T>>,
}

impl<T: HeapItem> MinHeap<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, item: T) {
        self.heap.push(HeapEntry {
            sort_index: item.sort_index(),
            id: item.id(),
            item,
        });
    }

    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|entry| entry.item)
    }

    pub fn peek(&self) -> Option<&T> {
        self.heap.peek().map(|entry| &entry.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<T: HeapItem> Default for MinHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}
