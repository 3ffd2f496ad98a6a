// src/engine/queue.rs

use std::cmp::Ordering;
use std::fmt;

/// Comparator used to order a [`PriorityQueue`].
///
/// `Ordering::Less` means the left element leaves the queue first.
pub type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Binary heap ordered by an injected comparator.
///
/// Unlike `std::collections::BinaryHeap`, this supports removing and
/// replacing arbitrary elements by predicate. The heap invariant (no child
/// precedes its parent) is restored after every mutation, not only after a
/// root pop.
///
/// Semantics:
/// - `enqueue` / `dequeue` are `O(log n)`, `peek` is `O(1)`.
/// - `remove` / `update` locate the first match in storage order (`O(n)`)
///   and repair the heap around it (`O(log n)`).
/// - `to_sorted_vec` returns a fully ordered snapshot without draining.
pub struct PriorityQueue<T> {
    items: Vec<T>,
    cmp: Comparator<T>,
}

impl<T> fmt::Debug for PriorityQueue<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

impl<T: Ord + 'static> PriorityQueue<T> {
    /// Smallest element first.
    pub fn min_heap() -> Self {
        Self::new(|a: &T, b: &T| a.cmp(b))
    }

    /// Largest element first.
    pub fn max_heap() -> Self {
        Self::new(|a: &T, b: &T| b.cmp(a))
    }
}

impl<T> PriorityQueue<T> {
    pub fn new<F>(cmp: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        Self {
            items: Vec::new(),
            cmp: Box::new(cmp),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn enqueue(&mut self, item: T) {
        self.items.push(item);
        let last = self.items.len() - 1;
        self.sift_up(last);
    }

    /// Remove and return the element that should leave first.
    pub fn dequeue(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let top = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        top
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Remove the first element matching `pred`.
    pub fn remove<P>(&mut self, pred: P) -> Option<T>
    where
        P: Fn(&T) -> bool,
    {
        let idx = self.items.iter().position(pred)?;
        let last = self.items.len() - 1;
        self.items.swap(idx, last);
        let removed = self.items.pop();
        if idx < self.items.len() {
            self.repair(idx);
        }
        removed
    }

    /// Replace the first element matching `pred` with `value`.
    ///
    /// Returns `false` (and drops `value`) if nothing matched.
    pub fn update<P>(&mut self, pred: P, value: T) -> bool
    where
        P: Fn(&T) -> bool,
    {
        match self.items.iter().position(pred) {
            Some(idx) => {
                self.items[idx] = value;
                self.repair(idx);
                true
            }
            None => false,
        }
    }

    pub fn find<P>(&self, pred: P) -> Option<&T>
    where
        P: Fn(&T) -> bool,
    {
        self.items.iter().find(|item| pred(*item))
    }

    pub fn has<P>(&self, pred: P) -> bool
    where
        P: Fn(&T) -> bool,
    {
        self.items.iter().any(pred)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Elements in dequeue order, leaving the queue untouched.
    pub fn to_sorted_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        let mut out = self.items.clone();
        out.sort_by(|a, b| (self.cmp)(a, b));
        out
    }

    fn precedes(&self, a: usize, b: usize) -> bool {
        (self.cmp)(&self.items[a], &self.items[b]) == Ordering::Less
    }

    /// Restore the invariant around an element that may have moved either way.
    fn repair(&mut self, idx: usize) {
        if idx > 0 && self.precedes(idx, (idx - 1) / 2) {
            self.sift_up(idx);
        } else {
            self.sift_down(idx);
        }
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.precedes(idx, parent) {
                break;
            }
            self.items.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut best = idx;

            if left < len && self.precedes(left, best) {
                best = left;
            }
            if right < len && self.precedes(right, best) {
                best = right;
            }
            if best == idx {
                break;
            }
            self.items.swap(idx, best);
            idx = best;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<T>(q: &mut PriorityQueue<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(x) = q.dequeue() {
            out.push(x);
        }
        out
    }

    fn assert_heap<T>(q: &PriorityQueue<T>) {
        for idx in 1..q.items.len() {
            assert!(
                !q.precedes(idx, (idx - 1) / 2),
                "heap invariant broken at index {idx}"
            );
        }
    }

    #[test]
    fn min_heap_dequeues_ascending() {
        let mut q = PriorityQueue::min_heap();
        for x in [5, 3, 7, 1] {
            q.enqueue(x);
        }
        assert_eq!(drain(&mut q), vec![1, 3, 5, 7]);
    }

    #[test]
    fn max_heap_dequeues_descending() {
        let mut q = PriorityQueue::max_heap();
        for x in [5, 3, 7, 1] {
            q.enqueue(x);
        }
        assert_eq!(drain(&mut q), vec![7, 5, 3, 1]);
    }

    #[test]
    fn empty_queue() {
        let mut q: PriorityQueue<i32> = PriorityQueue::min_heap();
        assert_eq!(q.dequeue(), None);
        assert_eq!(q.peek(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn remove_keeps_heap_valid() {
        let mut q = PriorityQueue::min_heap();
        for x in [10, 4, 8, 1, 9, 2, 7, 3] {
            q.enqueue(x);
        }
        assert_eq!(q.remove(|&x| x == 4), Some(4));
        assert_eq!(q.remove(|&x| x == 42), None);
        assert_heap(&q);
        assert_eq!(drain(&mut q), vec![1, 2, 3, 7, 8, 9, 10]);
    }

    #[test]
    fn update_moves_element_both_ways() {
        let mut q = PriorityQueue::min_heap();
        for x in [10, 20, 30, 40, 50] {
            q.enqueue(x);
        }
        assert!(q.update(|&x| x == 50, 5));
        assert_heap(&q);
        assert_eq!(q.peek(), Some(&5));

        assert!(q.update(|&x| x == 5, 60));
        assert_heap(&q);
        assert!(!q.update(|&x| x == 99, 1));
        assert_eq!(drain(&mut q), vec![10, 20, 30, 40, 60]);
    }

    #[test]
    fn find_has_and_snapshot() {
        let mut q = PriorityQueue::new(|a: &(u32, &str), b: &(u32, &str)| b.0.cmp(&a.0));
        q.enqueue((1, "low"));
        q.enqueue((9, "high"));
        q.enqueue((5, "mid"));

        assert_eq!(q.find(|t| t.1 == "mid"), Some(&(5, "mid")));
        assert!(q.has(|t| t.0 == 9));
        assert!(!q.has(|t| t.0 == 2));
        assert_eq!(
            q.to_sorted_vec(),
            vec![(9, "high"), (5, "mid"), (1, "low")]
        );
        assert_eq!(q.len(), 3);

        q.clear();
        assert!(q.is_empty());
    }
}
