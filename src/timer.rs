//! Indexed min-heap idle-connection timer, keyed by fd. Mirrors
//! `examples/original_source/code/timer/heaptimer.{h,cpp}`'s shape (vector
//! heap + id-to-index map maintained through every swap), with the swap-bug
//! fix called for in the spec's Design Notes: `SwapNode_` must write
//! `ref_[heap[i].id] = i` and `ref_[heap[j].id] = j`, not `i` twice.

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub type ConnId = i32;

struct Node {
    id: ConnId,
    expires: Instant,
}

/// Binary min-heap of timeout nodes ordered by expiry, with an `id -> index`
/// map so arbitrary nodes can be adjusted or removed in O(log n).
///
/// Callback is deliberately not stored here (unlike the original, which
/// closes over a raw connection pointer) — the spec's id-addressed
/// indirection redesign: `tick`/`do_work` only return the expired ids, and
/// the reactor looks up and closes the connection itself.
pub struct TimerHeap {
    heap: Vec<Node>,
    index: HashMap<ConnId, usize>,
}

impl Default for TimerHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerHeap {
    pub fn new() -> Self {
        Self {
            heap: Vec::with_capacity(64),
            index: HashMap::with_capacity(64),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Insert a new node, or if `id` already has one, overwrite its expiry
    /// and re-settle it in place.
    pub fn add(&mut self, id: ConnId, timeout: Duration) {
        let expires = Instant::now() + timeout;
        if let Some(&i) = self.index.get(&id) {
            self.heap[i].expires = expires;
            if !self.sift_down(i) {
                self.sift_up(i);
            }
            return;
        }
        let i = self.heap.len();
        self.heap.push(Node { id, expires });
        self.index.insert(id, i);
        self.sift_up(i);
    }

    /// Extend an existing node's deadline. Callers only ever extend, so a
    /// sift-down is sufficient (the expiry only grows).
    pub fn adjust(&mut self, id: ConnId, timeout: Duration) {
        if let Some(&i) = self.index.get(&id) {
            self.heap[i].expires = Instant::now() + timeout;
            self.sift_down(i);
        }
    }

    /// Remove `id` immediately, independent of expiry, returning whether it
    /// was present. The spec's `do_work` callback-invocation step is the
    /// reactor's responsibility now; this just drops the node.
    pub fn remove(&mut self, id: ConnId) -> bool {
        match self.index.get(&id).copied() {
            Some(i) => {
                self.delete_at(i);
                true
            }
            None => false,
        }
    }

    pub fn pop(&mut self) {
        if !self.heap.is_empty() {
            self.delete_at(0);
        }
    }

    /// Remove and return the ids of every node whose expiry has passed.
    pub fn tick(&mut self) -> Vec<ConnId> {
        let now = Instant::now();
        let mut expired = Vec::new();
        while let Some(node) = self.heap.first() {
            if node.expires > now {
                break;
            }
            expired.push(node.id);
            self.pop();
        }
        expired
    }

    /// Drain expired nodes, then report milliseconds until the next
    /// deadline, or `None` if the heap is empty (caller should block
    /// indefinitely on the multiplexer).
    pub fn next_tick_ms(&mut self) -> (Vec<ConnId>, Option<i64>) {
        let expired = self.tick();
        let wait = self.heap.first().map(|node| {
            let now = Instant::now();
            if node.expires > now {
                (node.expires - now).as_millis() as i64
            } else {
                0
            }
        });
        (expired, wait)
    }

    fn delete_at(&mut self, i: usize) {
        let last = self.heap.len() - 1;
        self.swap_nodes(i, last);
        let removed = self.heap.pop().expect("delete_at called on empty heap");
        self.index.remove(&removed.id);
        if i < self.heap.len() && !self.sift_down(i) {
            self.sift_up(i);
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        // Signed arithmetic so the i == 0 termination check below is exact;
        // an unsigned `(i - 1) / 2` would wrap instead of stopping at the root.
        while i > 0 {
            let parent = (i as isize - 1) / 2;
            let parent = parent as usize;
            if self.heap[parent].expires <= self.heap[i].expires {
                break;
            }
            self.swap_nodes(i, parent);
            i = parent;
        }
    }

    /// Returns whether the node at `i` moved.
    fn sift_down(&mut self, mut i: usize) -> bool {
        let start = i;
        let n = self.heap.len();
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < n && self.heap[left].expires < self.heap[smallest].expires {
                smallest = left;
            }
            if right < n && self.heap[right].expires < self.heap[smallest].expires {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap_nodes(i, smallest);
            i = smallest;
        }
        i != start
    }

    fn swap_nodes(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.index.insert(self.heap[i].id, i);
        self.index.insert(self.heap[j].id, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_expiry_order() {
        let mut t = TimerHeap::new();
        t.add(3, Duration::from_millis(30));
        t.add(1, Duration::from_millis(10));
        t.add(2, Duration::from_millis(20));

        std::thread::sleep(Duration::from_millis(35));
        let expired = t.tick();
        assert_eq!(expired, vec![1, 2, 3]);
        assert!(t.is_empty());
    }

    #[test]
    fn adjust_extends_deadline_and_keeps_index_integrity() {
        let mut t = TimerHeap::new();
        t.add(1, Duration::from_millis(5));
        t.add(2, Duration::from_millis(100));
        t.adjust(1, Duration::from_millis(200));

        for id in [1i32, 2] {
            let i = t.index[&id];
            assert_eq!(t.heap[i].id, id);
        }
        // id 1 now expires later than id 2, so the heap root must be id 2.
        assert_eq!(t.heap[0].id, 2);
    }

    #[test]
    fn remove_drops_node_without_firing_it() {
        let mut t = TimerHeap::new();
        t.add(1, Duration::from_millis(5));
        t.add(2, Duration::from_millis(5));
        assert!(t.remove(1));
        assert!(!t.index.contains_key(&1));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn heap_order_holds_after_many_mixed_operations() {
        let mut t = TimerHeap::new();
        for id in 0..50 {
            t.add(id, Duration::from_millis(10 + (id as u64 * 7) % 53));
        }
        for id in (0..50).step_by(3) {
            t.remove(id);
        }
        // quiescence check: every remaining id maps back to itself.
        for (&id, &i) in t.index.iter() {
            assert_eq!(t.heap[i].id, id);
        }
        for i in 0..t.heap.len() {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            if left < t.heap.len() {
                assert!(t.heap[i].expires <= t.heap[left].expires);
            }
            if right < t.heap.len() {
                assert!(t.heap[i].expires <= t.heap[right].expires);
            }
        }
    }
}
