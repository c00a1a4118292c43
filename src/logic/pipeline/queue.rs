//! Bounded Queue
//!
//! Fixed-capacity hand-off between pipeline stages. When full, the oldest
//! item is evicted so producers never block; evictions are counted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use parking_lot::{Condvar, Mutex};

use crate::logic::window::FeatureRecord;

/// Records waiting for the decision worker
pub type FeatureQueue = BoundedQueue<FeatureRecord>;

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Outcome of a timed pop
#[derive(Debug, PartialEq)]
pub enum Pop<T> {
    Item(T),
    /// Nothing arrived within the timeout
    Empty,
    /// Closed and fully drained
    Closed,
}

pub struct BoundedQueue<T> {
    name: &'static str,
    capacity: usize,
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.max(1)),
                closed: false,
            }),
            not_empty: Condvar::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue, evicting the oldest item when full. Returns the evicted item.
    /// Items pushed after `close` are discarded.
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut state = self.state.lock();
            if state.closed {
                log::debug!("{} queue closed, discarding item", self.name);
                return None;
            }
            let evicted = if state.items.len() >= self.capacity {
                state.items.pop_front()
            } else {
                None
            };
            state.items.push_back(item);
            evicted
        };
        self.not_empty.notify_one();

        if evicted.is_some() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            log::warn!("{} queue full ({}), dropped oldest item (total dropped: {})", self.name, self.capacity, total);
        }
        evicted
    }

    /// Wait up to `timeout` for an item
    pub fn pop_timeout(&self, timeout: Duration) -> Pop<T> {
        let mut state = self.state.lock();
        if state.items.is_empty() && !state.closed {
            self.not_empty.wait_for(&mut state, timeout);
        }

        match state.items.pop_front() {
            Some(item) => Pop::Item(item),
            None if state.closed => Pop::Closed,
            None => Pop::Empty,
        }
    }

    /// Stop accepting items; consumers drain what is left, then see `Closed`
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_drop_oldest_when_full() {
        let q = BoundedQueue::new("test", 3);
        for i in 0..3 {
            assert_eq!(q.push(i), None);
        }
        assert_eq!(q.push(3), Some(0));
        assert_eq!(q.push(4), Some(1));
        assert_eq!(q.dropped(), 2);

        let drained: Vec<i32> = std::iter::from_fn(|| match q.pop_timeout(Duration::ZERO) {
            Pop::Item(i) => Some(i),
            _ => None,
        })
        .collect();
        assert_eq!(drained, vec![2, 3, 4]);
    }

    #[test]
    fn test_close_drains_then_reports_closed() {
        let q = BoundedQueue::new("test", 4);
        q.push("a");
        q.close();
        assert_eq!(q.push("late"), None);

        assert_eq!(q.pop_timeout(Duration::from_millis(10)), Pop::Item("a"));
        assert_eq!(q.pop_timeout(Duration::from_millis(10)), Pop::Closed);
    }

    #[test]
    fn test_empty_times_out() {
        let q: BoundedQueue<u8> = BoundedQueue::new("test", 1);
        assert_eq!(q.pop_timeout(Duration::from_millis(5)), Pop::Empty);
    }

    #[test]
    fn test_consumer_wakes_on_push() {
        let q = Arc::new(BoundedQueue::new("test", 8));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut got = Vec::new();
                loop {
                    match q.pop_timeout(Duration::from_millis(50)) {
                        Pop::Item(i) => got.push(i),
                        Pop::Empty => continue,
                        Pop::Closed => break,
                    }
                }
                got
            })
        };

        for i in 0..5 {
            q.push(i);
        }
        q.close();
        assert_eq!(consumer.join().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
