//! Bounded FIFO of pending work.
//!
//! A mutex-protected deque with two wait queues: `not_full` stands in for
//! the free-slot semaphore and `not_empty` for the ready-item semaphore.
//! A full queue blocks the producer; a closed queue wakes every waiter and
//! rejects further producers.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::QueueError;

/// Capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
    high_water: usize,
}

pub struct BoundedTaskQueue<T> {
    state: Mutex<QueueState<T>>,
    /// Signalled whenever a slot frees up (or the queue closes).
    not_full: Condvar,
    /// Signalled whenever an item is appended (or the queue closes).
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedTaskQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                high_water: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `item`, blocking while the queue is at capacity.
    ///
    /// Returns the item back inside [`QueueError::Closed`] if the queue is
    /// closed before a slot becomes available.
    pub fn enqueue(&self, item: T) -> Result<(), QueueError<T>> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(QueueError::Closed(item));
            }
            if state.items.len() < self.capacity {
                break;
            }
            log::trace!(target: "dispatch::queue", "queue full ({}), producer waiting", self.capacity);
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Self::push(&mut state, item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Append `item` even if the queue is at capacity.
    ///
    /// Only the consumer may use this: it is the one thread that can never
    /// wait for a slot it alone would free.
    pub(crate) fn enqueue_unbounded(&self, item: T) -> Result<(), QueueError<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueError::Closed(item));
        }
        Self::push(&mut state, item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    fn push(state: &mut QueueState<T>, item: T) {
        state.items.push_back(item);
        state.high_water = state.high_water.max(state.items.len());
    }

    /// Remove and return the head, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop accepting items and wake every blocked producer and consumer.
    ///
    /// Items already queued stay queued. Returns `false` if the queue was
    /// already closed.
    pub fn close(&self) -> bool {
        let mut state = self.lock();
        let was_open = !state.closed;
        state.closed = true;
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
        was_open
    }

    /// Take every pending item out of the queue, oldest first.
    pub fn drain_pending(&self) -> Vec<T> {
        let mut state = self.lock();
        let drained: Vec<T> = state.items.drain(..).collect();
        drop(state);
        self.not_full.notify_all();
        drained
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest number of items ever pending at once.
    pub fn high_water(&self) -> usize {
        self.lock().high_water
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order() {
        let q = BoundedTaskQueue::new(4);
        for i in 0..4 {
            q.enqueue(i).unwrap();
        }
        let out: Vec<i32> = (0..4).map(|_| q.dequeue().unwrap()).collect();
        assert_eq!(out, vec![0, 1, 2, 3]);
        assert!(q.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let q = BoundedTaskQueue::<u8>::new(0);
        assert_eq!(q.capacity(), 1);
    }

    #[test]
    fn full_queue_blocks_producer_until_slot_frees() {
        let q = Arc::new(BoundedTaskQueue::new(1));
        q.enqueue(1).unwrap();

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                q.enqueue(2).unwrap();
                done_tx.send(()).unwrap();
            })
        };

        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(q.dequeue(), Some(1));
        done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(q.dequeue(), Some(2));
        producer.join().unwrap();
    }

    #[test]
    fn close_rejects_blocked_producer() {
        let q = Arc::new(BoundedTaskQueue::new(1));
        q.enqueue(1).unwrap();

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.enqueue(2))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(q.close());

        match producer.join().unwrap() {
            Err(e) => assert_eq!(e.into_inner(), 2),
            Ok(()) => panic!("producer should have been rejected"),
        }
        // Already-queued item is still delivered, then the consumer sees the end.
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn close_wakes_idle_consumer() {
        let q = Arc::new(BoundedTaskQueue::<u8>::new(2));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.dequeue())
        };
        thread::sleep(Duration::from_millis(50));
        q.close();
        assert_eq!(consumer.join().unwrap(), None);
        assert!(!q.close());
    }

    #[test]
    fn drain_pending_empties_in_order() {
        let q = BoundedTaskQueue::new(8);
        for i in 0..5 {
            q.enqueue(i).unwrap();
        }
        assert_eq!(q.high_water(), 5);
        assert_eq!(q.drain_pending(), vec![0, 1, 2, 3, 4]);
        assert!(q.is_empty());
        assert_eq!(q.high_water(), 5);
    }

    #[test]
    fn unbounded_enqueue_ignores_capacity_but_not_close() {
        let q = BoundedTaskQueue::new(1);
        q.enqueue(1).unwrap();
        q.enqueue_unbounded(2).unwrap();
        assert_eq!(q.len(), 2);
        q.close();
        assert!(q.enqueue_unbounded(3).is_err());
    }
}
