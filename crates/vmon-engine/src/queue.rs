//! Bounded FIFO hand-off between the dispatcher and the worker pool.

use std::fmt;
use std::sync::{Condvar, Mutex};

/// Returned by [`TaskQueue::put`] when the queue is at capacity.
///
/// `put` never blocks: on a full queue it returns this error immediately and
/// leaves the queue state untouched. The element is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is full")
    }
}

impl std::error::Error for QueueFull {}

struct State<T> {
    slots: Vec<Option<T>>,
    head: usize,
    count: usize,
    waiters: usize,
}

/// A bounded, strictly-FIFO queue with non-blocking `put` and blocking `get`.
///
/// Backed by a fixed-capacity `Vec` ring rather than a linked structure —
/// `capacity` is fixed at construction and never grows.
pub struct TaskQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> TaskQueue<T> {
    /// Creates an empty queue holding at most `capacity` elements.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        TaskQueue {
            state: Mutex::new(State {
                slots,
                head: 0,
                count: 0,
                waiters: 0,
            }),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// The fixed capacity this queue was constructed with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Non-blocking enqueue. Fails with [`QueueFull`] without mutating state
    /// if the queue is already at capacity.
    pub fn put(&self, elem: T) -> Result<(), QueueFull> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.count == self.capacity {
            return Err(QueueFull);
        }
        let tail = (state.head + state.count) % self.capacity;
        state.slots[tail] = Some(elem);
        state.count += 1;
        let should_notify = state.waiters > 0;
        drop(state);
        if should_notify {
            self.not_empty.notify_one();
        }
        Ok(())
    }

    /// Blocking dequeue. Suspends on the non-empty condition while the queue
    /// is empty; returns the head element in FIFO order once available.
    pub fn get(&self) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while state.count == 0 {
            state.waiters += 1;
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
            state.waiters -= 1;
        }
        let head = state.head;
        let elem = state.slots[head].take().expect("head slot occupied");
        state.head = (head + 1) % self.capacity;
        state.count -= 1;
        elem
    }

    /// True if the queue currently holds no elements.
    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).count == 0
    }

    /// True if the queue is at capacity.
    pub fn is_full(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).count == self.capacity
    }

    /// Resets the queue to empty, dropping any queued elements.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for slot in &mut state.slots {
            *slot = None;
        }
        state.head = 0;
        state.count = 0;
    }
}
