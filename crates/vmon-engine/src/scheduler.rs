//! A standalone timer service running on its own dedicated thread.
//!
//! Used to enforce per-task timeouts (§4.3) and, optionally, periodic
//! self-polling. Always standalone: unlike the original's GLib-backed
//! scheduler, there is no mode where it piggy-backs on a caller-owned event
//! loop — see design note on scheduler/event-loop fusion.

use std::collections::{BinaryHeap, HashMap};
use std::cmp::Reverse;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Identifies a scheduled timer, returned by [`Scheduler::add`].
pub type TimerId = u64;

type Callback = Box<dyn FnMut() -> bool + Send>;

struct Entry {
    delay: Duration,
    callback: Callback,
}

struct Inner {
    entries: HashMap<TimerId, Entry>,
    heap: BinaryHeap<Reverse<(Instant, TimerId)>>,
    next_id: TimerId,
    stopping: bool,
}

/// A timer service: schedule delayed one-shot (or self-rearming) callbacks.
///
/// Callbacks execute on the scheduler's own thread, never on the caller's.
pub struct Scheduler {
    inner: Arc<Mutex<Inner>>,
    wake: Arc<Condvar>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Builds a scheduler. The timer thread is not started until [`Scheduler::start`].
    pub fn new() -> Self {
        Scheduler {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                heap: BinaryHeap::new(),
                next_id: 1,
                stopping: false,
            })),
            wake: Arc::new(Condvar::new()),
            thread: Mutex::new(None),
        }
    }

    /// Spawns the dedicated timer thread.
    pub fn start(&self) {
        let inner = self.inner.clone();
        let wake = self.wake.clone();
        let handle = std::thread::Builder::new()
            .name("vmon-scheduler".into())
            .spawn(move || run_loop(inner, wake))
            .expect("failed to spawn scheduler thread");
        *self.thread.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Schedules `callback` to fire no earlier than `delay` from now.
    ///
    /// If `callback` returns `true`, the scheduler re-arms it with the same
    /// delay (periodic behavior). Returns the id used by [`Scheduler::remove`].
    pub fn add(&self, delay: Duration, callback: impl FnMut() -> bool + Send + 'static) -> TimerId {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = inner.next_id;
        inner.next_id += 1;
        let deadline = Instant::now() + delay;
        inner.heap.push(Reverse((deadline, id)));
        inner.entries.insert(
            id,
            Entry {
                delay,
                callback: Box::new(callback),
            },
        );
        drop(inner);
        self.wake.notify_one();
        id
    }

    /// Cancels a timer. Safe to call after the timer has already fired (a
    /// no-op in that case) or with an unknown id.
    pub fn remove(&self, id: TimerId) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.remove(&id);
    }

    /// Stops the loop. Pending callbacks are dropped without running.
    /// If `wait`, blocks until the timer thread has joined.
    pub fn stop(&self, wait: bool) {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.stopping = true;
            inner.entries.clear();
        }
        self.wake.notify_one();
        if wait {
            if let Some(handle) = self.thread.lock().unwrap_or_else(|e| e.into_inner()).take() {
                let _ = handle.join();
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn run_loop(inner: Arc<Mutex<Inner>>, wake: Arc<Condvar>) {
    loop {
        let due = {
            let mut state = inner.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                if state.stopping {
                    return;
                }
                match state.heap.peek().copied() {
                    None => {
                        state = wake.wait(state).unwrap_or_else(|e| e.into_inner());
                    }
                    Some(Reverse((deadline, id))) => {
                        let now = Instant::now();
                        if deadline <= now {
                            state.heap.pop();
                            if state.entries.contains_key(&id) {
                                break Some(id);
                            }
                            // cancelled between scheduling and firing: skip silently
                            continue;
                        }
                        let timeout = deadline - now;
                        let (next_state, _) = wake
                            .wait_timeout(state, timeout)
                            .unwrap_or_else(|e| e.into_inner());
                        state = next_state;
                    }
                }
            }
        };

        let Some(id) = due else { continue };

        let mut state = inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mut entry) = state.entries.remove(&id) else {
            continue;
        };
        drop(state);

        let rearm = (entry.callback)();

        let mut state = inner.lock().unwrap_or_else(|e| e.into_inner());
        if state.stopping {
            continue;
        }
        if rearm {
            let deadline = Instant::now() + entry.delay;
            state.heap.push(Reverse((deadline, id)));
            state.entries.insert(id, entry);
        }
    }
}
