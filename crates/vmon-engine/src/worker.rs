//! Per-slot worker state machine: run work, arm/disarm the timeout, invoke
//! the collector exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::executor::ExecutorShared;

type Work = Box<dyn FnOnce() -> i32 + Send>;
type Collect = Box<dyn FnOnce(i32, bool) + Send>;

/// Guarantees `collect` runs exactly once per descriptor, whichever of the
/// worker's normal-completion path or the scheduler's timeout path gets
/// there first. See the double-completion hazard design note.
pub(crate) struct Completion {
    claimed: AtomicBool,
    collect: Mutex<Option<Collect>>,
}

impl Completion {
    fn new(collect: Collect) -> Self {
        Completion {
            claimed: AtomicBool::new(false),
            collect: Mutex::new(Some(collect)),
        }
    }

    /// Attempts to claim completion. Returns the collect closure to the
    /// caller that wins the race; returns `None` to the loser.
    fn claim(&self) -> Option<Collect> {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.collect.lock().unwrap_or_else(|e| e.into_inner()).take()
        } else {
            None
        }
    }
}

/// The unit of work queued for execution (§3 TaskDescriptor).
pub(crate) struct TaskDescriptor {
    work: Work,
    timeout: Option<Duration>,
    completion: Arc<Completion>,
}

impl TaskDescriptor {
    pub(crate) fn new(work: Work, collect: Collect, timeout: Option<Duration>) -> Self {
        TaskDescriptor {
            work,
            timeout,
            completion: Arc::new(Completion::new(collect)),
        }
    }
}

/// What a worker pulls off the queue: real work, or the poison pill that
/// tells it to terminate.
pub(crate) enum Task {
    Run(TaskDescriptor),
    Stop,
}

/// Runs one worker's IDLE → RUNNING → COLLECT loop until a poison pill
/// arrives or this thread is orphaned by a timeout.
pub(crate) fn run(shared: Arc<ExecutorShared>, worker_id: usize) {
    loop {
        let task = shared.queue.get();
        let descriptor = match task {
            Task::Stop => return,
            Task::Run(d) => d,
        };

        let timer_id = descriptor.timeout.map(|timeout| {
            let completion = descriptor.completion.clone();
            let shared_for_timeout = shared.clone();
            shared.scheduler.add(timeout, move || {
                if let Some(collect) = completion.claim() {
                    shared_for_timeout.replace(worker_id);
                    collect(0, true);
                }
                false
            })
        });

        let err = (descriptor.work)();

        if let Some(id) = timer_id {
            // Safe even if the timer already fired.
            shared.scheduler.remove(id);
        }

        match descriptor.completion.claim() {
            Some(collect) => collect(err, false),
            None => {
                // Lost the race to the timeout callback: a replacement
                // thread already owns this slot. Become the orphan.
                return;
            }
        }
    }
}
