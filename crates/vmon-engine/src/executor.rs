//! Owns the worker pool and the task queue; dispatch, lifecycle, and
//! worker replacement on timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::ExecutorError;
use crate::queue::TaskQueue;
use crate::scheduler::Scheduler;
use crate::worker::{self, Task, TaskDescriptor};

/// Preserves the dispatch-time payload-size contract from the original's
/// embedded-payload design (`TASK_DATA_SIZE` of 128 bytes minus descriptor
/// header), even though payloads here are boxed closures rather than bytes
/// copied into a fixed buffer. `dispatch` callers declare the logical size
/// of what their closures capture; it is checked against this bound so the
/// observable `TOO_MUCH_DATA` contract and its boundary tests still hold.
pub const EMBED_CAPACITY: usize = 96;

pub(crate) struct ExecutorShared {
    pub(crate) queue: TaskQueue<Task>,
    pub(crate) scheduler: Arc<Scheduler>,
    slots: Mutex<Vec<Option<JoinHandle<()>>>>,
    worker_count: usize,
    running: AtomicBool,
}

impl ExecutorShared {
    /// Replaces the worker at `worker_id` with a freshly spawned thread.
    /// The old thread, if still running, is abandoned — dropping its
    /// `JoinHandle` does not stop it; it becomes an orphan that terminates
    /// on its own once its blocking call returns.
    pub(crate) fn replace(self: &Arc<Self>, worker_id: usize) {
        let handle = spawn_worker(self.clone(), worker_id);
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if worker_id < slots.len() {
            slots[worker_id] = Some(handle);
        }
    }
}

fn spawn_worker(shared: Arc<ExecutorShared>, worker_id: usize) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("vmon-worker-{worker_id}"))
        .spawn(move || worker::run(shared, worker_id))
        .expect("failed to spawn worker thread")
}

/// A fixed-size worker pool consuming from a bounded task queue (§4.4).
///
/// Cheaply `Clone`: clones share the same queue, scheduler, and worker
/// slots via the inner `Arc`, which lets a task's `collect` closure hold an
/// owned handle back to the executor (e.g. to dispatch per-domain
/// sub-tasks) without a Worker-to-Executor ownership cycle.
#[derive(Clone)]
pub struct Executor {
    shared: Arc<ExecutorShared>,
}

impl Executor {
    /// Allocates the queue and worker-slot array; does not start any
    /// threads yet.
    pub fn new(scheduler: Arc<Scheduler>, worker_count: usize, max_tasks: usize) -> Self {
        let mut slots = Vec::with_capacity(worker_count);
        slots.resize_with(worker_count, || None);
        Executor {
            shared: Arc::new(ExecutorShared {
                queue: TaskQueue::new(max_tasks),
                scheduler,
                slots: Mutex::new(slots),
                worker_count,
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Starts one thread per worker slot. Fails with
    /// [`ExecutorError::AlreadyStarted`] if already running.
    pub fn start(&self) -> Result<(), ExecutorError> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ExecutorError::AlreadyStarted);
        }
        let mut slots = self
            .shared
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for id in 0..self.shared.worker_count {
            slots[id] = Some(spawn_worker(self.shared.clone(), id));
        }
        Ok(())
    }

    /// Enqueues `worker_count` poison pills, bypassing `dispatch`'s
    /// running check (mirrors the original's direct-ringbuffer-put stop
    /// path). If `wait`, joins every worker thread in slot order.
    pub fn stop(&self, wait: bool) {
        self.shared.running.store(false, Ordering::SeqCst);
        for _ in 0..self.shared.worker_count {
            if self.shared.queue.put(Task::Stop).is_err() {
                tracing::warn!("executor stop: queue full, poison pill dropped");
            }
        }
        if wait {
            let mut slots = self
                .shared
                .slots
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            for slot in slots.iter_mut() {
                if let Some(handle) = slot.take() {
                    let _ = handle.join();
                }
            }
        }
    }

    /// Queues a task. Checks payload size before the running flag, matching
    /// the original's literal check order.
    pub fn dispatch(
        &self,
        work: impl FnOnce() -> i32 + Send + 'static,
        collect: impl FnOnce(i32, bool) + Send + 'static,
        payload_len: usize,
        timeout: Option<Duration>,
    ) -> Result<(), ExecutorError> {
        if payload_len > EMBED_CAPACITY {
            return Err(ExecutorError::TooMuchData);
        }
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(ExecutorError::NotRunning);
        }
        let descriptor = TaskDescriptor::new(Box::new(work), Box::new(collect), timeout);
        self.shared
            .queue
            .put(Task::Run(descriptor))
            .map_err(|_| ExecutorError::TooManyTasks)
    }

    /// Number of worker slots currently holding a live (not-yet-finished)
    /// thread. Orphans abandoned by `replace` are not counted, since their
    /// slot no longer references them.
    pub fn live_worker_count(&self) -> usize {
        self.shared
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|slot| matches!(slot, Some(h) if !h.is_finished()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn running_executor(workers: usize, tasks: usize) -> (Executor, Arc<Scheduler>) {
        let scheduler = Arc::new(Scheduler::new());
        scheduler.start();
        let executor = Executor::new(scheduler.clone(), workers, tasks);
        executor.start().unwrap();
        (executor, scheduler)
    }

    #[test]
    fn dispatch_before_start_fails_not_running() {
        let scheduler = Arc::new(Scheduler::new());
        let executor = Executor::new(scheduler, 1, 4);
        let err = executor.dispatch(|| 0, |_, _| {}, 0, None).unwrap_err();
        assert_eq!(err, ExecutorError::NotRunning);
    }

    #[test]
    fn start_twice_fails_already_started() {
        let (executor, scheduler) = running_executor(1, 4);
        assert_eq!(executor.start().unwrap_err(), ExecutorError::AlreadyStarted);
        executor.stop(true);
        scheduler.stop(true);
    }

    #[test]
    fn dispatch_with_too_large_payload_fails_even_when_not_running() {
        let scheduler = Arc::new(Scheduler::new());
        let executor = Executor::new(scheduler, 1, 4);
        let err = executor
            .dispatch(|| 0, |_, _| {}, EMBED_CAPACITY + 1, None)
            .unwrap_err();
        assert_eq!(err, ExecutorError::TooMuchData);
    }

    #[test]
    fn payload_exactly_at_capacity_is_accepted() {
        let (executor, scheduler) = running_executor(1, 4);
        executor
            .dispatch(|| 0, |_, _| {}, EMBED_CAPACITY, None)
            .unwrap();
        executor.stop(true);
        scheduler.stop(true);
    }

    #[test]
    fn basic_dispatch_runs_work_and_collects_once() {
        let (executor, scheduler) = running_executor(2, 4);
        let (tx, rx) = mpsc::channel();
        executor
            .dispatch(
                || 7,
                move |err, timeout| tx.send((err, timeout)).unwrap(),
                0,
                None,
            )
            .unwrap();
        let (err, timeout) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(err, 7);
        assert!(!timeout);
        executor.stop(true);
        scheduler.stop(true);
    }

    #[test]
    fn queue_overflow_returns_too_many_tasks() {
        let scheduler = Arc::new(Scheduler::new());
        scheduler.start();
        let executor = Executor::new(scheduler.clone(), 1, 2);
        executor.start().unwrap();

        let (block_tx, block_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();
        executor
            .dispatch(
                move || {
                    started_tx.send(()).unwrap();
                    block_rx.recv().unwrap();
                    0
                },
                |_, _| {},
                0,
                None,
            )
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(1)).unwrap();

        executor.dispatch(|| 0, |_, _| {}, 0, None).unwrap();
        executor.dispatch(|| 0, |_, _| {}, 0, None).unwrap();
        let err = executor.dispatch(|| 0, |_, _| {}, 0, None).unwrap_err();
        assert_eq!(err, ExecutorError::TooManyTasks);

        block_tx.send(()).unwrap();
        executor.stop(true);
        scheduler.stop(true);
    }

    #[test]
    fn timeout_replaces_worker_and_delivers_timeout_collect() {
        let (executor, scheduler) = running_executor(2, 4);
        let (tx, rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        executor
            .dispatch(
                move || {
                    release_rx.recv().unwrap();
                    99
                },
                move |err, timeout| tx.send((err, timeout)).unwrap(),
                0,
                Some(Duration::from_millis(30)),
            )
            .unwrap();

        let (err, timeout) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(err, 0);
        assert!(timeout);

        // pool still reports `worker_count` live workers despite the orphan
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(executor.live_worker_count(), 2);

        release_tx.send(()).unwrap();
        executor.stop(true);
        scheduler.stop(true);
    }

    #[test]
    fn stop_then_start_joins_all_workers() {
        let (executor, scheduler) = running_executor(3, 4);
        executor.stop(true);
        assert_eq!(executor.live_worker_count(), 0);
        scheduler.stop(true);
    }
}
