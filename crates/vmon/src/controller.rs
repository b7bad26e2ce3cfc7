//! The single owned value binding request source, [`Sampler`], [`Executor`],
//! and [`Scheduler`] lifecycle (§9: no process-wide globals).

use std::io::BufRead;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use vmon_core::{parse_request, SampleRequest, StatsMask};
use vmon_engine::{Executor, ExecutorError, Scheduler};

use crate::sampler::{OutputCollector, Sampler};
use crate::shutdown::ShutdownEvent;

/// Owns the executor, scheduler, sampler, and output sink for the
/// lifetime of the process.
pub struct Controller {
    executor: Executor,
    scheduler: Arc<Scheduler>,
    sampler: Sampler,
    collector: Arc<OutputCollector>,
    timeout: Option<Duration>,
}

impl Controller {
    /// Assembles the controller. Does not start any threads yet.
    pub fn new(
        scheduler: Arc<Scheduler>,
        executor: Executor,
        sampler: Sampler,
        collector: Arc<OutputCollector>,
        timeout: Option<Duration>,
    ) -> Self {
        Controller {
            executor,
            scheduler,
            sampler,
            collector,
            timeout,
        }
    }

    /// Starts the scheduler thread and the worker pool.
    pub fn start(&self) -> Result<(), ExecutorError> {
        self.scheduler.start();
        self.executor.start()
    }

    /// Stops the worker pool (joining every worker) and the scheduler.
    pub fn stop(&self) {
        self.executor.stop(true);
        self.scheduler.stop(true);
    }

    /// Parses and dispatches one request line (§7: malformed lines are
    /// logged and dropped, not fatal).
    pub fn handle_line(&self, line: &str) {
        match parse_request(line) {
            Ok(request) => {
                if let Err(e) = self.sampler.sample(&self.executor, self.collector.clone(), request, self.timeout) {
                    tracing::warn!(error = %e, "failed to dispatch sampling request");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed request");
            }
        }
    }

    fn dispatch_poll(&self) {
        let request = SampleRequest {
            req_id: uuid::Uuid::new_v4().to_string(),
            stats: StatsMask::all(),
        };
        if let Err(e) = self.sampler.sample(&self.executor, self.collector.clone(), request, self.timeout) {
            tracing::warn!(error = %e, "periodic poll dispatch failed");
        }
    }

    /// Spawns a thread reading newline-framed requests from `reader` until
    /// EOF (or a read error), then signals [`ShutdownEvent::ReaderDone`].
    pub fn spawn_stdin_reader<R: BufRead + Send + 'static>(
        self: &Arc<Self>,
        reader: R,
        events: Sender<ShutdownEvent>,
    ) -> std::thread::JoinHandle<()> {
        let controller = self.clone();
        std::thread::Builder::new()
            .name("vmon-reader".into())
            .spawn(move || {
                for line in reader.lines() {
                    match line {
                        Ok(line) if line.trim().is_empty() => continue,
                        Ok(line) => controller.handle_line(&line),
                        Err(e) => {
                            tracing::error!(error = %e, "stdin read error");
                            break;
                        }
                    }
                }
                let _ = events.send(ShutdownEvent::ReaderDone);
            })
            .expect("failed to spawn stdin reader thread")
    }

    /// Arms a periodic timer on the scheduler that dispatches a full-stats
    /// sampling request every `period`, for `--polling-period`.
    pub fn start_periodic_polling(self: &Arc<Self>, period: Duration) {
        let controller = self.clone();
        self.scheduler.add(period, move || {
            controller.dispatch_poll();
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypervisor::FakeHypervisor;
    use std::io::{BufReader, Write};
    use std::sync::mpsc;
    use std::sync::Mutex as StdMutex;
    use vmon_core::{Collector, VmInfo};

    struct SharedBuf(Arc<StdMutex<Vec<u8>>>);
    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn test_controller() -> (Arc<Controller>, Arc<StdMutex<Vec<u8>>>) {
        let scheduler = Arc::new(Scheduler::new());
        let executor = Executor::new(scheduler.clone(), 2, 8);
        let hypervisor = Arc::new(FakeHypervisor::new().with_domain("dom-a", VmInfo::new("dom-a")));
        let sampler = Sampler::new(hypervisor, true);
        let buf = Arc::new(StdMutex::new(Vec::new()));
        let collector: Arc<OutputCollector> =
            Arc::new(Collector::new(Box::new(SharedBuf(buf.clone())) as Box<dyn Write + Send>));
        let controller = Arc::new(Controller::new(scheduler, executor, sampler, collector, None));
        controller.start().unwrap();
        (controller, buf)
    }

    #[test]
    fn stdin_reader_dispatches_requests_until_eof() {
        let (controller, buf) = test_controller();
        let (tx, rx) = mpsc::channel();
        let input = "{\"req-id\":\"r1\"}\n";
        let reader = BufReader::new(input.as_bytes());
        let handle = controller.spawn_stdin_reader(reader, tx);

        let event = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(event, ShutdownEvent::ReaderDone));
        handle.join().unwrap();

        std::thread::sleep(Duration::from_millis(50));
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(text.contains("\"r1\""));

        controller.stop();
    }

    #[test]
    fn malformed_line_is_dropped_and_reader_continues() {
        let (controller, buf) = test_controller();
        let (tx, rx) = mpsc::channel();
        let input = "{ \"req-id\": 1 }\n{\"req-id\":\"r2\"}\n";
        let reader = BufReader::new(input.as_bytes());
        let handle = controller.spawn_stdin_reader(reader, tx);

        let event = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(event, ShutdownEvent::ReaderDone));
        handle.join().unwrap();

        std::thread::sleep(Duration::from_millis(50));
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(!text.contains("\"req-id\":1"));
        assert!(text.contains("\"r2\""));

        controller.stop();
    }

    #[test]
    fn periodic_polling_fires_at_least_once() {
        let (controller, buf) = test_controller();
        controller.start_periodic_polling(Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(150));
        assert!(!buf.lock().unwrap().is_empty());
        controller.stop();
    }
}
