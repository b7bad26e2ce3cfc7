//! Translates a [`SampleRequest`] into executor work (§4.6).
//!
//! Bulk mode dispatches one task that makes a single hypervisor call for
//! every running domain. Per-domain mode dispatches a preparatory task that
//! lists domains, then one independent sub-task per domain — each owning
//! its own by-value copy of the request and its target domain id, not a
//! borrow of the preparatory task's stack frame.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vmon_core::{bulk_response, error_record, success_record, Collector, SampleRequest, StatsMask, VmInfo};
use vmon_engine::{Executor, ExecutorError};

use crate::hypervisor::{HypervisorClient, HypervisorError};

/// The output sink shared by every in-flight sampling task.
pub type OutputCollector = Collector<Box<dyn Write + Send>>;

/// Declared payload size handed to [`Executor::dispatch`]: the request's
/// `req-id` plus a fixed allowance for the stats mask and domain id, kept
/// well under [`vmon_engine::EMBED_CAPACITY`].
fn declared_payload_len(req_id: &str) -> usize {
    req_id.len() + 16
}

/// Builds tasks from a [`SampleRequest`] and dispatches them onto an
/// [`Executor`].
pub struct Sampler {
    hypervisor: Arc<dyn HypervisorClient>,
    bulk_sampling: bool,
}

impl Sampler {
    /// `bulk_sampling` selects between the two dispatch modes (§4.6).
    pub fn new(hypervisor: Arc<dyn HypervisorClient>, bulk_sampling: bool) -> Self {
        Sampler {
            hypervisor,
            bulk_sampling,
        }
    }

    /// Dispatches whatever tasks this request requires.
    pub fn sample(
        &self,
        executor: &Executor,
        collector: Arc<OutputCollector>,
        request: SampleRequest,
        timeout: Option<Duration>,
    ) -> Result<(), ExecutorError> {
        if self.bulk_sampling {
            self.dispatch_bulk(executor, collector, request, timeout)
        } else {
            self.dispatch_per_domain(executor, collector, request, timeout)
        }
    }

    fn dispatch_bulk(
        &self,
        executor: &Executor,
        collector: Arc<OutputCollector>,
        request: SampleRequest,
        timeout: Option<Duration>,
    ) -> Result<(), ExecutorError> {
        let hypervisor = self.hypervisor.clone();
        let stats = request.stats;
        let req_id = request.req_id.clone();
        let slot: Arc<Mutex<Option<Result<Vec<VmInfo>, HypervisorError>>>> = Arc::new(Mutex::new(None));
        let work_slot = slot.clone();

        let work = move || {
            let result = hypervisor.sample_bulk(stats);
            let code = result.as_ref().err().map(|e| e.code).unwrap_or(0);
            *work_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
            code
        };

        let collect = move |_err: i32, timed_out: bool| {
            let timestamp = now_unix();
            if timed_out {
                let record = error_record(&req_id, timestamp, "", 0, "sampling timed out", true);
                log_write_error(collector.write_record(&record));
                return;
            }
            let result = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
            match result {
                Some(Ok(infos)) => {
                    let records: Vec<_> = infos.iter().map(|i| success_record(&req_id, timestamp, i)).collect();
                    let record = bulk_response(&req_id, timestamp, records);
                    log_write_error(collector.write_record(&record));
                }
                Some(Err(hv_err)) => {
                    let record = error_record(&req_id, timestamp, "", hv_err.code, &hv_err.message, false);
                    log_write_error(collector.write_record(&record));
                }
                None => {
                    tracing::error!("bulk sample task completed without a recorded result");
                }
            }
        };

        let payload_len = declared_payload_len(&request.req_id);
        executor.dispatch(work, collect, payload_len, timeout)
    }

    fn dispatch_per_domain(
        &self,
        executor: &Executor,
        collector: Arc<OutputCollector>,
        request: SampleRequest,
        timeout: Option<Duration>,
    ) -> Result<(), ExecutorError> {
        let hypervisor = self.hypervisor.clone();
        let stats = request.stats;
        let req_id = request.req_id.clone();
        let executor_for_subtasks = executor.clone();
        let slot: Arc<Mutex<Option<Result<Vec<String>, HypervisorError>>>> = Arc::new(Mutex::new(None));
        let work_slot = slot.clone();

        let work = move || {
            let result = hypervisor.list_domains();
            let code = result.as_ref().err().map(|e| e.code).unwrap_or(0);
            *work_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
            code
        };

        let hypervisor_for_collect = self.hypervisor.clone();
        let collect = move |_err: i32, timed_out: bool| {
            let timestamp = now_unix();
            if timed_out {
                let record = error_record(&req_id, timestamp, "", 0, "domain listing timed out", true);
                log_write_error(collector.write_record(&record));
                return;
            }
            match slot.lock().unwrap_or_else(|e| e.into_inner()).take() {
                Some(Ok(domains)) => {
                    for domain in domains {
                        if let Err(dispatch_err) = dispatch_domain_task(
                            &executor_for_subtasks,
                            hypervisor_for_collect.clone(),
                            collector.clone(),
                            req_id.clone(),
                            domain.clone(),
                            stats,
                            timeout,
                        ) {
                            tracing::warn!(%domain, error = %dispatch_err, "failed to dispatch per-domain sampling task");
                            let record = error_record(&req_id, timestamp, &domain, dispatch_err.code(), "dispatch failed", false);
                            log_write_error(collector.write_record(&record));
                        }
                    }
                }
                Some(Err(hv_err)) => {
                    let record = error_record(&req_id, timestamp, "", hv_err.code, &hv_err.message, false);
                    log_write_error(collector.write_record(&record));
                }
                None => {
                    tracing::error!("domain listing task completed without a recorded result");
                }
            }
        };

        let payload_len = declared_payload_len(&request.req_id);
        executor.dispatch(work, collect, payload_len, timeout)
    }
}

fn dispatch_domain_task(
    executor: &Executor,
    hypervisor: Arc<dyn HypervisorClient>,
    collector: Arc<OutputCollector>,
    req_id: String,
    domain: String,
    stats: StatsMask,
    timeout: Option<Duration>,
) -> Result<(), ExecutorError> {
    let slot: Arc<Mutex<Option<Result<VmInfo, HypervisorError>>>> = Arc::new(Mutex::new(None));
    let work_slot = slot.clone();
    let work_domain = domain.clone();

    let work = move || {
        let result = hypervisor.sample_domain(&work_domain, stats);
        let code = result.as_ref().err().map(|e| e.code).unwrap_or(0);
        *work_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
        code
    };

    let collect = move |_err: i32, timed_out: bool| {
        let timestamp = now_unix();
        if timed_out {
            let record = error_record(&req_id, timestamp, &domain, 0, "sampling timed out", true);
            log_write_error(collector.write_record(&record));
            return;
        }
        match slot.lock().unwrap_or_else(|e| e.into_inner()).take() {
            Some(Ok(info)) => {
                let record = success_record(&req_id, timestamp, &info);
                log_write_error(collector.write_record(&record));
            }
            Some(Err(hv_err)) => {
                let record = error_record(&req_id, timestamp, &domain, hv_err.code, &hv_err.message, false);
                log_write_error(collector.write_record(&record));
            }
            None => {
                tracing::error!(%domain, "per-domain sample task completed without a recorded result");
            }
        }
    };

    let payload_len = declared_payload_len(&req_id);
    executor.dispatch(work, collect, payload_len, timeout)
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

fn log_write_error(result: std::io::Result<()>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "failed to write response record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use vmon_core::parse_request;
    use vmon_engine::Scheduler;

    use crate::hypervisor::FakeHypervisor;

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

    fn test_rig(workers: usize, tasks: usize) -> (Executor, Arc<Scheduler>, Arc<OutputCollector>, Arc<StdMutex<Vec<u8>>>) {
        let scheduler = Arc::new(Scheduler::new());
        scheduler.start();
        let executor = Executor::new(scheduler.clone(), workers, tasks);
        executor.start().unwrap();
        let buf = Arc::new(StdMutex::new(Vec::new()));
        let collector: Arc<OutputCollector> =
            Arc::new(Collector::new(Box::new(SharedBuf(buf.clone())) as Box<dyn Write + Send>));
        (executor, scheduler, collector, buf)
    }

    fn lines_of(buf: &Arc<StdMutex<Vec<u8>>>) -> Vec<serde_json::Value> {
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        text.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
    }

    #[test]
    fn bulk_mode_happy_path_returns_one_aggregated_record() {
        let (executor, scheduler, collector, buf) = test_rig(2, 4);
        let hypervisor = Arc::new(
            FakeHypervisor::new()
                .with_domain("dom-a", VmInfo::new("dom-a"))
                .with_domain("dom-b", VmInfo::new("dom-b")),
        );
        let sampler = Sampler::new(hypervisor, true);
        let request =
            parse_request(r#"{"req-id":"9ec2b64f-e432-4020-98df-8dac9931f5f7","get-stats":["block"]}"#).unwrap();

        sampler.sample(&executor, collector, request, None).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let records = lines_of(&buf);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["req-id"], "9ec2b64f-e432-4020-98df-8dac9931f5f7");
        assert_eq!(records[0]["data"].as_array().unwrap().len(), 2);

        executor.stop(true);
        scheduler.stop(true);
    }

    #[test]
    fn per_domain_one_slow_domain_times_out_and_pool_stays_full() {
        let (executor, scheduler, collector, buf) = test_rig(2, 8);
        let hypervisor = Arc::new(
            FakeHypervisor::new()
                .with_domain("A", VmInfo::new("A"))
                .with_domain("B", VmInfo::new("B"))
                .with_delay("A", Duration::from_millis(500)),
        );
        let sampler = Sampler::new(hypervisor, false);
        let request = SampleRequest {
            req_id: "req-1".into(),
            stats: StatsMask::STATE,
        };

        sampler
            .sample(&executor, collector, request, Some(Duration::from_millis(100)))
            .unwrap();

        std::thread::sleep(Duration::from_millis(300));
        let records = lines_of(&buf);
        let b_record = records.iter().find(|r| r["data"]["vm-id"] == "B").unwrap();
        assert_eq!(b_record["data"]["error"], serde_json::Value::Null);
        let a_record = records.iter().find(|r| r["data"]["vm-id"] == "A").unwrap();
        assert_eq!(a_record["data"]["timeout"], "yes");

        assert_eq!(executor.live_worker_count(), 2);

        std::thread::sleep(Duration::from_millis(300));
        executor.stop(true);
        scheduler.stop(true);
    }

    #[test]
    fn hypervisor_error_on_single_domain_is_reported_individually() {
        let (executor, scheduler, collector, buf) = test_rig(2, 8);
        let hypervisor = Arc::new(
            FakeHypervisor::new()
                .with_domain("A", VmInfo::new("A"))
                .with_error(
                    "A",
                    HypervisorError {
                        code: 7,
                        message: "connect refused".into(),
                    },
                ),
        );
        let sampler = Sampler::new(hypervisor, false);
        let request = SampleRequest {
            req_id: "req-2".into(),
            stats: StatsMask::STATE,
        };

        sampler.sample(&executor, collector, request, None).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let records = lines_of(&buf);
        let a_record = records.iter().find(|r| r["data"]["vm-id"] == "A").unwrap();
        assert_eq!(a_record["data"]["error"]["code"], 7);

        executor.stop(true);
        scheduler.stop(true);
    }
}
