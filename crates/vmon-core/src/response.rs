//! Builds success/error JSON records (§6) and writes them to the output
//! sink without interleaving partial lines.

use std::io::Write;
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use crate::vminfo::VmInfo;

/// Builds the `data` object of a success record, including only the
/// sections present on `info` (selected by the request's stats mask).
fn success_data(info: &VmInfo) -> Value {
    let mut data = Map::new();
    data.insert("vm-id".into(), json!(info.uuid));

    if let Some(pcpu) = &info.pcpu {
        data.insert(
            "pcpu".into(),
            json!({
                "cpu.time": pcpu.time,
                "cpu.user": pcpu.user,
                "cpu.system": pcpu.system,
            }),
        );
    }
    if let Some(balloon) = &info.balloon {
        data.insert(
            "balloon".into(),
            json!({
                "balloon.current": balloon.current,
                "balloon.maximum": balloon.maximum,
            }),
        );
    }
    if let Some(vcpu) = &info.vcpu {
        let mut entries = Map::new();
        for (idx, stat) in vcpu.stats.iter().enumerate() {
            if stat.present {
                entries.insert(idx.to_string(), json!({"state": stat.state, "time": stat.time}));
            }
        }
        data.insert("vcpu".into(), Value::Object(entries));
    }
    if !info.block.is_empty() {
        let mut entries = Map::new();
        for (name, b) in &info.block {
            entries.insert(
                name.clone(),
                json!({
                    "rd_bytes": b.rd_bytes,
                    "rd_operations": b.rd_reqs,
                    "rd_total_times": b.rd_times,
                    "wr_bytes": b.wr_bytes,
                    "wr_operations": b.wr_reqs,
                    "wr_total_times": b.wr_times,
                    "allocation": b.allocation,
                    "capacity": b.capacity,
                    "physical": b.physical,
                }),
            );
        }
        data.insert("block".into(), Value::Object(entries));
    }
    if !info.iface.is_empty() {
        let mut entries = Map::new();
        for (name, i) in &info.iface {
            entries.insert(
                name.clone(),
                json!({
                    "rx_bytes": i.rx_bytes,
                    "rx_pkts": i.rx_pkts,
                    "rx_errs": i.rx_errs,
                    "rx_drop": i.rx_drop,
                    "tx_bytes": i.tx_bytes,
                    "tx_pkts": i.tx_pkts,
                    "tx_errs": i.tx_errs,
                    "tx_drop": i.tx_drop,
                }),
            );
        }
        data.insert("iface".into(), Value::Object(entries));
    }

    Value::Object(data)
}

/// Builds a full success record for one domain.
pub fn success_record(req_id: &str, timestamp: i64, info: &VmInfo) -> Value {
    json!({
        "req-id": req_id,
        "timestamp": timestamp,
        "data": success_data(info),
    })
}

/// Builds a full error record (§7: `HypervisorError` carries the
/// hypervisor's code with `timeout: "no"`; `Timeout` carries code `0` with
/// `timeout: "yes"`).
pub fn error_record(req_id: &str, timestamp: i64, vm_id: &str, code: i32, message: &str, timeout: bool) -> Value {
    json!({
        "req-id": req_id,
        "timestamp": timestamp,
        "data": {
            "vm-id": vm_id,
            "error": { "code": code, "message": message },
            "timeout": if timeout { "yes" } else { "no" },
        },
    })
}

/// Wraps a set of per-domain `data` objects into the single bulk-response
/// outer object.
pub fn bulk_response(req_id: &str, timestamp: i64, records: Vec<Value>) -> Value {
    let data: Vec<Value> = records
        .into_iter()
        .map(|r| r.get("data").cloned().unwrap_or(Value::Null))
        .collect();
    json!({
        "req-id": req_id,
        "timestamp": timestamp,
        "data": data,
    })
}

/// Serializes records to the output sink, one JSON object per line,
/// serialized under a single lock so lines from concurrent collectors
/// never interleave.
pub struct Collector<W> {
    sink: Mutex<W>,
}

impl<W: Write> Collector<W> {
    /// Wraps `sink` for serialized, line-at-a-time writes.
    pub fn new(sink: W) -> Self {
        Collector {
            sink: Mutex::new(sink),
        }
    }

    /// Writes one record as a single line, flushing immediately.
    pub fn write_record(&self, record: &Value) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        sink.write_all(&line)?;
        sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vminfo::{BlockStats, PCpuInfo};

    #[test]
    fn success_record_only_includes_requested_sections() {
        let mut info = VmInfo::new("dom-1");
        info.pcpu = Some(PCpuInfo {
            time: 10,
            user: 4,
            system: 6,
        });
        let record = success_record("r1", 1000, &info);
        let data = &record["data"];
        assert_eq!(data["vm-id"], "dom-1");
        assert_eq!(data["pcpu"]["cpu.time"], 10);
        assert!(data.get("balloon").is_none());
        assert!(data.get("block").is_none());
    }

    #[test]
    fn error_record_shape() {
        let record = error_record("r1", 1000, "dom-1", 0, "timed out", true);
        assert_eq!(record["data"]["timeout"], "yes");
        assert_eq!(record["data"]["error"]["code"], 0);
    }

    #[test]
    fn collector_writes_newline_terminated_json() {
        let buf: Vec<u8> = Vec::new();
        let collector = Collector::new(buf);
        let mut info = VmInfo::new("dom-1");
        info.block.insert(
            "vda".into(),
            BlockStats {
                rd_bytes: 42,
                ..Default::default()
            },
        );
        let record = success_record("r1", 1000, &info);
        collector.write_record(&record).unwrap();
        let sink = collector.sink.lock().unwrap();
        let text = String::from_utf8(sink.clone()).unwrap();
        assert!(text.ends_with('\n'));
        let parsed: Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(parsed["data"]["block"]["vda"]["rd_bytes"], 42);
    }
}
