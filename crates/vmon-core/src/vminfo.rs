//! The per-domain stats snapshot produced by a [`crate::HypervisorClient`]
//! fake and consumed when building a success record.
//!
//! Field names mirror the original's `VmInfo`/`BlockStats`/`IfaceStats`
//! layout; only the sections selected by a request's [`crate::StatsMask`]
//! are populated and, in turn, serialized.

use std::collections::BTreeMap;

use serde::Serialize;

/// Domain power state, as reported by the hypervisor.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StateInfo {
    /// Hypervisor-defined state code.
    pub state: i32,
    /// Hypervisor-defined reason code for the current state.
    pub reason: i32,
}

/// Cumulative physical CPU time consumed by the domain.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PCpuInfo {
    /// Total CPU time, nanoseconds.
    pub time: u64,
    /// User-mode CPU time, nanoseconds.
    pub user: u64,
    /// System-mode CPU time, nanoseconds.
    pub system: u64,
}

/// Memory balloon driver sizing, in KiB.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BalloonInfo {
    /// Current balloon size.
    pub current: u64,
    /// Maximum balloon size.
    pub maximum: u64,
}

/// Per-vCPU runtime stats.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct VCpuStats {
    /// Whether this vCPU is present in the domain's current topology.
    pub present: bool,
    /// Hypervisor-defined vCPU run state.
    pub state: i32,
    /// Cumulative vCPU run time, nanoseconds.
    pub time: u64,
}

/// The domain's vCPU table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VCpuInfo {
    /// One entry per vCPU slot (index is the vCPU id).
    pub stats: Vec<VCpuStats>,
    /// Number of vCPUs currently online.
    pub current: usize,
}

/// Per-block-device I/O counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BlockStats {
    /// Read requests served.
    pub rd_reqs: u64,
    /// Bytes read.
    pub rd_bytes: u64,
    /// Cumulative read latency, nanoseconds.
    pub rd_times: u64,
    /// Write requests served.
    pub wr_reqs: u64,
    /// Bytes written.
    pub wr_bytes: u64,
    /// Cumulative write latency, nanoseconds.
    pub wr_times: u64,
    /// Flush operations served.
    pub fl_bytes: u64,
    /// Cumulative flush latency, nanoseconds.
    pub fl_times: u64,
    /// Bytes currently allocated (thin-provisioned images).
    pub allocation: u64,
    /// Logical image capacity, bytes.
    pub capacity: u64,
    /// Physical bytes occupied on the backing store.
    pub physical: u64,
}

/// Per-network-interface counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IfaceStats {
    /// Bytes received.
    pub rx_bytes: u64,
    /// Packets received.
    pub rx_pkts: u64,
    /// Receive errors.
    pub rx_errs: u64,
    /// Packets dropped on receive.
    pub rx_drop: u64,
    /// Bytes transmitted.
    pub tx_bytes: u64,
    /// Packets transmitted.
    pub tx_pkts: u64,
    /// Transmit errors.
    pub tx_errs: u64,
    /// Packets dropped on transmit.
    pub tx_drop: u64,
}

/// A single domain's full stats snapshot (§3 VmInfo).
///
/// Every section is optional: the sampler only populates the ones selected
/// by the request's stats mask, and the response writer only emits the
/// sections that are `Some`.
#[derive(Debug, Clone, Default)]
pub struct VmInfo {
    /// Domain identifier, as reported by the hypervisor.
    pub uuid: String,
    /// Power state, if `STATE` was requested.
    pub state: Option<StateInfo>,
    /// Physical CPU usage, if `CPU_TOTAL` was requested.
    pub pcpu: Option<PCpuInfo>,
    /// Balloon sizing, if `BALLOON` was requested.
    pub balloon: Option<BalloonInfo>,
    /// vCPU table, if `VCPU` was requested.
    pub vcpu: Option<VCpuInfo>,
    /// Per-device block I/O counters, keyed by device name, if `BLOCK` was
    /// requested.
    pub block: BTreeMap<String, BlockStats>,
    /// Per-interface counters, keyed by interface name, if `INTERFACE` was
    /// requested.
    pub iface: BTreeMap<String, IfaceStats>,
}

impl VmInfo {
    /// An empty snapshot for the given domain; sections are filled in by
    /// the caller as the matching stats are collected.
    pub fn new(uuid: impl Into<String>) -> Self {
        VmInfo {
            uuid: uuid.into(),
            ..Default::default()
        }
    }
}
