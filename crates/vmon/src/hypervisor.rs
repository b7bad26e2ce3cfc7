//! The opaque hypervisor collaborator (§1: modeled as `HypervisorClient`,
//! out of scope — no real libvirt binding here). This module defines the
//! trait seam plus an in-memory fake used by tests and the bundled demo
//! mode.

use std::collections::HashMap;
use std::time::Duration;

use vmon_core::{StatsMask, VmInfo};

/// Any non-zero return from the hypervisor client (§7 HypervisorError).
#[derive(Debug, Clone)]
pub struct HypervisorError {
    /// Hypervisor-defined error code, carried verbatim into the error
    /// record.
    pub code: i32,
    /// Human-readable message, carried verbatim into the error record.
    pub message: String,
}

impl std::fmt::Display for HypervisorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hypervisor error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for HypervisorError {}

/// The external collaborator this system samples. Blocking calls on this
/// trait are exactly the calls the executor's timeout machinery exists to
/// bound — implementations are free to block arbitrarily.
pub trait HypervisorClient: Send + Sync {
    /// Lists currently running domains (used by per-domain mode's
    /// preparatory task, and by the partitioned-refresh variant).
    fn list_domains(&self) -> Result<Vec<String>, HypervisorError>;

    /// One call returning stats for every running domain (bulk mode).
    fn sample_bulk(&self, stats: StatsMask) -> Result<Vec<VmInfo>, HypervisorError>;

    /// One call returning stats for a single domain (per-domain mode).
    fn sample_domain(&self, domain: &str, stats: StatsMask) -> Result<VmInfo, HypervisorError>;
}

/// An in-memory fake hypervisor: a fixed domain list, canned stats, and
/// optional per-domain artificial latency or errors, for exercising the
/// worker/timeout machinery without a real libvirt connection.
#[derive(Default)]
pub struct FakeHypervisor {
    domains: Vec<String>,
    infos: HashMap<String, VmInfo>,
    delays: HashMap<String, Duration>,
    errors: HashMap<String, HypervisorError>,
}

impl FakeHypervisor {
    /// An empty fake with no domains.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a domain with a canned stats snapshot.
    pub fn with_domain(mut self, name: impl Into<String>, info: VmInfo) -> Self {
        let name = name.into();
        self.domains.push(name.clone());
        self.infos.insert(name, info);
        self
    }

    /// Makes `sample_domain` block for `delay` before returning, to
    /// simulate a stuck hypervisor call.
    pub fn with_delay(mut self, name: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(name.into(), delay);
        self
    }

    /// Makes `sample_domain` fail for this domain.
    pub fn with_error(mut self, name: impl Into<String>, error: HypervisorError) -> Self {
        self.errors.insert(name.into(), error);
        self
    }
}

impl HypervisorClient for FakeHypervisor {
    fn list_domains(&self) -> Result<Vec<String>, HypervisorError> {
        Ok(self.domains.clone())
    }

    fn sample_bulk(&self, _stats: StatsMask) -> Result<Vec<VmInfo>, HypervisorError> {
        Ok(self.domains.iter().filter_map(|d| self.infos.get(d).cloned()).collect())
    }

    fn sample_domain(&self, domain: &str, _stats: StatsMask) -> Result<VmInfo, HypervisorError> {
        if let Some(delay) = self.delays.get(domain) {
            std::thread::sleep(*delay);
        }
        if let Some(err) = self.errors.get(domain) {
            return Err(err.clone());
        }
        Ok(self
            .infos
            .get(domain)
            .cloned()
            .unwrap_or_else(|| VmInfo::new(domain)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_lists_registered_domains_in_order() {
        let fake = FakeHypervisor::new()
            .with_domain("a", VmInfo::new("a"))
            .with_domain("b", VmInfo::new("b"));
        assert_eq!(fake.list_domains().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn fake_returns_configured_error() {
        let fake = FakeHypervisor::new().with_error(
            "a",
            HypervisorError {
                code: 5,
                message: "boom".into(),
            },
        );
        let err = fake.sample_domain("a", StatsMask::empty()).unwrap_err();
        assert_eq!(err.code, 5);
    }
}
