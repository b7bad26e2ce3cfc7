//! The alternative partitioned-refresh design variant (§4.7).
//!
//! Instance `0` is the refresher: on each tick it lists running domains,
//! partitions them round-robin across instances `1..instance_count`, and
//! advances a generation counter so the other instances know fresh data is
//! available. Each other instance waits on the generation, then copies its
//! own partition (applying an optional readiness predicate) before sampling
//! outside the lock.

use std::sync::{Condvar, Mutex};

use crate::hypervisor::{HypervisorClient, HypervisorError};

struct State {
    generation: u64,
    partitions: Vec<Vec<String>>,
    done: bool,
}

/// Shared generation-barrier state coordinating the refresher and readers.
pub struct PartitionedRefresh {
    instance_count: usize,
    state: Mutex<State>,
    condvar: Condvar,
}

impl PartitionedRefresh {
    /// `instance_count` includes the refresher (instance `0`); there must be
    /// at least 2 instances for any domain to be assigned a reader.
    pub fn new(instance_count: usize) -> Self {
        assert!(instance_count >= 2, "partitioned refresh needs at least one reader instance");
        PartitionedRefresh {
            instance_count,
            state: Mutex::new(State {
                generation: 0,
                partitions: vec![Vec::new(); instance_count],
                done: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Runs one refresher tick: lists domains via `hypervisor`, partitions
    /// them round-robin across the `instance_count - 1` reader instances,
    /// and advances the generation only after the partitions are in place.
    pub fn refresh(&self, hypervisor: &dyn HypervisorClient) -> Result<(), HypervisorError> {
        let domains = hypervisor.list_domains()?;
        let reader_count = self.instance_count - 1;
        let mut partitions = vec![Vec::new(); self.instance_count];
        for (i, domain) in domains.into_iter().enumerate() {
            let instance = 1 + (i % reader_count);
            partitions[instance].push(domain);
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.partitions = partitions;
        state.generation += 1;
        drop(state);
        self.condvar.notify_all();
        Ok(())
    }

    /// Blocks instance `instance_id` until the shared generation advances
    /// past `local_generation` or the refresh loop is stopped. Returns the
    /// instance's partition (after applying `ready`) and the new local
    /// generation to remember for the next call.
    pub fn wait_for_partition(
        &self,
        instance_id: usize,
        local_generation: u64,
        ready: &dyn Fn(&str) -> bool,
    ) -> (Vec<String>, u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while state.generation <= local_generation && !state.done {
            state = self.condvar.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        if state.done {
            return (Vec::new(), local_generation);
        }
        let partition: Vec<String> = state.partitions[instance_id]
            .iter()
            .filter(|d| ready(d))
            .cloned()
            .collect();
        (partition, state.generation)
    }

    /// Stops the barrier: wakes every waiter, which then observes `done`
    /// and returns without a partition.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.done = true;
        drop(state);
        self.condvar.notify_all();
    }
}
