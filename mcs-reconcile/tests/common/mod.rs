//! Shared test utilities for mcs-reconcile integration tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::time::Duration;

use mcs_reconcile::test_util::test_instance;
use mcs_reconcile::{
    CanonicalStatus, ClientError, ManagedResource, Observation, PollSpec, RawState, ResourceKind,
};

/// Probe that replays a fixed list of instance statuses, repeating the last.
pub struct ScriptedProbe {
    statuses: Vec<String>,
    calls: Cell<usize>,
}

impl ScriptedProbe {
    pub fn new(statuses: &[&str]) -> Self {
        assert!(!statuses.is_empty(), "a probe needs at least one status");
        Self {
            statuses: statuses.iter().map(|s| s.to_string()).collect(),
            calls: Cell::new(0),
        }
    }

    pub fn probe(&self) -> Result<Observation, ClientError> {
        let n = self.calls.get();
        self.calls.set(n + 1);
        let status = &self.statuses[n.min(self.statuses.len() - 1)];
        Ok(instance_observation("inst-1", status))
    }

    /// Number of probes issued so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

pub fn instance_observation(id: &str, status: &str) -> Observation {
    Observation::Found(ManagedResource::new(
        id,
        RawState::Instance(test_instance(id, status, "mysql")),
    ))
}

/// Instance wait from `pending` to `target` with the given timing.
pub fn instance_wait(
    pending: &[CanonicalStatus],
    target: &[CanonicalStatus],
    timeout: Duration,
    poll_interval: Duration,
) -> PollSpec {
    PollSpec::new(ResourceKind::Instance, "inst-1")
        .pending(pending.iter().cloned())
        .target(target.iter().cloned())
        .timeout(timeout)
        .initial_delay(Duration::ZERO)
        .poll_interval(poll_interval)
        .min_poll_interval(Duration::ZERO)
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
