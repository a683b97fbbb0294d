//! Blocking wait-for-status loop.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::WaitTiming;
use crate::error::{ClientError, ReconcileError, Result};
use crate::kind::{ManagedResource, ResourceKind};
use crate::status::{CanonicalStatus, Direction};

/// Outcome of a single probe.
#[derive(Debug, Clone)]
pub enum Observation {
    Found(ManagedResource),
    /// The backend no longer knows the resource.
    NotFound,
}

impl Observation {
    pub fn resource(&self) -> Option<&ManagedResource> {
        match self {
            Observation::Found(resource) => Some(resource),
            Observation::NotFound => None,
        }
    }

    pub fn into_resource(self) -> Option<ManagedResource> {
        match self {
            Observation::Found(resource) => Some(resource),
            Observation::NotFound => None,
        }
    }

    pub fn status(&self, direction: Direction) -> CanonicalStatus {
        match self {
            Observation::Found(resource) => resource.status(direction),
            Observation::NotFound => CanonicalStatus::Deleted,
        }
    }
}

/// What to wait for, and for how long. Built right before each wait.
#[derive(Debug, Clone)]
pub struct PollSpec {
    pub kind: ResourceKind,
    pub id: String,
    pub pending: Vec<CanonicalStatus>,
    pub target: Vec<CanonicalStatus>,
    pub timeout: Duration,
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    pub min_poll_interval: Duration,
    pub direction: Direction,
}

impl PollSpec {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            pending: Vec::new(),
            target: Vec::new(),
            timeout: Duration::from_secs(600),
            initial_delay: Duration::ZERO,
            poll_interval: Duration::from_secs(3),
            min_poll_interval: Duration::ZERO,
            direction: Direction::Grow,
        }
    }

    pub fn pending(mut self, statuses: impl IntoIterator<Item = CanonicalStatus>) -> Self {
        self.pending = statuses.into_iter().collect();
        self
    }

    pub fn target(mut self, statuses: impl IntoIterator<Item = CanonicalStatus>) -> Self {
        self.target = statuses.into_iter().collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_timing(self, timing: &WaitTiming) -> Self {
        self.timeout(timing.timeout)
            .initial_delay(timing.initial_delay)
            .poll_interval(timing.poll_interval)
            .min_poll_interval(timing.min_poll_interval)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(ReconcileError::InvalidPollSpec(format!(
                "no target statuses for {} {}",
                self.kind, self.id
            )));
        }
        if let Some(overlap) = self.pending.iter().find(|s| self.target.contains(s)) {
            return Err(ReconcileError::InvalidPollSpec(format!(
                "status {overlap} is both pending and target for {} {}",
                self.kind, self.id
            )));
        }
        Ok(())
    }

    fn interval(&self) -> Duration {
        self.poll_interval.max(self.min_poll_interval)
    }

    fn unexpected(&self, status: CanonicalStatus) -> ReconcileError {
        ReconcileError::UnexpectedStatus {
            kind: self.kind,
            id: self.id.clone(),
            status,
            pending: self.pending.clone(),
            target: self.target.clone(),
        }
    }
}

/// Block until the probed resource reaches a target status.
///
/// A transport 404 counts as `Deleted`. `Error` ends the wait on the probe
/// that observed it unless `Error` is a target. Probe errors other than 404
/// are returned as is. The wait ends no later than one interval past
/// `timeout`.
pub fn wait_for<F>(spec: &PollSpec, mut probe: F) -> Result<Observation>
where
    F: FnMut() -> std::result::Result<Observation, ClientError>,
{
    spec.validate()?;

    let start = Instant::now();
    let interval = spec.interval();
    let mut probes = 0u32;

    thread::sleep(spec.initial_delay.min(spec.timeout));

    loop {
        probes += 1;
        let observation = match probe() {
            Ok(observation) => observation,
            Err(e) if e.is_not_found() => Observation::NotFound,
            Err(e) => return Err(e.into()),
        };

        let status = observation.status(spec.direction);
        debug!(kind = %spec.kind, id = %spec.id, %status, probe = probes, "Probed resource");

        if spec.target.contains(&status) {
            info!(
                kind = %spec.kind,
                id = %spec.id,
                %status,
                elapsed = ?start.elapsed(),
                "Resource reached target status"
            );
            return Ok(observation);
        }

        match observation {
            Observation::Found(resource) if status == CanonicalStatus::Error => {
                return Err(ReconcileError::ErrorState {
                    resource: Box::new(resource),
                });
            }
            _ if !spec.pending.contains(&status) => return Err(spec.unexpected(status)),
            _ => {}
        }

        if start.elapsed().saturating_add(interval) > spec.timeout {
            return Err(ReconcileError::Timeout {
                kind: spec.kind,
                id: spec.id.clone(),
                timeout: spec.timeout,
                last_status: Some(status),
            });
        }
        thread::sleep(interval);
    }
}
