//! Reconcilers for the different resource kinds.
//!
//! Each reconciler turns a create/read/update/delete request into backend
//! mutations and blocks until the backend has converged on the result.
//! Updates are decomposed into a [`StepPlan`](crate::sequencer::StepPlan).

pub mod compute_cluster;
pub mod database;
pub mod db_cluster;
pub mod instance;
pub mod node_group;
pub mod snapshot;
pub mod user;
pub mod volume;

pub use compute_cluster::{ComputeClusterChanges, ComputeClusterReconciler, PowerState};
pub use database::{DatabaseReconciler, DatabaseSpec};
pub use db_cluster::{ClusterLayout, DbClusterChanges, DbClusterReconciler, DbClusterSpec, Shard};
pub use instance::{InstanceChanges, InstanceReconciler, InstanceSpec};
pub use node_group::{NodeGroupChanges, NodeGroupPatch, NodeGroupReconciler};
pub use snapshot::{SnapshotChanges, SnapshotReconciler};
pub use user::{UserChanges, UserReconciler, UserSpec};
pub use volume::{VolumeChanges, VolumeReconciler};

use tracing::info;

use crate::config::WaitTiming;
use crate::error::{ClientError, ReconcileError, Result};
use crate::kind::ResourceKind;
use crate::poller::PollSpec;
use crate::sequencer::SequenceReport;
use crate::status::CanonicalStatus;

/// Availability zones resources may be placed in.
pub const AVAILABILITY_ZONES: [&str; 2] = ["dp1", "ms1"];

/// Lifecycle operations of one resource kind.
pub trait Reconciler {
    /// What `create` needs.
    type Spec;
    /// Requested differences for `update`.
    type Changes;
    /// What `read` returns.
    type State;

    /// Create the resource and wait until it is usable. Returns its id.
    fn create(&self, spec: &Self::Spec) -> Result<String>;

    /// Current backend state, `None` if it does not exist.
    fn read(&self, id: &str) -> Result<Option<Self::State>>;

    /// Apply changes step by step. Stops at the first failing step.
    fn update(&self, id: &str, changes: &Self::Changes) -> Result<SequenceReport>;

    /// Delete the resource and wait until it is gone.
    fn delete(&self, id: &str) -> Result<()>;
}

/// An attribute transition from `old` to `new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<T> {
    pub old: T,
    pub new: T,
}

impl<T: PartialEq> Change<T> {
    pub fn new(old: T, new: T) -> Self {
        Self { old, new }
    }

    pub fn is_noop(&self) -> bool {
        self.old == self.new
    }
}

/// Map a 404 to `None`.
pub(crate) fn found<T>(result: std::result::Result<T, ClientError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Issue a delete, treating a 404 as already deleted. Returns whether the
/// resource still existed.
pub(crate) fn issue_delete(
    kind: ResourceKind,
    id: &str,
    result: std::result::Result<(), ClientError>,
) -> Result<bool> {
    match result {
        Ok(()) => {
            info!(%kind, id, "Delete accepted");
            Ok(true)
        }
        Err(e) if e.is_not_found() => {
            info!(%kind, id, "Already deleted");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Wait spec for `pending` ⇒ `target` with the given timing.
pub(crate) fn wait_spec(
    kind: ResourceKind,
    id: &str,
    pending: impl IntoIterator<Item = CanonicalStatus>,
    target: impl IntoIterator<Item = CanonicalStatus>,
    timing: &WaitTiming,
) -> PollSpec {
    PollSpec::new(kind, id)
        .pending(pending)
        .target(target)
        .with_timing(timing)
}

/// Wait spec for a transition that settles back to `Active`.
pub(crate) fn settle_spec(
    kind: ResourceKind,
    id: &str,
    pending: CanonicalStatus,
    timing: &WaitTiming,
) -> PollSpec {
    wait_spec(kind, id, [pending], [CanonicalStatus::Active], timing)
}

/// Wait spec for a delete: any live status ⇒ `Deleted`.
pub(crate) fn gone_spec(kind: ResourceKind, id: &str, timing: &WaitTiming) -> PollSpec {
    wait_spec(
        kind,
        id,
        [CanonicalStatus::Active, CanonicalStatus::ShuttingDown],
        [CanonicalStatus::Deleted],
        timing,
    )
}

pub(crate) fn validate_availability_zone(zone: &str) -> Result<()> {
    if AVAILABILITY_ZONES.contains(&zone) {
        Ok(())
    } else {
        Err(ReconcileError::InvalidSpec(format!(
            "availability zone {zone} is not one of {AVAILABILITY_ZONES:?}"
        )))
    }
}
