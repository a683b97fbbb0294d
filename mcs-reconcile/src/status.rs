//! Canonical lifecycle status.
//!
//! Every backend kind reports progress differently: a flat `status` string,
//! a `new_status` string, a `task` marker plus per-member statuses, or mere
//! presence in a listing. [`derive_status`] folds all of them into one
//! [`CanonicalStatus`]. It is pure and recomputed on every probe.

use std::fmt;

use crate::kind::RawState;
use crate::model::{ClusterMember, Task};

/// Task marker a database cluster reports when nothing is in progress.
pub const IDLE_TASK: &str = "NONE";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CanonicalStatus {
    Building,
    Active,
    Resizing,
    Updating,
    Detaching,
    ShuttingDown,
    ShutOff,
    Deleted,
    Error,
    /// A backend string with no mapping. Never pending or target.
    Unrecognized(String),
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CanonicalStatus::Building => "BUILD",
            CanonicalStatus::Active => "ACTIVE",
            CanonicalStatus::Resizing => "RESIZE",
            CanonicalStatus::Updating => "UPDATING",
            CanonicalStatus::Detaching => "DETACH",
            CanonicalStatus::ShuttingDown => "SHUTDOWN",
            CanonicalStatus::ShutOff => "SHUTOFF",
            CanonicalStatus::Deleted => "DELETED",
            CanonicalStatus::Error => "ERROR",
            CanonicalStatus::Unrecognized(raw) => raw,
        };
        f.write_str(s)
    }
}

/// Direction of travel of the operation doing the wait.
///
/// Disambiguates states that look the same on the way up and on the way
/// down: a composite with zero members, a database missing from a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Grow,
    Shrink,
}

impl Direction {
    fn absent(self) -> CanonicalStatus {
        match self {
            Direction::Grow => CanonicalStatus::Building,
            Direction::Shrink => CanonicalStatus::Deleted,
        }
    }
}

/// Derive the canonical status of a probed payload.
pub fn derive_status(raw: &RawState, direction: Direction) -> CanonicalStatus {
    match raw {
        RawState::ComputeCluster(cluster) => compute_status(&cluster.new_status),
        // Absent state means the group has no operation in flight.
        RawState::NodeGroup(group) => match group.state.as_deref() {
            Some(state) if !state.is_empty() => compute_status(state),
            _ => CanonicalStatus::Active,
        },
        RawState::Instance(instance) => instance_status(&instance.status),
        RawState::Cluster(cluster) | RawState::ShardedCluster(cluster) => {
            composite_status(cluster.task.as_ref(), &cluster.instances, direction)
        }
        RawState::Volume(volume) => volume_status(&volume.status),
        RawState::Snapshot(snapshot) => snapshot_status(&snapshot.status),
        RawState::Database(db) => presence_status(db.is_some(), direction),
        RawState::User(user) => presence_status(user.is_some(), direction),
    }
}

pub fn instance_status(raw: &str) -> CanonicalStatus {
    match raw.to_ascii_uppercase().as_str() {
        "BUILD" => CanonicalStatus::Building,
        "ACTIVE" => CanonicalStatus::Active,
        "RESIZE" => CanonicalStatus::Resizing,
        "DETACH" => CanonicalStatus::Detaching,
        "SHUTDOWN" => CanonicalStatus::ShuttingDown,
        "DELETED" => CanonicalStatus::Deleted,
        "ERROR" => CanonicalStatus::Error,
        "UPDATING" | "RESTART_REQUIRED" | "REBOOT" | "BACKUP" => CanonicalStatus::Updating,
        _ => CanonicalStatus::Unrecognized(raw.to_string()),
    }
}

/// Status named by a non-idle cluster task marker.
pub fn task_status(name: &str) -> CanonicalStatus {
    match name.to_ascii_uppercase().as_str() {
        "BUILDING" | "BUILD" => CanonicalStatus::Building,
        "UPDATING" | "GROWING_CLUSTER" | "SHRINKING_CLUSTER" => CanonicalStatus::Updating,
        "RESIZING" => CanonicalStatus::Resizing,
        "DELETING" => CanonicalStatus::ShuttingDown,
        _ => CanonicalStatus::Unrecognized(name.to_string()),
    }
}

pub fn compute_status(raw: &str) -> CanonicalStatus {
    match raw.to_ascii_uppercase().as_str() {
        "PROVISIONING" => CanonicalStatus::Building,
        "RUNNING" => CanonicalStatus::Active,
        "RECONCILING" => CanonicalStatus::Updating,
        "DELETING" => CanonicalStatus::ShuttingDown,
        "DELETED" => CanonicalStatus::Deleted,
        "SHUTOFF" => CanonicalStatus::ShutOff,
        "ERROR" => CanonicalStatus::Error,
        _ => CanonicalStatus::Unrecognized(raw.to_string()),
    }
}

pub fn volume_status(raw: &str) -> CanonicalStatus {
    match raw.to_ascii_lowercase().as_str() {
        "creating" => CanonicalStatus::Building,
        "available" | "in-use" => CanonicalStatus::Active,
        "extending" => CanonicalStatus::Resizing,
        "retyping" | "attaching" | "maintenance" => CanonicalStatus::Updating,
        "detaching" => CanonicalStatus::Detaching,
        "deleting" => CanonicalStatus::ShuttingDown,
        "deleted" => CanonicalStatus::Deleted,
        "error" | "error_extending" | "error_deleting" | "error_restoring" => {
            CanonicalStatus::Error
        }
        _ => CanonicalStatus::Unrecognized(raw.to_string()),
    }
}

pub fn snapshot_status(raw: &str) -> CanonicalStatus {
    match raw.to_ascii_lowercase().as_str() {
        "creating" => CanonicalStatus::Building,
        "available" => CanonicalStatus::Active,
        "deleting" => CanonicalStatus::ShuttingDown,
        "deleted" => CanonicalStatus::Deleted,
        "error" | "error_deleting" => CanonicalStatus::Error,
        _ => CanonicalStatus::Unrecognized(raw.to_string()),
    }
}

/// Databases and users have no status field; they exist or they don't.
pub fn presence_status(present: bool, direction: Direction) -> CanonicalStatus {
    if present {
        CanonicalStatus::Active
    } else {
        direction.absent()
    }
}

/// Status of a database cluster from its task marker and members.
///
/// Any member in error wins. A busy task marker names the status itself.
/// With an idle marker the highest ranked member status wins, ranked
/// `Active < Building < Resizing < anything else`, last seen on ties.
pub fn composite_status(
    task: Option<&Task>,
    members: &[ClusterMember],
    direction: Direction,
) -> CanonicalStatus {
    let statuses: Vec<CanonicalStatus> = members.iter().map(|m| instance_status(&m.status)).collect();

    if statuses.contains(&CanonicalStatus::Error) {
        return CanonicalStatus::Error;
    }

    if let Some(task) = task.filter(|t| !t.name.eq_ignore_ascii_case(IDLE_TASK)) {
        return task_status(&task.name);
    }

    let mut winner: Option<CanonicalStatus> = None;
    for status in statuses {
        if winner.as_ref().is_none_or(|w| member_rank(&status) >= member_rank(w)) {
            winner = Some(status);
        }
    }
    winner.unwrap_or_else(|| direction.absent())
}

fn member_rank(status: &CanonicalStatus) -> u8 {
    match status {
        CanonicalStatus::Active => 0,
        CanonicalStatus::Building => 1,
        CanonicalStatus::Resizing => 2,
        _ => 3,
    }
}
