//! Resource kinds and the transient view of a probed resource.

use std::fmt;

use crate::model::{ComputeCluster, Database, DbCluster, Instance, NodeGroup, Snapshot, User, Volume};
use crate::status::{self, CanonicalStatus, Direction};

/// Every backend object kind under reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Kubernetes cluster (container-infra API).
    ComputeCluster,
    NodeGroup,
    /// Single-node database instance.
    Instance,
    /// Replicated multi-node database cluster.
    Cluster,
    ShardedCluster,
    Volume,
    Snapshot,
    Database,
    User,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ComputeCluster => "kubernetes_cluster",
            ResourceKind::NodeGroup => "kubernetes_node_group",
            ResourceKind::Instance => "db_instance",
            ResourceKind::Cluster => "db_cluster",
            ResourceKind::ShardedCluster => "db_cluster_with_shards",
            ResourceKind::Volume => "blockstorage_volume",
            ResourceKind::Snapshot => "blockstorage_snapshot",
            ResourceKind::Database => "db_database",
            ResourceKind::User => "db_user",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific backend payload, as returned by a single read.
#[derive(Debug, Clone)]
pub enum RawState {
    ComputeCluster(ComputeCluster),
    NodeGroup(NodeGroup),
    Instance(Instance),
    Cluster(DbCluster),
    ShardedCluster(DbCluster),
    Volume(Volume),
    Snapshot(Snapshot),
    /// `None` while the database is absent from the DBMS listing.
    Database(Option<Database>),
    /// `None` while the user is absent from the DBMS listing.
    User(Option<User>),
}

impl RawState {
    pub fn kind(&self) -> ResourceKind {
        match self {
            RawState::ComputeCluster(_) => ResourceKind::ComputeCluster,
            RawState::NodeGroup(_) => ResourceKind::NodeGroup,
            RawState::Instance(_) => ResourceKind::Instance,
            RawState::Cluster(_) => ResourceKind::Cluster,
            RawState::ShardedCluster(_) => ResourceKind::ShardedCluster,
            RawState::Volume(_) => ResourceKind::Volume,
            RawState::Snapshot(_) => ResourceKind::Snapshot,
            RawState::Database(_) => ResourceKind::Database,
            RawState::User(_) => ResourceKind::User,
        }
    }

    /// Wrap a database cluster under the kind its members describe.
    pub fn db_cluster(cluster: DbCluster) -> Self {
        if cluster.is_sharded() {
            RawState::ShardedCluster(cluster)
        } else {
            RawState::Cluster(cluster)
        }
    }
}

/// A resource as seen by one probe. Never cached across polls.
#[derive(Debug, Clone)]
pub struct ManagedResource {
    pub id: String,
    pub raw: RawState,
}

impl ManagedResource {
    pub fn new(id: impl Into<String>, raw: RawState) -> Self {
        Self { id: id.into(), raw }
    }

    pub fn kind(&self) -> ResourceKind {
        self.raw.kind()
    }

    /// Canonical status, derived fresh from the payload on every call.
    pub fn status(&self, direction: Direction) -> CanonicalStatus {
        status::derive_status(&self.raw, direction)
    }
}
