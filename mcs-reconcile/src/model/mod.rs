//! Backend payloads and request bodies, grouped by service.

pub mod compute;
pub mod database;
pub mod storage;

pub use compute::{
    ClusterAction as ComputeClusterAction, ClusterCreateOpts, ClusterUpgradeOpts, ComputeCluster,
    NodeGroup, NodeGroupCreateOpts, NodeGroupLabel, NodeGroupScaleOpts, NodeGroupTaint,
};
pub use database::{
    AutoExpand, AutoExpandTarget, Capability, ClusterAction as DbClusterAction,
    ClusterInstanceOpts, ClusterMember, Database, DatabaseRef, Datastore, DbCluster,
    DbClusterCreateOpts, DbmsType, Instance, InstanceAction, InstanceCreateOpts, InstanceVolume,
    Link, NetworkOpts, RootUser, RootUserEnableOpts, Task, User, UserCreateOpts, UserUpdateOpts,
    VolumeOpts, WalVolume,
};
pub use storage::{
    Snapshot, SnapshotCreateOpts, SnapshotUpdateOpts, Volume, VolumeCreateOpts, VolumeRetypeOpts,
    VolumeUpdateOpts,
};
