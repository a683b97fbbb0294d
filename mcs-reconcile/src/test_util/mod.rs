//! Test utilities for mcs-reconcile integration tests.
//!
//! Provides an in-memory cloud and payload builders for exercising the
//! reconcilers without a real control plane.

pub mod fake_cloud;

pub use fake_cloud::FakeCloud;

use std::time::Duration;

use crate::config::Timeouts;
use crate::model::{
    ClusterInstanceOpts, ClusterMember, ComputeCluster, Datastore, DbCluster, Instance,
    InstanceVolume, Link, NodeGroup, Snapshot, Task, Volume, VolumeOpts,
};
use crate::status::IDLE_TASK;

/// Default deadline for waits in tests
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeouts with no delays between probes
pub fn test_timeouts() -> Timeouts {
    Timeouts::immediate(DEFAULT_TIMEOUT)
}

pub fn test_datastore(kind: &str) -> Datastore {
    Datastore {
        kind: kind.to_string(),
        version: "1".to_string(),
    }
}

/// Create a test database instance in `status`
pub fn test_instance(id: &str, status: &str, datastore: &str) -> Instance {
    Instance {
        id: id.to_string(),
        name: format!("test-{id}"),
        status: status.to_string(),
        datastore: Some(test_datastore(datastore)),
        flavor: Some(Link {
            id: "flavor-small".to_string(),
        }),
        volume: Some(InstanceVolume {
            size: 10,
            volume_type: Some("ceph-ssd".to_string()),
            used: None,
        }),
        replica_of: None,
        configuration: None,
        created: None,
        updated: None,
    }
}

/// Create a test cluster member
pub fn test_member(id: &str, status: &str, shard_id: Option<&str>) -> ClusterMember {
    ClusterMember {
        id: id.to_string(),
        status: status.to_string(),
        shard_id: shard_id.map(str::to_string),
        role: None,
    }
}

/// Create an idle test database cluster with the given members
pub fn test_db_cluster(id: &str, datastore: &str, members: Vec<ClusterMember>) -> DbCluster {
    DbCluster {
        id: id.to_string(),
        name: format!("test-{id}"),
        datastore: Some(test_datastore(datastore)),
        task: Some(Task {
            name: IDLE_TASK.to_string(),
            description: None,
        }),
        instances: members,
        configuration_id: None,
        created: None,
        updated: None,
    }
}

pub fn test_cluster_member_opts(zone: Option<&str>) -> ClusterInstanceOpts {
    ClusterInstanceOpts {
        flavor_ref: "flavor-small".to_string(),
        volume: VolumeOpts {
            size: 10,
            volume_type: None,
        },
        nics: Vec::new(),
        availability_zone: zone.map(str::to_string),
        shard_id: None,
        wal_volume: None,
        keypair: None,
    }
}

/// Create a test Kubernetes cluster reporting `new_status`
pub fn test_compute_cluster(id: &str, new_status: &str) -> ComputeCluster {
    ComputeCluster {
        uuid: id.to_string(),
        name: format!("test-{id}"),
        status: "CREATE_COMPLETE".to_string(),
        new_status: new_status.to_string(),
        status_reason: None,
        cluster_template_id: "template-1".to_string(),
        master_flavor_id: Some("flavor-small".to_string()),
        master_count: 1,
        labels: Default::default(),
        api_address: None,
        network_id: None,
        subnet_id: None,
        created_at: None,
        updated_at: None,
    }
}

/// Create an idle test node group in `cluster_id`
pub fn test_node_group(id: &str, cluster_id: &str, node_count: u32) -> NodeGroup {
    NodeGroup {
        uuid: id.to_string(),
        cluster_id: cluster_id.to_string(),
        name: format!("test-{id}"),
        node_count,
        max_nodes: node_count.max(1) * 2,
        min_nodes: 1,
        flavor_id: Some("flavor-small".to_string()),
        volume_size: Some(20),
        volume_type: None,
        autoscaling_enabled: false,
        labels: Vec::new(),
        taints: Vec::new(),
        state: None,
        created_at: None,
    }
}

/// Create a test volume in `status`
pub fn test_volume(id: &str, status: &str, size: u32) -> Volume {
    Volume {
        id: id.to_string(),
        name: Some(format!("test-{id}")),
        description: None,
        status: status.to_string(),
        size,
        volume_type: "ceph-ssd".to_string(),
        availability_zone: "dp1".to_string(),
        metadata: Default::default(),
        snapshot_id: None,
        source_volid: None,
        created_at: None,
    }
}

/// Create a test snapshot of `volume_id` in `status`
pub fn test_snapshot(id: &str, volume_id: &str, status: &str) -> Snapshot {
    Snapshot {
        id: id.to_string(),
        name: Some(format!("test-{id}")),
        description: None,
        status: status.to_string(),
        volume_id: volume_id.to_string(),
        size: 10,
        metadata: Default::default(),
        created_at: None,
    }
}
