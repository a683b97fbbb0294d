//! Client for the container-infra (managed Kubernetes) API.

use serde::Deserialize;
use tracing::debug;

use super::RestClient;
use crate::delta::PatchOp;
use crate::error::ClientError;
use crate::model::{
    ClusterCreateOpts, ClusterUpgradeOpts, ComputeCluster, ComputeClusterAction, NodeGroup,
    NodeGroupCreateOpts, NodeGroupScaleOpts,
};

/// Header pinning the container-infra API microversion.
pub const API_VERSION_HEADER: (&str, &str) = ("MCS-API-Version", "container-infra 1.16");

/// Operations on Kubernetes clusters and their node groups.
pub trait ContainerInfraApi {
    fn get_cluster(&self, id: &str) -> Result<ComputeCluster, ClientError>;
    fn create_cluster(&self, opts: &ClusterCreateOpts) -> Result<String, ClientError>;
    fn delete_cluster(&self, id: &str) -> Result<(), ClientError>;
    fn upgrade_cluster(&self, id: &str, opts: &ClusterUpgradeOpts) -> Result<(), ClientError>;
    fn cluster_action(&self, id: &str, action: &ComputeClusterAction) -> Result<(), ClientError>;

    fn get_node_group(&self, id: &str) -> Result<NodeGroup, ClientError>;
    fn create_node_group(&self, opts: &NodeGroupCreateOpts) -> Result<String, ClientError>;
    fn scale_node_group(&self, id: &str, opts: &NodeGroupScaleOpts) -> Result<(), ClientError>;
    fn patch_node_group(&self, id: &str, ops: &[PatchOp]) -> Result<(), ClientError>;
    fn delete_node_group(&self, id: &str) -> Result<(), ClientError>;
}

#[derive(Deserialize)]
struct Created {
    uuid: String,
}

/// HTTP implementation of [`ContainerInfraApi`].
#[derive(Debug, Clone)]
pub struct ContainerInfraClient {
    rest: RestClient,
}

impl ContainerInfraClient {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

impl ContainerInfraApi for ContainerInfraClient {
    fn get_cluster(&self, id: &str) -> Result<ComputeCluster, ClientError> {
        self.rest.get(&format!("clusters/{id}"))
    }

    fn create_cluster(&self, opts: &ClusterCreateOpts) -> Result<String, ClientError> {
        debug!(name = %opts.name, "Creating kubernetes cluster");
        let created: Created = self.rest.post("clusters", opts)?;
        Ok(created.uuid)
    }

    fn delete_cluster(&self, id: &str) -> Result<(), ClientError> {
        self.rest.delete(&format!("clusters/{id}"))
    }

    fn upgrade_cluster(&self, id: &str, opts: &ClusterUpgradeOpts) -> Result<(), ClientError> {
        self.rest.patch(&format!("clusters/{id}/actions/upgrade"), opts)
    }

    fn cluster_action(&self, id: &str, action: &ComputeClusterAction) -> Result<(), ClientError> {
        self.rest.post_empty(&format!("clusters/{id}/actions"), action)
    }

    fn get_node_group(&self, id: &str) -> Result<NodeGroup, ClientError> {
        self.rest.get(&format!("nodegroups/{id}"))
    }

    fn create_node_group(&self, opts: &NodeGroupCreateOpts) -> Result<String, ClientError> {
        debug!(cluster = %opts.cluster_id, name = %opts.name, "Creating node group");
        let created: Created = self.rest.post("nodegroups", opts)?;
        Ok(created.uuid)
    }

    fn scale_node_group(&self, id: &str, opts: &NodeGroupScaleOpts) -> Result<(), ClientError> {
        self.rest.patch(&format!("nodegroups/{id}/actions/scale"), opts)
    }

    fn patch_node_group(&self, id: &str, ops: &[PatchOp]) -> Result<(), ClientError> {
        self.rest.patch(&format!("nodegroups/{id}"), &ops)
    }

    fn delete_node_group(&self, id: &str) -> Result<(), ClientError> {
        self.rest.delete(&format!("nodegroups/{id}"))
    }
}
