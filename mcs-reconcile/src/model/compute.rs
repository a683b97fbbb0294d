//! Container-infra payloads: Kubernetes clusters and node groups.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::delta::NaturalKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeCluster {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    /// Lifecycle status of the managed-kubernetes control loop.
    #[serde(default)]
    pub new_status: String,
    #[serde(default)]
    pub status_reason: Option<String>,
    #[serde(default)]
    pub cluster_template_id: String,
    #[serde(default)]
    pub master_flavor_id: Option<String>,
    #[serde(default)]
    pub master_count: u32,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub api_address: Option<String>,
    #[serde(default)]
    pub network_id: Option<String>,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterCreateOpts {
    pub name: String,
    pub cluster_template_id: String,
    pub network_id: String,
    pub subnet_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keypair: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_flavor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pods_network_cidr: Option<String>,
    pub floating_ip_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterUpgradeOpts {
    pub cluster_template_id: String,
    pub rolling_enabled: bool,
}

/// POST `/clusters/{id}/actions` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterAction {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ClusterAction {
    pub fn resize_masters(flavor: &str) -> Self {
        Self {
            action: "resize_masters".to_string(),
            payload: Some(serde_json::json!({ "flavor": flavor })),
        }
    }

    pub fn turn_on() -> Self {
        Self {
            action: "turn_on_cluster".to_string(),
            payload: None,
        }
    }

    pub fn turn_off() -> Self {
        Self {
            action: "turn_off_cluster".to_string(),
            payload: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroupLabel {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl NaturalKey for NodeGroupLabel {
    type Key = String;

    fn natural_key(&self) -> String {
        self.key.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroupTaint {
    pub key: String,
    #[serde(default)]
    pub value: String,
    pub effect: String,
}

impl NaturalKey for NodeGroupTaint {
    type Key = String;

    fn natural_key(&self) -> String {
        self.key.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeGroup {
    pub uuid: String,
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub node_count: u32,
    #[serde(default)]
    pub max_nodes: u32,
    #[serde(default)]
    pub min_nodes: u32,
    #[serde(default)]
    pub flavor_id: Option<String>,
    #[serde(default)]
    pub volume_size: Option<u32>,
    #[serde(default)]
    pub volume_type: Option<String>,
    #[serde(default)]
    pub autoscaling_enabled: bool,
    #[serde(default)]
    pub labels: Vec<NodeGroupLabel>,
    #[serde(default)]
    pub taints: Vec<NodeGroupTaint>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeGroupCreateOpts {
    pub cluster_id: String,
    pub name: String,
    pub node_count: u32,
    pub max_nodes: u32,
    pub min_nodes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    pub autoscaling_enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<NodeGroupLabel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<NodeGroupTaint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zones: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeGroupScaleOpts {
    pub delta: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_decodes_with_new_status() {
        let cluster: ComputeCluster = serde_json::from_value(serde_json::json!({
            "uuid": "k8s-1",
            "name": "prod",
            "status": "CREATE_COMPLETE",
            "new_status": "RUNNING",
            "cluster_template_id": "tpl-1",
            "master_count": 3,
            "created_at": "2020-03-11T09:31:55+00:00",
        }))
        .unwrap();
        assert_eq!(cluster.new_status, "RUNNING");
        assert_eq!(cluster.master_count, 3);
        assert!(cluster.created_at.is_some());
    }

    #[test]
    fn test_action_serialization() {
        let body = serde_json::to_value(ClusterAction::resize_masters("Standard-4-8")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "action": "resize_masters", "payload": { "flavor": "Standard-4-8" } })
        );
        let body = serde_json::to_value(ClusterAction::turn_off()).unwrap();
        assert_eq!(body, serde_json::json!({ "action": "turn_off_cluster" }));
    }
}
