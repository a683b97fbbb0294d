//! Block-storage payloads: volumes and snapshots.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Migration policy sent with every retype.
pub const RETYPE_MIGRATION_POLICY: &str = "on-demand";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub volume_type: String,
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub source_volid: Option<String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VolumeCreateOpts {
    pub size: u32,
    pub availability_zone: String,
    pub volume_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_volid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "imageRef")]
    pub image_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VolumeUpdateOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl VolumeUpdateOpts {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.metadata.is_none()
    }
}

/// `os-retype` body. Type and zone always travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeRetypeOpts {
    pub new_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    pub migration_policy: String,
}

impl VolumeRetypeOpts {
    pub fn new(new_type: impl Into<String>, availability_zone: Option<String>) -> Self {
        Self {
            new_type: new_type.into(),
            availability_zone,
            migration_policy: RETYPE_MIGRATION_POLICY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub volume_id: String,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SnapshotCreateOpts {
    pub volume_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub force: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotUpdateOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SnapshotUpdateOpts {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retype_body_carries_on_demand_policy() {
        let body = serde_json::to_value(VolumeRetypeOpts::new("ceph-ssd", Some("ms1".into()))).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "new_type": "ceph-ssd",
                "availability_zone": "ms1",
                "migration_policy": "on-demand",
            })
        );
    }

    #[test]
    fn test_volume_decodes_null_name() {
        let volume: Volume = serde_json::from_value(serde_json::json!({
            "id": "vol-1",
            "name": null,
            "status": "available",
            "size": 10,
            "volume_type": "ceph-hdd",
            "availability_zone": "dp1",
            "created_at": "2021-01-02T03:04:05.000000",
        }))
        .unwrap();
        assert!(volume.name.is_none());
        assert_eq!(volume.size, 10);
    }
}
