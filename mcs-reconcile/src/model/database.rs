//! Database-as-a-service payloads: instances, clusters, databases, users.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::delta::NaturalKey;

/// Datastore names understood by the database API.
pub mod datastores {
    pub const REDIS: &str = "redis";
    pub const MONGODB: &str = "mongodb";
    pub const POSTGRES_PRO: &str = "postgrespro";
    pub const GALERA: &str = "galera_mysql";
    pub const POSTGRES: &str = "postgresql";
    pub const CLICKHOUSE: &str = "clickhouse";
    pub const MYSQL: &str = "mysql";
}

/// Which DBMS endpoint family a sub-resource lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbmsType {
    Instance,
    Cluster,
}

impl DbmsType {
    pub fn path_segment(&self) -> &'static str {
        match self {
            DbmsType::Instance => "instances",
            DbmsType::Cluster => "clusters",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datastore {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

impl Datastore {
    pub fn is_redis(&self) -> bool {
        self.kind.eq_ignore_ascii_case(datastores::REDIS)
    }
}

/// Reference to another backend object by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceVolume {
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub datastore: Option<Datastore>,
    #[serde(default)]
    pub flavor: Option<Link>,
    #[serde(default)]
    pub volume: Option<InstanceVolume>,
    #[serde(default)]
    pub replica_of: Option<Link>,
    #[serde(default)]
    pub configuration: Option<Link>,
    #[serde(default)]
    pub created: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated: Option<NaiveDateTime>,
}

/// The outstanding-task marker of a database cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// One member instance of a database cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub shard_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbCluster {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub datastore: Option<Datastore>,
    #[serde(default)]
    pub task: Option<Task>,
    #[serde(default)]
    pub instances: Vec<ClusterMember>,
    #[serde(default)]
    pub configuration_id: Option<String>,
    #[serde(default)]
    pub created: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated: Option<NaiveDateTime>,
}

impl DbCluster {
    pub fn is_sharded(&self) -> bool {
        self.instances.iter().any(|m| m.shard_id.is_some())
    }
}

/// A named capability (monitoring agent, backup hook, ...) on a DBMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

/// Disk auto-expansion settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoExpand {
    pub enabled: bool,
    pub max_disk_size: u32,
}

impl AutoExpand {
    pub(crate) fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "volume_autoresize_enabled": u8::from(self.enabled),
            "volume_autoresize_max_size": self.max_disk_size,
        })
    }
}

/// Write-ahead-log volume settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalVolume {
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    #[serde(skip)]
    pub auto_expand: Option<AutoExpand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeOpts {
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkOpts {
    #[serde(rename = "net-id")]
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "v4-fixed-ip")]
    pub fixed_ip: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceCreateOpts {
    pub name: String,
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    pub volume: VolumeOpts,
    pub datastore: Datastore,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nics: Vec<NetworkOpts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keypair: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wal_volume: Option<WalVolume>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterInstanceOpts {
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    pub volume: VolumeOpts,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nics: Vec<NetworkOpts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wal_volume: Option<WalVolume>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keypair: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbClusterCreateOpts {
    pub name: String,
    pub datastore: Datastore,
    pub instances: Vec<ClusterInstanceOpts>,
    pub floating_ip_enabled: bool,
    #[serde(skip)]
    pub auto_expand: Option<AutoExpand>,
    #[serde(skip)]
    pub wal_auto_expand: Option<AutoExpand>,
}

impl DbClusterCreateOpts {
    /// POST `/clusters` body. Auto-expand settings are sent as flat
    /// `volume_autoresize_*` and `wal_volume_autoresize_*` fields.
    pub(crate) fn body(&self) -> serde_json::Value {
        let mut cluster = serde_json::json!(self);
        if let Some(fields) = cluster.as_object_mut() {
            for (prefix, settings) in [("", self.auto_expand), ("wal_", self.wal_auto_expand)] {
                if let Some(settings) = settings {
                    fields.insert(
                        format!("{prefix}volume_autoresize_enabled"),
                        u8::from(settings.enabled).into(),
                    );
                    fields.insert(
                        format!("{prefix}volume_autoresize_max_size"),
                        settings.max_disk_size.into(),
                    );
                }
            }
        }
        serde_json::json!({ "cluster": cluster })
    }
}

/// POST `/instances/{id}/action` bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceAction {
    ResizeVolume { size: u32 },
    ResizeWalVolume { size: u32 },
    ResizeFlavor { flavor_ref: String },
    ApplyCapabilities(Vec<Capability>),
}

impl InstanceAction {
    pub fn body(&self) -> serde_json::Value {
        match self {
            InstanceAction::ResizeVolume { size } => {
                serde_json::json!({ "resize": { "volume": { "size": size } } })
            }
            InstanceAction::ResizeWalVolume { size } => {
                serde_json::json!({ "resize": { "volume": { "size": size, "kind": "wal" } } })
            }
            InstanceAction::ResizeFlavor { flavor_ref } => {
                serde_json::json!({ "resize": { "flavorRef": flavor_ref } })
            }
            InstanceAction::ApplyCapabilities(capabilities) => {
                serde_json::json!({ "apply_capability": { "capabilities": capabilities } })
            }
        }
    }
}

/// POST `/clusters/{id}/action` bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterAction {
    AttachConfiguration(String),
    DetachConfiguration(String),
    ApplyCapabilities(Vec<Capability>),
}

impl ClusterAction {
    pub fn body(&self) -> serde_json::Value {
        match self {
            ClusterAction::AttachConfiguration(id) => {
                serde_json::json!({ "configuration_attach": { "configuration_id": id } })
            }
            ClusterAction::DetachConfiguration(id) => {
                serde_json::json!({ "configuration_detach": { "configuration_id": id } })
            }
            ClusterAction::ApplyCapabilities(capabilities) => {
                serde_json::json!({ "apply_capability": { "capabilities": capabilities } })
            }
        }
    }
}

/// Which volume an auto-expand update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoExpandTarget {
    Data,
    Wal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootUser {
    pub name: String,
    pub password: String,
}

/// Body of a root enable request. The backend generates a password when
/// none is given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RootUserEnableOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "character_set")]
    pub charset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collate: Option<String>,
}

impl Database {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            charset: None,
            collate: None,
        }
    }
}

impl NaturalKey for Database {
    type Key = String;

    fn natural_key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub databases: Vec<DatabaseRef>,
}

impl User {
    pub fn database_names(&self) -> Vec<String> {
        self.databases.iter().map(|d| d.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserCreateOpts {
    pub name: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub databases: Vec<DatabaseRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserUpdateOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl UserUpdateOpts {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.password.is_none() && self.host.is_none()
    }
}
