//! In-memory backend implementing every service API.
//!
//! Mutations behave like the real control plane: they are accepted at once
//! and queue the statuses the object will report on its next reads. Each
//! read pops one queued status; the last one sticks.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clients::{BlockStorageApi, ContainerInfraApi, DatabaseApi};
use crate::delta::PatchOp;
use crate::error::ClientError;
use crate::model::{
    AutoExpand, AutoExpandTarget, ClusterCreateOpts, ClusterMember, ClusterUpgradeOpts,
    ComputeCluster, ComputeClusterAction, Database, DatabaseRef, DbCluster, DbClusterAction,
    DbClusterCreateOpts, DbmsType, Instance, InstanceAction, InstanceCreateOpts, InstanceVolume,
    Link, NodeGroup, NodeGroupCreateOpts, NodeGroupScaleOpts, RootUser, RootUserEnableOpts, Snapshot,
    SnapshotCreateOpts, SnapshotUpdateOpts, Task, User, UserCreateOpts, UserUpdateOpts, Volume,
    VolumeCreateOpts, VolumeRetypeOpts, VolumeUpdateOpts,
};
use crate::status::IDLE_TASK;

/// What an object reports on its next read.
#[derive(Debug, Clone)]
enum Next {
    Status(String),
    /// Composite members finished draining; the listing is empty.
    Drained,
    Gone,
}

struct Entry<T> {
    object: T,
    script: VecDeque<Next>,
}

type Store<T> = BTreeMap<String, Entry<T>>;

/// Objects whose reported status a script can drive.
trait Scripted: Clone {
    fn apply_status(&mut self, status: &str);

    fn drain(&mut self) {}
}

impl Scripted for Instance {
    fn apply_status(&mut self, status: &str) {
        self.status = status.to_string();
    }
}

impl Scripted for Volume {
    fn apply_status(&mut self, status: &str) {
        self.status = status.to_string();
    }
}

impl Scripted for Snapshot {
    fn apply_status(&mut self, status: &str) {
        self.status = status.to_string();
    }
}

impl Scripted for ComputeCluster {
    fn apply_status(&mut self, status: &str) {
        self.new_status = status.to_string();
    }
}

impl Scripted for NodeGroup {
    fn apply_status(&mut self, status: &str) {
        self.state = Some(status.to_string());
    }
}

/// Task names set the task marker; anything else sets every member.
impl Scripted for DbCluster {
    fn apply_status(&mut self, status: &str) {
        match status {
            "BUILDING" | "UPDATING" | "RESIZING" | "GROWING_CLUSTER" | "SHRINKING_CLUSTER"
            | "DELETING" => {
                self.task = Some(Task {
                    name: status.to_string(),
                    description: None,
                });
            }
            _ => {
                self.task = Some(Task {
                    name: IDLE_TASK.to_string(),
                    description: None,
                });
                for member in &mut self.instances {
                    member.status = status.to_string();
                }
            }
        }
    }

    fn drain(&mut self) {
        self.instances.clear();
        self.task = Some(Task {
            name: IDLE_TASK.to_string(),
            description: None,
        });
    }
}

fn not_found(path: &str) -> ClientError {
    ClientError::NotFound {
        method: "GET".to_string(),
        url: path.to_string(),
        body: "{\"message\": \"not found\"}".to_string(),
    }
}

fn observe<T: Scripted>(store: &mut Store<T>, id: &str, path: &str) -> Result<T, ClientError> {
    let next = store
        .get_mut(id)
        .ok_or_else(|| not_found(path))?
        .script
        .pop_front();
    if let Some(Next::Gone) = next {
        store.remove(id);
        return Err(not_found(path));
    }
    let entry = store.get_mut(id).ok_or_else(|| not_found(path))?;
    match next {
        Some(Next::Status(status)) => entry.object.apply_status(&status),
        Some(Next::Drained) => entry.object.drain(),
        Some(Next::Gone) | None => {}
    }
    Ok(entry.object.clone())
}

fn queue<T>(store: &mut Store<T>, id: &str, path: &str, next: &[Next]) -> Result<(), ClientError> {
    let entry = store.get_mut(id).ok_or_else(|| not_found(path))?;
    entry.script.extend(next.iter().cloned());
    Ok(())
}

fn statuses(names: &[&str]) -> Vec<Next> {
    names.iter().map(|s| Next::Status(s.to_string())).collect()
}

fn then_gone(name: &str) -> [Next; 2] {
    [Next::Status(name.to_string()), Next::Gone]
}

fn insert<T>(store: &mut Store<T>, id: String, object: T, next: &[&str]) {
    store.insert(
        id,
        Entry {
            object,
            script: statuses(next).into(),
        },
    );
}

#[derive(Default)]
struct CloudState {
    calls: Vec<String>,
    failures: HashMap<String, u16>,
    next_id: u32,
    compute_clusters: Store<ComputeCluster>,
    node_groups: Store<NodeGroup>,
    instances: Store<Instance>,
    db_clusters: Store<DbCluster>,
    volumes: Store<Volume>,
    snapshots: Store<Snapshot>,
    databases: HashMap<String, Vec<Database>>,
    users: HashMap<String, Vec<User>>,
    db_cluster_creates: Vec<DbClusterCreateOpts>,
}

impl CloudState {
    /// Record a mutation, failing it if a failure was armed for `method`.
    fn call(&mut self, method: &str, target: &str) -> Result<(), ClientError> {
        self.calls.push(format!("{method} {target}"));
        self.armed(method)
    }

    fn armed(&mut self, method: &str) -> Result<(), ClientError> {
        match self.failures.remove(method) {
            Some(status) => Err(ClientError::Http {
                status,
                method: method.to_string(),
                url: String::new(),
                body: "injected failure".to_string(),
            }),
            None => Ok(()),
        }
    }

    fn new_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn dbms_exists(&self, dbms: DbmsType, id: &str) -> Result<(), ClientError> {
        let exists = match dbms {
            DbmsType::Instance => self.instances.contains_key(id),
            DbmsType::Cluster => self.db_clusters.contains_key(id),
        };
        if exists {
            Ok(())
        } else {
            Err(not_found(&format!("{}/{id}", dbms.path_segment())))
        }
    }

    fn reconcile_parent(&mut self, cluster_id: &str) -> Result<(), ClientError> {
        queue(
            &mut self.compute_clusters,
            cluster_id,
            &format!("clusters/{cluster_id}"),
            &statuses(&["RECONCILING", "RUNNING"]),
        )
    }
}

/// Shared handle to the fake backend. Clones see the same state.
#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutations issued so far, as `"<method> <target>"`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Mutation method names issued so far, in order.
    pub fn call_names(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| c.split_whitespace().next().map(str::to_string))
            .collect()
    }

    /// Fail the next call of `method` with an HTTP `status`.
    pub fn fail_next(&self, method: &str, status: u16) {
        self.state().failures.insert(method.to_string(), status);
    }

    /// Append statuses any object with `id` reports on its next reads.
    pub fn script(&self, id: &str, next: &[&str]) {
        let next = statuses(next);
        let mut guard = self.state();
        let state = &mut *guard;
        if let Some(entry) = state.instances.get_mut(id) {
            entry.script.extend(next);
        } else if let Some(entry) = state.db_clusters.get_mut(id) {
            entry.script.extend(next);
        } else if let Some(entry) = state.compute_clusters.get_mut(id) {
            entry.script.extend(next);
        } else if let Some(entry) = state.node_groups.get_mut(id) {
            entry.script.extend(next);
        } else if let Some(entry) = state.volumes.get_mut(id) {
            entry.script.extend(next);
        } else if let Some(entry) = state.snapshots.get_mut(id) {
            entry.script.extend(next);
        }
    }

    pub fn insert_instance(&self, instance: Instance) {
        insert(&mut self.state().instances, instance.id.clone(), instance, &[]);
    }

    pub fn insert_db_cluster(&self, cluster: DbCluster) {
        insert(&mut self.state().db_clusters, cluster.id.clone(), cluster, &[]);
    }

    pub fn insert_compute_cluster(&self, cluster: ComputeCluster) {
        insert(&mut self.state().compute_clusters, cluster.uuid.clone(), cluster, &[]);
    }

    pub fn insert_node_group(&self, group: NodeGroup) {
        insert(&mut self.state().node_groups, group.uuid.clone(), group, &[]);
    }

    pub fn insert_volume(&self, volume: Volume) {
        insert(&mut self.state().volumes, volume.id.clone(), volume, &[]);
    }

    pub fn insert_snapshot(&self, snapshot: Snapshot) {
        insert(&mut self.state().snapshots, snapshot.id.clone(), snapshot, &[]);
    }

    pub fn insert_database(&self, dbms_id: &str, database: Database) {
        self.state()
            .databases
            .entry(dbms_id.to_string())
            .or_default()
            .push(database);
    }

    pub fn insert_user(&self, dbms_id: &str, user: User) {
        self.state()
            .users
            .entry(dbms_id.to_string())
            .or_default()
            .push(user);
    }

    pub fn instance(&self, id: &str) -> Option<Instance> {
        self.state().instances.get(id).map(|e| e.object.clone())
    }

    pub fn db_cluster(&self, id: &str) -> Option<DbCluster> {
        self.state().db_clusters.get(id).map(|e| e.object.clone())
    }

    pub fn compute_cluster(&self, id: &str) -> Option<ComputeCluster> {
        self.state().compute_clusters.get(id).map(|e| e.object.clone())
    }

    pub fn node_group(&self, id: &str) -> Option<NodeGroup> {
        self.state().node_groups.get(id).map(|e| e.object.clone())
    }

    pub fn volume(&self, id: &str) -> Option<Volume> {
        self.state().volumes.get(id).map(|e| e.object.clone())
    }

    pub fn snapshot(&self, id: &str) -> Option<Snapshot> {
        self.state().snapshots.get(id).map(|e| e.object.clone())
    }

    pub fn databases(&self, dbms_id: &str) -> Vec<Database> {
        self.state().databases.get(dbms_id).cloned().unwrap_or_default()
    }

    /// Every database cluster create request received, in order.
    pub fn db_cluster_creates(&self) -> Vec<DbClusterCreateOpts> {
        self.state().db_cluster_creates.clone()
    }

    pub fn users(&self, dbms_id: &str) -> Vec<User> {
        self.state().users.get(dbms_id).cloned().unwrap_or_default()
    }
}

impl ContainerInfraApi for FakeCloud {
    fn get_cluster(&self, id: &str) -> Result<ComputeCluster, ClientError> {
        let mut state = self.state();
        state.armed("get_cluster")?;
        observe(&mut state.compute_clusters, id, &format!("clusters/{id}"))
    }

    fn create_cluster(&self, opts: &ClusterCreateOpts) -> Result<String, ClientError> {
        let mut state = self.state();
        state.call("create_cluster", &opts.name)?;
        let id = state.new_id("k8s");
        let cluster = ComputeCluster {
            uuid: id.clone(),
            name: opts.name.clone(),
            status: "CREATE_IN_PROGRESS".to_string(),
            new_status: "PROVISIONING".to_string(),
            status_reason: None,
            cluster_template_id: opts.cluster_template_id.clone(),
            master_flavor_id: opts.master_flavor_id.clone(),
            master_count: opts.master_count.unwrap_or(1),
            labels: opts.labels.clone(),
            api_address: None,
            network_id: Some(opts.network_id.clone()),
            subnet_id: Some(opts.subnet_id.clone()),
            created_at: None,
            updated_at: None,
        };
        insert(&mut state.compute_clusters, id.clone(), cluster, &["PROVISIONING", "RUNNING"]);
        Ok(id)
    }

    fn delete_cluster(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("delete_cluster", id)?;
        queue(&mut state.compute_clusters, id, &format!("clusters/{id}"), &then_gone("DELETING"))
    }

    fn upgrade_cluster(&self, id: &str, opts: &ClusterUpgradeOpts) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("upgrade_cluster", id)?;
        let path = format!("clusters/{id}");
        let entry = state.compute_clusters.get_mut(id).ok_or_else(|| not_found(&path))?;
        entry.object.cluster_template_id = opts.cluster_template_id.clone();
        state.reconcile_parent(id)
    }

    fn cluster_action(&self, id: &str, action: &ComputeClusterAction) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call(&action.action, id)?;
        let path = format!("clusters/{id}");
        let entry = state.compute_clusters.get_mut(id).ok_or_else(|| not_found(&path))?;
        let next = match action.action.as_str() {
            "turn_off_cluster" => statuses(&["RECONCILING", "SHUTOFF"]),
            "resize_masters" => {
                entry.object.master_flavor_id = action
                    .payload
                    .as_ref()
                    .and_then(|p| p["flavor"].as_str())
                    .map(str::to_string);
                statuses(&["RECONCILING", "RUNNING"])
            }
            _ => statuses(&["RECONCILING", "RUNNING"]),
        };
        queue(&mut state.compute_clusters, id, &path, &next)
    }

    fn get_node_group(&self, id: &str) -> Result<NodeGroup, ClientError> {
        let mut state = self.state();
        state.armed("get_node_group")?;
        observe(&mut state.node_groups, id, &format!("nodegroups/{id}"))
    }

    fn create_node_group(&self, opts: &NodeGroupCreateOpts) -> Result<String, ClientError> {
        let mut state = self.state();
        state.call("create_node_group", &opts.name)?;
        let id = state.new_id("ng");
        let group = NodeGroup {
            uuid: id.clone(),
            cluster_id: opts.cluster_id.clone(),
            name: opts.name.clone(),
            node_count: opts.node_count,
            max_nodes: opts.max_nodes,
            min_nodes: opts.min_nodes,
            flavor_id: opts.flavor_id.clone(),
            volume_size: opts.volume_size,
            volume_type: opts.volume_type.clone(),
            autoscaling_enabled: opts.autoscaling_enabled,
            labels: opts.labels.clone(),
            taints: opts.taints.clone(),
            state: None,
            created_at: None,
        };
        insert(&mut state.node_groups, id.clone(), group, &[]);
        state.reconcile_parent(&opts.cluster_id)?;
        Ok(id)
    }

    fn scale_node_group(&self, id: &str, opts: &NodeGroupScaleOpts) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("scale_node_group", &format!("{id} {}", opts.delta))?;
        let path = format!("nodegroups/{id}");
        let entry = state.node_groups.get_mut(id).ok_or_else(|| not_found(&path))?;
        let count = i64::from(entry.object.node_count) + opts.delta;
        entry.object.node_count = u32::try_from(count).unwrap_or(0);
        let cluster_id = entry.object.cluster_id.clone();
        state.reconcile_parent(&cluster_id)
    }

    fn patch_node_group(&self, id: &str, ops: &[PatchOp]) -> Result<(), ClientError> {
        let mut state = self.state();
        let paths: Vec<&str> = ops.iter().map(|op| op.path.as_str()).collect();
        state.call("patch_node_group", &format!("{id} {}", paths.join(",")))?;
        let path = format!("nodegroups/{id}");
        let entry = state.node_groups.get_mut(id).ok_or_else(|| not_found(&path))?;
        let group = &mut entry.object;
        for op in ops {
            match op.path.as_str() {
                "/max_nodes" => group.max_nodes = serde_json::from_value(op.value.clone())?,
                "/min_nodes" => group.min_nodes = serde_json::from_value(op.value.clone())?,
                "/autoscaling_enabled" => {
                    group.autoscaling_enabled = op.value.as_str() == Some("true");
                }
                "/labels" => group.labels = serde_json::from_value(op.value.clone())?,
                "/taints" => group.taints = serde_json::from_value(op.value.clone())?,
                _ => {}
            }
        }
        let cluster_id = group.cluster_id.clone();
        state.reconcile_parent(&cluster_id)
    }

    fn delete_node_group(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("delete_node_group", id)?;
        let entry = state
            .node_groups
            .remove(id)
            .ok_or_else(|| not_found(&format!("nodegroups/{id}")))?;
        state.reconcile_parent(&entry.object.cluster_id)
    }
}

impl DatabaseApi for FakeCloud {
    fn get_instance(&self, id: &str) -> Result<Instance, ClientError> {
        let mut state = self.state();
        state.armed("get_instance")?;
        observe(&mut state.instances, id, &format!("instances/{id}"))
    }

    fn create_instance(&self, opts: &InstanceCreateOpts) -> Result<Instance, ClientError> {
        let mut state = self.state();
        state.call("create_instance", &opts.name)?;
        let id = state.new_id("inst");
        let instance = Instance {
            id: id.clone(),
            name: opts.name.clone(),
            status: "BUILD".to_string(),
            datastore: Some(opts.datastore.clone()),
            flavor: Some(Link {
                id: opts.flavor_ref.clone(),
            }),
            volume: Some(InstanceVolume {
                size: opts.volume.size,
                volume_type: opts.volume.volume_type.clone(),
                used: None,
            }),
            replica_of: opts.replica_of.clone().map(|id| Link { id }),
            configuration: opts.configuration.clone().map(|id| Link { id }),
            created: None,
            updated: None,
        };
        insert(&mut state.instances, id, instance.clone(), &["BUILD", "ACTIVE"]);
        Ok(instance)
    }

    fn delete_instance(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("delete_instance", id)?;
        queue(&mut state.instances, id, &format!("instances/{id}"), &then_gone("SHUTDOWN"))
    }

    fn instance_action(&self, id: &str, action: &InstanceAction) -> Result<(), ClientError> {
        let mut state = self.state();
        let method = match action {
            InstanceAction::ResizeVolume { .. } => "resize_volume",
            InstanceAction::ResizeWalVolume { .. } => "resize_wal_volume",
            InstanceAction::ResizeFlavor { .. } => "resize_flavor",
            InstanceAction::ApplyCapabilities(_) => "apply_capabilities",
        };
        state.call(method, id)?;
        let path = format!("instances/{id}");
        let entry = state.instances.get_mut(id).ok_or_else(|| not_found(&path))?;
        match action {
            InstanceAction::ResizeVolume { size } => {
                if let Some(volume) = entry.object.volume.as_mut() {
                    volume.size = *size;
                }
            }
            InstanceAction::ResizeFlavor { flavor_ref } => {
                entry.object.flavor = Some(Link {
                    id: flavor_ref.clone(),
                });
            }
            InstanceAction::ResizeWalVolume { .. } => {}
            InstanceAction::ApplyCapabilities(_) => return Ok(()),
        }
        queue(&mut state.instances, id, &path, &statuses(&["RESIZE", "ACTIVE"]))
    }

    fn detach_replica(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("detach_replica", id)?;
        let path = format!("instances/{id}");
        let entry = state.instances.get_mut(id).ok_or_else(|| not_found(&path))?;
        entry.object.replica_of = None;
        queue(&mut state.instances, id, &path, &statuses(&["DETACH", "ACTIVE"]))
    }

    fn set_instance_configuration(
        &self,
        id: &str,
        configuration: Option<&str>,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        let method = if configuration.is_some() {
            "attach_configuration"
        } else {
            "detach_configuration"
        };
        state.call(method, id)?;
        let path = format!("instances/{id}");
        let entry = state.instances.get_mut(id).ok_or_else(|| not_found(&path))?;
        entry.object.configuration = configuration.map(|id| Link { id: id.to_string() });
        queue(&mut state.instances, id, &path, &statuses(&["BUILD", "ACTIVE"]))
    }

    fn update_instance_autoexpand(
        &self,
        id: &str,
        target: AutoExpandTarget,
        _settings: &AutoExpand,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        let path = format!("instances/{id}");
        match target {
            AutoExpandTarget::Data => {
                state.call("update_autoexpand", id)?;
                queue(&mut state.instances, id, &path, &statuses(&["BUILD", "ACTIVE"]))
            }
            AutoExpandTarget::Wal => {
                state.call("update_wal_autoexpand", id)?;
                queue(&mut state.instances, id, &path, &[])
            }
        }
    }

    fn get_cluster(&self, id: &str) -> Result<DbCluster, ClientError> {
        let mut state = self.state();
        state.armed("get_db_cluster")?;
        observe(&mut state.db_clusters, id, &format!("clusters/{id}"))
    }

    fn create_cluster(&self, opts: &DbClusterCreateOpts) -> Result<DbCluster, ClientError> {
        let mut state = self.state();
        state.call("create_db_cluster", &opts.name)?;
        state.db_cluster_creates.push(opts.clone());
        let id = state.new_id("cluster");
        let mut members = Vec::with_capacity(opts.instances.len());
        for member in &opts.instances {
            members.push(ClusterMember {
                id: state.new_id("member"),
                status: "BUILD".to_string(),
                shard_id: member.shard_id.clone(),
                role: None,
            });
        }
        let cluster = DbCluster {
            id: id.clone(),
            name: opts.name.clone(),
            datastore: Some(opts.datastore.clone()),
            task: Some(Task {
                name: "BUILDING".to_string(),
                description: None,
            }),
            instances: members,
            configuration_id: None,
            created: None,
            updated: None,
        };
        insert(&mut state.db_clusters, id, cluster.clone(), &["BUILDING", "ACTIVE"]);
        Ok(cluster)
    }

    fn delete_cluster(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("delete_db_cluster", id)?;
        let next = [
            Next::Status("DELETING".to_string()),
            Next::Drained,
            Next::Gone,
        ];
        queue(&mut state.db_clusters, id, &format!("clusters/{id}"), &next)
    }

    fn cluster_action(&self, id: &str, action: &DbClusterAction) -> Result<(), ClientError> {
        let mut state = self.state();
        let method = match action {
            DbClusterAction::AttachConfiguration(_) => "attach_configuration",
            DbClusterAction::DetachConfiguration(_) => "detach_configuration",
            DbClusterAction::ApplyCapabilities(_) => "apply_capabilities",
        };
        state.call(method, id)?;
        let path = format!("clusters/{id}");
        let entry = state.db_clusters.get_mut(id).ok_or_else(|| not_found(&path))?;
        match action {
            DbClusterAction::AttachConfiguration(cfg) => {
                entry.object.configuration_id = Some(cfg.clone());
            }
            DbClusterAction::DetachConfiguration(_) => entry.object.configuration_id = None,
            DbClusterAction::ApplyCapabilities(_) => return Ok(()),
        }
        queue(&mut state.db_clusters, id, &path, &statuses(&["BUILD", "ACTIVE"]))
    }

    fn update_cluster_autoexpand(
        &self,
        id: &str,
        _settings: &AutoExpand,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("update_autoexpand", id)?;
        queue(
            &mut state.db_clusters,
            id,
            &format!("clusters/{id}"),
            &statuses(&["UPDATING", "ACTIVE"]),
        )
    }

    fn enable_root(
        &self,
        dbms: DbmsType,
        id: &str,
        opts: &RootUserEnableOpts,
    ) -> Result<RootUser, ClientError> {
        let mut state = self.state();
        state.call("enable_root", id)?;
        state.dbms_exists(dbms, id)?;
        Ok(RootUser {
            name: "root".to_string(),
            password: opts
                .password
                .clone()
                .unwrap_or_else(|| "generated".to_string()),
        })
    }

    fn disable_root(&self, dbms: DbmsType, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("disable_root", id)?;
        state.dbms_exists(dbms, id)
    }

    fn list_databases(&self, dbms: DbmsType, id: &str) -> Result<Vec<Database>, ClientError> {
        let mut state = self.state();
        state.armed("list_databases")?;
        state.dbms_exists(dbms, id)?;
        Ok(state.databases.get(id).cloned().unwrap_or_default())
    }

    fn create_databases(
        &self,
        dbms: DbmsType,
        id: &str,
        databases: &[Database],
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("create_databases", id)?;
        state.dbms_exists(dbms, id)?;
        let existing = state.databases.entry(id.to_string()).or_default();
        for database in databases {
            if !existing.iter().any(|d| d.name == database.name) {
                existing.push(database.clone());
            }
        }
        Ok(())
    }

    fn delete_database(&self, dbms: DbmsType, id: &str, name: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("delete_database", &format!("{id}/{name}"))?;
        state.dbms_exists(dbms, id)?;
        let path = format!("{id}/databases/{name}");
        let databases = state.databases.get_mut(id).ok_or_else(|| not_found(&path))?;
        let before = databases.len();
        databases.retain(|d| d.name != name);
        if databases.len() == before {
            return Err(not_found(&path));
        }
        Ok(())
    }

    fn list_users(&self, dbms: DbmsType, id: &str) -> Result<Vec<User>, ClientError> {
        let mut state = self.state();
        state.armed("list_users")?;
        state.dbms_exists(dbms, id)?;
        Ok(state.users.get(id).cloned().unwrap_or_default())
    }

    fn create_users(
        &self,
        dbms: DbmsType,
        id: &str,
        users: &[UserCreateOpts],
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("create_users", id)?;
        state.dbms_exists(dbms, id)?;
        let existing = state.users.entry(id.to_string()).or_default();
        for user in users {
            existing.push(User {
                name: user.name.clone(),
                host: user.host.clone(),
                databases: user.databases.clone(),
            });
        }
        Ok(())
    }

    fn update_user(
        &self,
        dbms: DbmsType,
        id: &str,
        name: &str,
        opts: &UserUpdateOpts,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("update_user", &format!("{id}/{name}"))?;
        state.dbms_exists(dbms, id)?;
        let path = format!("{id}/users/{name}");
        let user = state
            .users
            .get_mut(id)
            .and_then(|users| users.iter_mut().find(|u| u.name == name))
            .ok_or_else(|| not_found(&path))?;
        if let Some(new_name) = opts.name.as_ref() {
            user.name = new_name.clone();
        }
        if let Some(host) = opts.host.as_ref() {
            user.host = Some(host.clone());
        }
        Ok(())
    }

    fn delete_user(&self, dbms: DbmsType, id: &str, name: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("delete_user", &format!("{id}/{name}"))?;
        state.dbms_exists(dbms, id)?;
        let path = format!("{id}/users/{name}");
        let users = state.users.get_mut(id).ok_or_else(|| not_found(&path))?;
        let before = users.len();
        users.retain(|u| u.name != name);
        if users.len() == before {
            return Err(not_found(&path));
        }
        Ok(())
    }

    fn grant_databases(
        &self,
        dbms: DbmsType,
        id: &str,
        user: &str,
        databases: &[DatabaseRef],
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        let names: Vec<&str> = databases.iter().map(|d| d.name.as_str()).collect();
        state.call("grant_databases", &format!("{id}/{user} {}", names.join(",")))?;
        state.dbms_exists(dbms, id)?;
        let path = format!("{id}/users/{user}");
        let found = state
            .users
            .get_mut(id)
            .and_then(|users| users.iter_mut().find(|u| u.name == user))
            .ok_or_else(|| not_found(&path))?;
        for database in databases {
            if !found.databases.contains(database) {
                found.databases.push(database.clone());
            }
        }
        Ok(())
    }

    fn revoke_database(
        &self,
        dbms: DbmsType,
        id: &str,
        user: &str,
        database: &str,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("revoke_database", &format!("{id}/{user} {database}"))?;
        state.dbms_exists(dbms, id)?;
        let path = format!("{id}/users/{user}/databases/{database}");
        let found = state
            .users
            .get_mut(id)
            .and_then(|users| users.iter_mut().find(|u| u.name == user))
            .ok_or_else(|| not_found(&path))?;
        found.databases.retain(|d| d.name != database);
        Ok(())
    }
}

impl BlockStorageApi for FakeCloud {
    fn get_volume(&self, id: &str) -> Result<Volume, ClientError> {
        let mut state = self.state();
        state.armed("get_volume")?;
        observe(&mut state.volumes, id, &format!("volumes/{id}"))
    }

    fn create_volume(&self, opts: &VolumeCreateOpts) -> Result<Volume, ClientError> {
        let mut state = self.state();
        state.call("create_volume", opts.name.as_deref().unwrap_or_default())?;
        let id = state.new_id("vol");
        let volume = Volume {
            id: id.clone(),
            name: opts.name.clone(),
            description: opts.description.clone(),
            status: "creating".to_string(),
            size: opts.size,
            volume_type: opts.volume_type.clone(),
            availability_zone: opts.availability_zone.clone(),
            metadata: opts.metadata.clone(),
            snapshot_id: opts.snapshot_id.clone(),
            source_volid: opts.source_volid.clone(),
            created_at: None,
        };
        insert(&mut state.volumes, id, volume.clone(), &["creating", "available"]);
        Ok(volume)
    }

    fn update_volume(&self, id: &str, opts: &VolumeUpdateOpts) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("update_volume", id)?;
        let path = format!("volumes/{id}");
        let volume = &mut state.volumes.get_mut(id).ok_or_else(|| not_found(&path))?.object;
        if let Some(name) = opts.name.as_ref() {
            volume.name = Some(name.clone());
        }
        if let Some(description) = opts.description.as_ref() {
            volume.description = Some(description.clone());
        }
        if let Some(metadata) = opts.metadata.as_ref() {
            volume.metadata = metadata.clone();
        }
        Ok(())
    }

    fn extend_volume(&self, id: &str, new_size: u32) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("extend_volume", &format!("{id} {new_size}"))?;
        let path = format!("volumes/{id}");
        state.volumes.get_mut(id).ok_or_else(|| not_found(&path))?.object.size = new_size;
        queue(&mut state.volumes, id, &path, &statuses(&["extending", "available"]))
    }

    fn retype_volume(&self, id: &str, opts: &VolumeRetypeOpts) -> Result<(), ClientError> {
        let mut state = self.state();
        let zone = opts.availability_zone.as_deref().unwrap_or("-");
        state.call("retype_volume", &format!("{id} {} {zone}", opts.new_type))?;
        let path = format!("volumes/{id}");
        let volume = &mut state.volumes.get_mut(id).ok_or_else(|| not_found(&path))?.object;
        volume.volume_type = opts.new_type.clone();
        if let Some(zone) = opts.availability_zone.as_ref() {
            volume.availability_zone = zone.clone();
        }
        queue(&mut state.volumes, id, &path, &statuses(&["retyping", "available"]))
    }

    fn delete_volume(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("delete_volume", id)?;
        queue(&mut state.volumes, id, &format!("volumes/{id}"), &then_gone("deleting"))
    }

    fn get_snapshot(&self, id: &str) -> Result<Snapshot, ClientError> {
        let mut state = self.state();
        state.armed("get_snapshot")?;
        observe(&mut state.snapshots, id, &format!("snapshots/{id}"))
    }

    fn create_snapshot(&self, opts: &SnapshotCreateOpts) -> Result<Snapshot, ClientError> {
        let mut state = self.state();
        state.call("create_snapshot", &opts.volume_id)?;
        let size = state
            .volumes
            .get(&opts.volume_id)
            .map(|e| e.object.size)
            .ok_or_else(|| not_found(&format!("volumes/{}", opts.volume_id)))?;
        let id = state.new_id("snap");
        let snapshot = Snapshot {
            id: id.clone(),
            name: opts.name.clone(),
            description: opts.description.clone(),
            status: "creating".to_string(),
            volume_id: opts.volume_id.clone(),
            size,
            metadata: opts.metadata.clone(),
            created_at: None,
        };
        insert(&mut state.snapshots, id, snapshot.clone(), &["creating", "available"]);
        Ok(snapshot)
    }

    fn update_snapshot(&self, id: &str, opts: &SnapshotUpdateOpts) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("update_snapshot", id)?;
        let path = format!("snapshots/{id}");
        let snapshot = &mut state.snapshots.get_mut(id).ok_or_else(|| not_found(&path))?.object;
        if let Some(name) = opts.name.as_ref() {
            snapshot.name = Some(name.clone());
        }
        if let Some(description) = opts.description.as_ref() {
            snapshot.description = Some(description.clone());
        }
        Ok(())
    }

    fn update_snapshot_metadata(
        &self,
        id: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("update_snapshot_metadata", id)?;
        let path = format!("snapshots/{id}");
        state.snapshots.get_mut(id).ok_or_else(|| not_found(&path))?.object.metadata =
            metadata.clone();
        Ok(())
    }

    fn delete_snapshot(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("delete_snapshot", id)?;
        queue(&mut state.snapshots, id, &format!("snapshots/{id}"), &then_gone("deleting"))
    }
}
