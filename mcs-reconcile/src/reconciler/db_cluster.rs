//! Replicated and sharded database cluster reconciler.

use tracing::info;

use super::{Change, Reconciler, found, gone_spec, issue_delete, settle_spec};
use crate::clients::DatabaseApi;
use crate::config::{KindTimeouts, Timeouts};
use crate::error::{ClientError, ReconcileError, Result};
use crate::kind::{ManagedResource, RawState, ResourceKind};
use crate::model::{
    AutoExpand, Capability, ClusterInstanceOpts, Datastore, DbCluster, DbClusterAction,
    DbClusterCreateOpts,
};
use crate::poller::{Observation, PollSpec, wait_for};
use crate::sequencer::{SequenceReport, Step, StepPlan, run_steps};
use crate::status::{CanonicalStatus, Direction};

/// One shard of a sharded cluster.
#[derive(Debug, Clone)]
pub struct Shard {
    pub shard_id: String,
    pub size: u32,
    pub instance: ClusterInstanceOpts,
}

/// Member layout requested at create time.
#[derive(Debug, Clone)]
pub enum ClusterLayout {
    /// `size` copies of one member template.
    Replicated {
        size: u32,
        instance: ClusterInstanceOpts,
    },
    Sharded(Vec<Shard>),
}

impl ClusterLayout {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ClusterLayout::Replicated { .. } => ResourceKind::Cluster,
            ClusterLayout::Sharded(_) => ResourceKind::ShardedCluster,
        }
    }

    /// Member list sent to the backend.
    pub fn expand(&self) -> Vec<ClusterInstanceOpts> {
        match self {
            ClusterLayout::Replicated { size, instance } => {
                (0..*size).map(|_| instance.clone()).collect()
            }
            ClusterLayout::Sharded(shards) => shards
                .iter()
                .flat_map(|shard| {
                    (0..shard.size).map(move |_| ClusterInstanceOpts {
                        shard_id: Some(shard.shard_id.clone()),
                        ..shard.instance.clone()
                    })
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbClusterSpec {
    pub name: String,
    pub datastore: Datastore,
    pub layout: ClusterLayout,
    pub configuration: Option<String>,
    pub capabilities: Vec<Capability>,
    pub floating_ip_enabled: bool,
    pub auto_expand: Option<AutoExpand>,
    pub wal_auto_expand: Option<AutoExpand>,
}

#[derive(Debug, Clone, Default)]
pub struct DbClusterChanges {
    pub configuration: Option<Change<Option<String>>>,
    pub auto_expand: Option<AutoExpand>,
    pub capabilities: Option<Vec<Capability>>,
}

pub struct DbClusterReconciler<C> {
    client: C,
    kind: ResourceKind,
    timeouts: KindTimeouts,
}

impl<C: DatabaseApi> DbClusterReconciler<C> {
    pub fn replicated(client: C, timeouts: &Timeouts) -> Self {
        Self {
            client,
            kind: ResourceKind::Cluster,
            timeouts: timeouts.dbms,
        }
    }

    pub fn sharded(client: C, timeouts: &Timeouts) -> Self {
        Self {
            client,
            kind: ResourceKind::ShardedCluster,
            timeouts: timeouts.dbms,
        }
    }

    fn probe(&self, id: &str) -> std::result::Result<Observation, ClientError> {
        let cluster = self.client.get_cluster(id)?;
        let raw = match self.kind {
            ResourceKind::ShardedCluster => RawState::ShardedCluster(cluster),
            _ => RawState::Cluster(cluster),
        };
        Ok(Observation::Found(ManagedResource::new(id, raw)))
    }

    fn settle(&self, id: &str, pending: CanonicalStatus) -> PollSpec {
        settle_spec(self.kind, id, pending, &self.timeouts.update)
    }

    fn plan<'a>(&'a self, id: &'a str, changes: &'a DbClusterChanges) -> StepPlan<'a> {
        let mut plan = StepPlan::new();
        let probe = move || self.probe(id);

        if let Some(change) = changes.configuration.as_ref().filter(|c| !c.is_noop()) {
            if let Some(old) = change.old.clone() {
                let action = DbClusterAction::DetachConfiguration(old);
                plan.push(
                    Step::new("detach configuration", move || {
                        Ok(self.client.cluster_action(id, &action)?)
                    })
                    .then_wait(self.settle(id, CanonicalStatus::Building), probe),
                );
            }
            if let Some(new) = change.new.clone() {
                let action = DbClusterAction::AttachConfiguration(new);
                plan.push(
                    Step::new("attach configuration", move || {
                        Ok(self.client.cluster_action(id, &action)?)
                    })
                    .then_wait(self.settle(id, CanonicalStatus::Building), probe),
                );
            }
        }

        if let Some(settings) = changes.auto_expand {
            plan.push(
                Step::new("update disk auto-expand", move || {
                    Ok(self.client.update_cluster_autoexpand(id, &settings)?)
                })
                .then_wait(self.settle(id, CanonicalStatus::Updating), probe),
            );
        }

        if let Some(capabilities) = changes.capabilities.as_ref() {
            let action = DbClusterAction::ApplyCapabilities(capabilities.clone());
            plan.push(Step::new("apply capabilities", move || {
                Ok(self.client.cluster_action(id, &action)?)
            }));
        }

        plan
    }
}

impl<C: DatabaseApi> Reconciler for DbClusterReconciler<C> {
    type Spec = DbClusterSpec;
    type Changes = DbClusterChanges;
    type State = DbCluster;

    fn create(&self, spec: &DbClusterSpec) -> Result<String> {
        if spec.layout.kind() != self.kind {
            return Err(ReconcileError::InvalidSpec(format!(
                "{} layout given to the {} reconciler",
                spec.layout.kind(),
                self.kind
            )));
        }
        let instances = spec.layout.expand();
        if instances.is_empty() {
            return Err(ReconcileError::InvalidSpec(format!(
                "cluster {} has no members",
                spec.name
            )));
        }
        for zone in instances.iter().filter_map(|i| i.availability_zone.as_deref()) {
            super::validate_availability_zone(zone)?;
        }

        let opts = DbClusterCreateOpts {
            name: spec.name.clone(),
            datastore: spec.datastore.clone(),
            instances,
            floating_ip_enabled: spec.floating_ip_enabled,
            auto_expand: spec.auto_expand,
            wal_auto_expand: spec.wal_auto_expand,
        };
        let id = self.client.create_cluster(&opts)?.id;
        info!(kind = %self.kind, id = %id, members = opts.instances.len(), "Cluster create accepted");

        let wait = settle_spec(self.kind, &id, CanonicalStatus::Building, &self.timeouts.create);
        wait_for(&wait, || self.probe(&id))?;

        let changes = DbClusterChanges {
            configuration: spec
                .configuration
                .clone()
                .map(|new| Change::new(None, Some(new))),
            auto_expand: None,
            capabilities: (!spec.capabilities.is_empty()).then(|| spec.capabilities.clone()),
        };
        run_steps(self.plan(&id, &changes))?;
        Ok(id)
    }

    fn read(&self, id: &str) -> Result<Option<DbCluster>> {
        found(self.client.get_cluster(id))
    }

    fn update(&self, id: &str, changes: &DbClusterChanges) -> Result<SequenceReport> {
        run_steps(self.plan(id, changes))
    }

    fn delete(&self, id: &str) -> Result<()> {
        if !issue_delete(self.kind, id, self.client.delete_cluster(id))? {
            return Ok(());
        }
        // Members drain away before the cluster itself does.
        let wait = gone_spec(self.kind, id, &self.timeouts.delete).direction(Direction::Shrink);
        wait_for(&wait, || self.probe(id))?;
        Ok(())
    }
}
