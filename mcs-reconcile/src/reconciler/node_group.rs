//! Kubernetes node group reconciler.
//!
//! Node group operations are carried out by the parent cluster, so every
//! wait here polls the cluster through `RECONCILING` back to `RUNNING`.

use tracing::info;

use super::{Reconciler, found, issue_delete, settle_spec};
use crate::clients::ContainerInfraApi;
use crate::config::{KindTimeouts, Timeouts, WaitTiming};
use crate::delta::{NaturalKey, PatchOp, scale_delta};
use crate::error::{ClientError, ReconcileError, Result};
use crate::kind::{ManagedResource, RawState, ResourceKind};
use crate::model::{NodeGroup, NodeGroupCreateOpts, NodeGroupLabel, NodeGroupScaleOpts, NodeGroupTaint};
use crate::poller::{Observation, PollSpec, wait_for};
use crate::sequencer::{SequenceReport, Step, StepPlan, run_steps};
use crate::status::CanonicalStatus;

#[derive(Debug, Clone, Default)]
pub struct NodeGroupChanges {
    pub node_count: Option<u32>,
    pub max_nodes: Option<u32>,
    pub min_nodes: Option<u32>,
    pub autoscaling_enabled: Option<bool>,
    pub labels: Option<Vec<NodeGroupLabel>>,
    pub taints: Option<Vec<NodeGroupTaint>>,
}

/// JSON-patch ops for the node group fields that actually change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeGroupPatch {
    ops: Vec<PatchOp>,
}

impl NodeGroupPatch {
    pub fn plan(changes: &NodeGroupChanges, current: &NodeGroup) -> Self {
        let labels = changes.labels.as_deref().map(sorted_by_key);
        let taints = changes.taints.as_deref().map(sorted_by_key);
        let current_labels = sorted_by_key(&current.labels);
        let current_taints = sorted_by_key(&current.taints);

        let ops = [
            PatchOp::replace_if_changed("/max_nodes", changes.max_nodes.as_ref(), &current.max_nodes),
            PatchOp::replace_if_changed("/min_nodes", changes.min_nodes.as_ref(), &current.min_nodes),
            // The backend takes the autoscaling flag as a string.
            PatchOp::replace_if_changed(
                "/autoscaling_enabled",
                changes.autoscaling_enabled.map(|v| v.to_string()).as_ref(),
                &current.autoscaling_enabled.to_string(),
            ),
            PatchOp::replace_if_changed("/labels", labels.as_ref(), &current_labels),
            PatchOp::replace_if_changed("/taints", taints.as_ref(), &current_taints),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self { ops }
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

fn sorted_by_key<T: NaturalKey<Key = String> + Clone>(items: &[T]) -> Vec<T> {
    let mut sorted = items.to_vec();
    sorted.sort_by_key(NaturalKey::natural_key);
    sorted
}

fn validate_bounds(min_nodes: u32, max_nodes: u32) -> Result<()> {
    if min_nodes > max_nodes {
        return Err(ReconcileError::InvalidSpec(format!(
            "min_nodes {min_nodes} is greater than max_nodes {max_nodes}"
        )));
    }
    Ok(())
}

pub struct NodeGroupReconciler<C> {
    client: C,
    timeouts: KindTimeouts,
}

impl<C: ContainerInfraApi> NodeGroupReconciler<C> {
    pub fn new(client: C, timeouts: &Timeouts) -> Self {
        Self {
            client,
            timeouts: timeouts.node_group,
        }
    }

    fn probe_cluster(&self, cluster_id: &str) -> std::result::Result<Observation, ClientError> {
        let cluster = self.client.get_cluster(cluster_id)?;
        Ok(Observation::Found(ManagedResource::new(
            cluster_id,
            RawState::ComputeCluster(cluster),
        )))
    }

    fn cluster_settles(cluster_id: &str, timing: &WaitTiming) -> PollSpec {
        settle_spec(
            ResourceKind::ComputeCluster,
            cluster_id,
            CanonicalStatus::Updating,
            timing,
        )
    }
}

impl<C: ContainerInfraApi> Reconciler for NodeGroupReconciler<C> {
    type Spec = NodeGroupCreateOpts;
    type Changes = NodeGroupChanges;
    type State = NodeGroup;

    fn create(&self, opts: &NodeGroupCreateOpts) -> Result<String> {
        validate_bounds(opts.min_nodes, opts.max_nodes)?;

        let id = self.client.create_node_group(opts)?;
        info!(id = %id, cluster = %opts.cluster_id, "Node group create accepted");

        let wait = Self::cluster_settles(&opts.cluster_id, &self.timeouts.create);
        wait_for(&wait, || self.probe_cluster(&opts.cluster_id))?;
        Ok(id)
    }

    fn read(&self, id: &str) -> Result<Option<NodeGroup>> {
        found(self.client.get_node_group(id))
    }

    /// Scale first, then one patch for everything else.
    fn update(&self, id: &str, changes: &NodeGroupChanges) -> Result<SequenceReport> {
        let current = self.client.get_node_group(id)?;
        validate_bounds(
            changes.min_nodes.unwrap_or(current.min_nodes),
            changes.max_nodes.unwrap_or(current.max_nodes),
        )?;

        let cluster_id = current.cluster_id.as_str();
        let timing = &self.timeouts.update;
        let probe = move || self.probe_cluster(cluster_id);
        let mut plan = StepPlan::new();

        let delta = changes
            .node_count
            .map_or(0, |desired| scale_delta(desired, current.node_count));
        if delta != 0 {
            let opts = NodeGroupScaleOpts {
                delta,
                rollback: None,
            };
            plan.push(
                Step::new("scale node group", move || {
                    Ok(self.client.scale_node_group(id, &opts)?)
                })
                .then_wait(Self::cluster_settles(cluster_id, timing), probe),
            );
        }

        let patch = NodeGroupPatch::plan(changes, &current);
        if !patch.is_empty() {
            plan.push(
                Step::new("patch node group", move || {
                    Ok(self.client.patch_node_group(id, patch.ops())?)
                })
                .then_wait(Self::cluster_settles(cluster_id, timing), probe),
            );
        }

        run_steps(plan)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let Some(group) = found(self.client.get_node_group(id))? else {
            return Ok(());
        };
        if !issue_delete(ResourceKind::NodeGroup, id, self.client.delete_node_group(id))? {
            return Ok(());
        }
        let wait = Self::cluster_settles(&group.cluster_id, &self.timeouts.delete);
        wait_for(&wait, || self.probe_cluster(&group.cluster_id))?;
        Ok(())
    }
}
