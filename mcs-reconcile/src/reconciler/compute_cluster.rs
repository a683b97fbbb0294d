//! Kubernetes cluster reconciler.

use tracing::info;

use super::{Reconciler, found, issue_delete, settle_spec, validate_availability_zone, wait_spec};
use crate::clients::ContainerInfraApi;
use crate::config::{KindTimeouts, Timeouts};
use crate::error::{ClientError, ReconcileError, Result};
use crate::kind::{ManagedResource, RawState, ResourceKind};
use crate::model::{ClusterCreateOpts, ClusterUpgradeOpts, ComputeCluster, ComputeClusterAction};
use crate::poller::{Observation, PollSpec, wait_for};
use crate::sequencer::{SequenceReport, Step, StepPlan, run_steps};
use crate::status::CanonicalStatus;

const KIND: ResourceKind = ResourceKind::ComputeCluster;

/// Requested power state of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Running,
    ShutOff,
}

#[derive(Debug, Clone, Default)]
pub struct ComputeClusterChanges {
    pub cluster_template_id: Option<String>,
    pub master_flavor: Option<String>,
    pub power: Option<PowerState>,
}

pub struct ComputeClusterReconciler<C> {
    client: C,
    timeouts: KindTimeouts,
}

/// Cluster names start with a letter and continue with `[a-zA-Z0-9_.-]`.
pub fn validate_cluster_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ReconcileError::InvalidSpec(format!(
            "invalid cluster name {name:?}: must start with a letter and contain only letters, digits, '_', '.', '-'"
        )))
    }
}

impl<C: ContainerInfraApi> ComputeClusterReconciler<C> {
    pub fn new(client: C, timeouts: &Timeouts) -> Self {
        Self {
            client,
            timeouts: timeouts.compute_cluster,
        }
    }

    fn probe(&self, id: &str) -> std::result::Result<Observation, ClientError> {
        let cluster = self.client.get_cluster(id)?;
        Ok(Observation::Found(ManagedResource::new(id, RawState::ComputeCluster(cluster))))
    }

    fn power_step<'a>(&'a self, id: &'a str, power: PowerState) -> Step<'a> {
        let timing = &self.timeouts.update;
        let (name, action, wait): (_, _, PollSpec) = match power {
            PowerState::Running => (
                "turn on cluster",
                ComputeClusterAction::turn_on(),
                wait_spec(
                    KIND,
                    id,
                    [CanonicalStatus::ShutOff, CanonicalStatus::Updating],
                    [CanonicalStatus::Active],
                    timing,
                ),
            ),
            PowerState::ShutOff => (
                "turn off cluster",
                ComputeClusterAction::turn_off(),
                wait_spec(
                    KIND,
                    id,
                    [CanonicalStatus::Active, CanonicalStatus::Updating],
                    [CanonicalStatus::ShutOff],
                    timing,
                ),
            ),
        };
        Step::new(name, move || Ok(self.client.cluster_action(id, &action)?))
            .then_wait(wait, move || self.probe(id))
    }
}

impl<C: ContainerInfraApi> Reconciler for ComputeClusterReconciler<C> {
    type Spec = ClusterCreateOpts;
    type Changes = ComputeClusterChanges;
    type State = ComputeCluster;

    fn create(&self, opts: &ClusterCreateOpts) -> Result<String> {
        validate_cluster_name(&opts.name)?;
        if let Some(zone) = opts.availability_zone.as_deref() {
            validate_availability_zone(zone)?;
        }

        let id = self.client.create_cluster(opts)?;
        info!(id = %id, name = %opts.name, "Kubernetes cluster create accepted");

        let wait = settle_spec(KIND, &id, CanonicalStatus::Building, &self.timeouts.create);
        wait_for(&wait, || self.probe(&id))?;
        Ok(id)
    }

    fn read(&self, id: &str) -> Result<Option<ComputeCluster>> {
        found(self.client.get_cluster(id))
    }

    /// Only a running or shut-off cluster accepts changes. A shut-off
    /// cluster is powered on before anything else is applied.
    fn update(&self, id: &str, changes: &ComputeClusterChanges) -> Result<SequenceReport> {
        let current = self
            .probe(id)?
            .status(Default::default());
        let current_power = match current {
            CanonicalStatus::Active => PowerState::Running,
            CanonicalStatus::ShutOff => PowerState::ShutOff,
            other => {
                return Err(ReconcileError::Unsupported(format!(
                    "cluster {id} is {other}, changes need RUNNING or SHUTOFF"
                )));
            }
        };

        let power = changes.power.filter(|p| *p != current_power);
        let has_spec_changes =
            changes.cluster_template_id.is_some() || changes.master_flavor.is_some();
        if current_power == PowerState::ShutOff
            && has_spec_changes
            && power != Some(PowerState::Running)
        {
            return Err(ReconcileError::Unsupported(format!(
                "cluster {id} is shut off, turn it on to upgrade or resize masters"
            )));
        }

        let timing = &self.timeouts.update;
        let mut plan = StepPlan::new();

        if power == Some(PowerState::Running) {
            plan.push(self.power_step(id, PowerState::Running));
        }

        if let Some(template) = changes.cluster_template_id.as_ref() {
            let opts = ClusterUpgradeOpts {
                cluster_template_id: template.clone(),
                rolling_enabled: true,
            };
            plan.push(
                Step::new("upgrade cluster template", move || {
                    Ok(self.client.upgrade_cluster(id, &opts)?)
                })
                .then_wait(settle_spec(KIND, id, CanonicalStatus::Updating, timing), move || {
                    self.probe(id)
                }),
            );
        }

        if let Some(flavor) = changes.master_flavor.as_deref() {
            let action = ComputeClusterAction::resize_masters(flavor);
            plan.push(
                Step::new("resize masters", move || {
                    Ok(self.client.cluster_action(id, &action)?)
                })
                .then_wait(settle_spec(KIND, id, CanonicalStatus::Updating, timing), move || {
                    self.probe(id)
                }),
            );
        }

        if power == Some(PowerState::ShutOff) {
            plan.push(self.power_step(id, PowerState::ShutOff));
        }

        run_steps(plan)
    }

    fn delete(&self, id: &str) -> Result<()> {
        if !issue_delete(KIND, id, self.client.delete_cluster(id))? {
            return Ok(());
        }
        let wait = wait_spec(
            KIND,
            id,
            [
                CanonicalStatus::Active,
                CanonicalStatus::ShutOff,
                CanonicalStatus::ShuttingDown,
            ],
            [CanonicalStatus::Deleted],
            &self.timeouts.delete,
        );
        wait_for(&wait, || self.probe(id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_name_validation() {
        assert!(validate_cluster_name("prod-k8s_1.a").is_ok());
        assert!(validate_cluster_name("").is_err());
        assert!(validate_cluster_name("1prod").is_err());
        assert!(validate_cluster_name("prod k8s").is_err());
        assert!(matches!(
            validate_cluster_name("-x"),
            Err(ReconcileError::InvalidSpec(_))
        ));
    }
}
