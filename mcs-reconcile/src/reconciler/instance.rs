//! Single-node database instance reconciler.

use std::cell::RefCell;

use tracing::info;

use super::{Change, Reconciler, found, gone_spec, issue_delete, settle_spec};
use crate::clients::DatabaseApi;
use crate::config::{KindTimeouts, Timeouts};
use crate::error::{ClientError, Result};
use crate::kind::{ManagedResource, RawState, ResourceKind};
use crate::model::{
    AutoExpand, AutoExpandTarget, Capability, DbmsType, Instance, InstanceAction,
    InstanceCreateOpts, RootUser, RootUserEnableOpts,
};
use crate::poller::{Observation, wait_for};
use crate::sequencer::{SequenceReport, Step, StepPlan, run_steps};
use crate::status::CanonicalStatus;

const KIND: ResourceKind = ResourceKind::Instance;

#[derive(Debug, Clone)]
pub struct InstanceSpec {
    pub opts: InstanceCreateOpts,
    pub root_enabled: bool,
    /// Generated by the backend when absent.
    pub root_password: Option<String>,
    pub auto_expand: Option<AutoExpand>,
}

/// Requested instance changes. `None` leaves an attribute alone.
#[derive(Debug, Clone, Default)]
pub struct InstanceChanges {
    /// Old and new configuration group; either side may be absent.
    pub configuration: Option<Change<Option<String>>>,
    pub volume_size: Option<u32>,
    pub flavor_ref: Option<String>,
    pub detach_replica: bool,
    pub root_enabled: Option<bool>,
    pub root_password: Option<String>,
    pub auto_expand: Option<AutoExpand>,
    pub wal_volume_size: Option<u32>,
    pub wal_auto_expand: Option<AutoExpand>,
    /// Resubmitted in full; applying is idempotent on the backend.
    pub capabilities: Option<Vec<Capability>>,
}

pub struct InstanceReconciler<C> {
    client: C,
    timeouts: KindTimeouts,
}

impl<C: DatabaseApi> InstanceReconciler<C> {
    pub fn new(client: C, timeouts: &Timeouts) -> Self {
        Self {
            client,
            timeouts: timeouts.dbms,
        }
    }

    fn probe(&self, id: &str) -> std::result::Result<Observation, ClientError> {
        let instance = self.client.get_instance(id)?;
        Ok(Observation::Found(ManagedResource::new(id, RawState::Instance(instance))))
    }

    fn settle(&self, id: &str, pending: CanonicalStatus) -> crate::poller::PollSpec {
        settle_spec(KIND, id, pending, &self.timeouts.update)
    }

    fn plan<'a>(
        &'a self,
        id: &'a str,
        changes: &'a InstanceChanges,
        root_user: &'a RefCell<Option<RootUser>>,
    ) -> StepPlan<'a> {
        let mut plan = StepPlan::new();
        let probe = move || self.probe(id);

        if let Some(change) = changes.configuration.as_ref().filter(|c| !c.is_noop()) {
            if change.old.is_some() {
                plan.push(
                    Step::new("detach configuration", move || {
                        Ok(self.client.set_instance_configuration(id, None)?)
                    })
                    .then_wait(self.settle(id, CanonicalStatus::Building), probe),
                );
            }
            if let Some(new) = change.new.as_deref() {
                plan.push(
                    Step::new("attach configuration", move || {
                        Ok(self.client.set_instance_configuration(id, Some(new))?)
                    })
                    .then_wait(self.settle(id, CanonicalStatus::Building), probe),
                );
            }
        }

        if let Some(size) = changes.volume_size {
            plan.push(
                Step::new("resize volume", move || {
                    Ok(self.client.instance_action(id, &InstanceAction::ResizeVolume { size })?)
                })
                .then_wait(self.settle(id, CanonicalStatus::Resizing), probe),
            );
        }

        if let Some(flavor_ref) = changes.flavor_ref.as_ref() {
            let action = InstanceAction::ResizeFlavor {
                flavor_ref: flavor_ref.clone(),
            };
            plan.push(
                Step::new("resize flavor", move || {
                    Ok(self.client.instance_action(id, &action)?)
                })
                .then_wait(self.settle(id, CanonicalStatus::Resizing), probe),
            );
        }

        if changes.detach_replica {
            plan.push(
                Step::new("detach replica", move || Ok(self.client.detach_replica(id)?))
                    .then_wait(self.settle(id, CanonicalStatus::Detaching), probe),
            );
        }

        if let Some(enabled) = changes.root_enabled {
            let opts = RootUserEnableOpts {
                password: changes.root_password.clone(),
            };
            plan.push(Step::new("set root user", move || {
                if enabled {
                    let user = self.client.enable_root(DbmsType::Instance, id, &opts)?;
                    root_user.replace(Some(user));
                } else {
                    self.client.disable_root(DbmsType::Instance, id)?;
                }
                Ok(())
            }));
        }

        if let Some(settings) = changes.auto_expand {
            plan.push(
                Step::new("update disk auto-expand", move || {
                    Ok(self
                        .client
                        .update_instance_autoexpand(id, AutoExpandTarget::Data, &settings)?)
                })
                .then_wait(self.settle(id, CanonicalStatus::Building), probe),
            );
        }

        if let Some(size) = changes.wal_volume_size {
            plan.push(
                Step::new("resize wal volume", move || {
                    Ok(self
                        .client
                        .instance_action(id, &InstanceAction::ResizeWalVolume { size })?)
                })
                .then_wait(self.settle(id, CanonicalStatus::Resizing), probe),
            );
        }

        if let Some(settings) = changes.wal_auto_expand {
            plan.push(Step::new("update wal auto-expand", move || {
                Ok(self
                    .client
                    .update_instance_autoexpand(id, AutoExpandTarget::Wal, &settings)?)
            }));
        }

        if let Some(capabilities) = changes.capabilities.as_ref() {
            let action = InstanceAction::ApplyCapabilities(capabilities.clone());
            plan.push(Step::new("apply capabilities", move || {
                Ok(self.client.instance_action(id, &action)?)
            }));
        }

        plan
    }

    fn run(&self, id: &str, changes: &InstanceChanges) -> Result<SequenceReport> {
        let root_user = RefCell::new(None);
        let mut report = run_steps(self.plan(id, changes, &root_user))?;
        report.root_user = root_user.into_inner();
        Ok(report)
    }

    /// Create the instance and apply its post-create settings. The report
    /// carries the root credentials when root was enabled.
    pub fn create_instance(&self, spec: &InstanceSpec) -> Result<(String, SequenceReport)> {
        if let Some(zone) = spec.opts.availability_zone.as_deref() {
            super::validate_availability_zone(zone)?;
        }

        let instance = self.client.create_instance(&spec.opts)?;
        let id = instance.id;
        info!(id = %id, name = %spec.opts.name, "Database instance create accepted");

        let wait = settle_spec(KIND, &id, CanonicalStatus::Building, &self.timeouts.create);
        wait_for(&wait, || self.probe(&id))?;

        let changes = InstanceChanges {
            root_enabled: spec.root_enabled.then_some(true),
            root_password: spec.root_password.clone(),
            auto_expand: spec.auto_expand,
            ..Default::default()
        };
        let report = self.run(&id, &changes)?;
        Ok((id, report))
    }
}

impl<C: DatabaseApi> Reconciler for InstanceReconciler<C> {
    type Spec = InstanceSpec;
    type Changes = InstanceChanges;
    type State = Instance;

    fn create(&self, spec: &InstanceSpec) -> Result<String> {
        self.create_instance(spec).map(|(id, _)| id)
    }

    fn read(&self, id: &str) -> Result<Option<Instance>> {
        found(self.client.get_instance(id))
    }

    fn update(&self, id: &str, changes: &InstanceChanges) -> Result<SequenceReport> {
        self.run(id, changes)
    }

    fn delete(&self, id: &str) -> Result<()> {
        if !issue_delete(KIND, id, self.client.delete_instance(id))? {
            return Ok(());
        }
        wait_for(&gone_spec(KIND, id, &self.timeouts.delete), || self.probe(id))?;
        Ok(())
    }
}
