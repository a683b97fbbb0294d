//! Block-storage volume reconciler.

use tracing::info;

use super::{Reconciler, found, gone_spec, issue_delete, settle_spec, validate_availability_zone};
use crate::clients::BlockStorageApi;
use crate::config::{KindTimeouts, Timeouts};
use crate::error::{ClientError, ReconcileError, Result};
use crate::kind::{ManagedResource, RawState, ResourceKind};
use crate::model::{Volume, VolumeCreateOpts, VolumeRetypeOpts, VolumeUpdateOpts};
use crate::poller::{Observation, wait_for};
use crate::sequencer::{SequenceReport, Step, StepPlan, run_steps};
use crate::status::CanonicalStatus;

const KIND: ResourceKind = ResourceKind::Volume;

#[derive(Debug, Clone, Default)]
pub struct VolumeChanges {
    pub attributes: VolumeUpdateOpts,
    pub size: Option<u32>,
    /// Type and zone are retyped together in one call.
    pub volume_type: Option<String>,
    pub availability_zone: Option<String>,
}

pub struct VolumeReconciler<C> {
    client: C,
    timeouts: KindTimeouts,
}

impl<C: BlockStorageApi> VolumeReconciler<C> {
    pub fn new(client: C, timeouts: &Timeouts) -> Self {
        Self {
            client,
            timeouts: timeouts.volume,
        }
    }

    fn probe(&self, id: &str) -> std::result::Result<Observation, ClientError> {
        let volume = self.client.get_volume(id)?;
        Ok(Observation::Found(ManagedResource::new(id, RawState::Volume(volume))))
    }
}

/// Combined retype for whatever of type and zone actually changes.
fn retype(changes: &VolumeChanges, current: &Volume) -> Option<VolumeRetypeOpts> {
    let new_type = changes
        .volume_type
        .as_ref()
        .filter(|t| **t != current.volume_type);
    let new_zone = changes
        .availability_zone
        .as_ref()
        .filter(|z| **z != current.availability_zone);
    if new_type.is_none() && new_zone.is_none() {
        return None;
    }
    Some(VolumeRetypeOpts::new(
        new_type.unwrap_or(&current.volume_type).clone(),
        new_zone.cloned(),
    ))
}

impl<C: BlockStorageApi> Reconciler for VolumeReconciler<C> {
    type Spec = VolumeCreateOpts;
    type Changes = VolumeChanges;
    type State = Volume;

    fn create(&self, opts: &VolumeCreateOpts) -> Result<String> {
        validate_availability_zone(&opts.availability_zone)?;
        let id = self.client.create_volume(opts)?.id;
        info!(id = %id, size = opts.size, "Volume create accepted");

        let wait = settle_spec(KIND, &id, CanonicalStatus::Building, &self.timeouts.create);
        wait_for(&wait, || self.probe(&id))?;
        Ok(id)
    }

    fn read(&self, id: &str) -> Result<Option<Volume>> {
        found(self.client.get_volume(id))
    }

    fn update(&self, id: &str, changes: &VolumeChanges) -> Result<SequenceReport> {
        let current = self.client.get_volume(id)?;
        if let Some(zone) = changes.availability_zone.as_deref() {
            validate_availability_zone(zone)?;
        }
        let timing = &self.timeouts.update;
        let probe = move || self.probe(id);
        let mut plan = StepPlan::new();

        if !changes.attributes.is_empty() {
            plan.push(
                Step::new("update attributes", move || {
                    Ok(self.client.update_volume(id, &changes.attributes)?)
                })
                .then_wait(settle_spec(KIND, id, CanonicalStatus::Building, timing), probe),
            );
        }

        if let Some(size) = changes.size.filter(|s| *s != current.size) {
            if size < current.size {
                return Err(ReconcileError::InvalidSpec(format!(
                    "volume {id} cannot shrink from {} to {size}",
                    current.size
                )));
            }
            plan.push(
                Step::new("extend volume", move || {
                    Ok(self.client.extend_volume(id, size)?)
                })
                .then_wait(settle_spec(KIND, id, CanonicalStatus::Resizing, timing), probe),
            );
        }

        if let Some(opts) = retype(changes, &current) {
            plan.push(
                Step::new("retype volume", move || {
                    Ok(self.client.retype_volume(id, &opts)?)
                })
                .then_wait(settle_spec(KIND, id, CanonicalStatus::Updating, timing), probe),
            );
        }

        run_steps(plan)
    }

    fn delete(&self, id: &str) -> Result<()> {
        if !issue_delete(KIND, id, self.client.delete_volume(id))? {
            return Ok(());
        }
        wait_for(&gone_spec(KIND, id, &self.timeouts.delete), || self.probe(id))?;
        Ok(())
    }
}
