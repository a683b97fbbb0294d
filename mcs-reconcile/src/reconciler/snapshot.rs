//! Block-storage snapshot reconciler.

use std::collections::BTreeMap;

use tracing::info;

use super::{Reconciler, found, gone_spec, issue_delete, settle_spec};
use crate::clients::BlockStorageApi;
use crate::config::{KindTimeouts, Timeouts};
use crate::error::{ClientError, Result};
use crate::kind::{ManagedResource, RawState, ResourceKind};
use crate::model::{Snapshot, SnapshotCreateOpts, SnapshotUpdateOpts};
use crate::poller::{Observation, wait_for};
use crate::sequencer::{SequenceReport, Step, StepPlan, run_steps};
use crate::status::CanonicalStatus;

const KIND: ResourceKind = ResourceKind::Snapshot;

#[derive(Debug, Clone, Default)]
pub struct SnapshotChanges {
    pub attributes: SnapshotUpdateOpts,
    pub metadata: Option<BTreeMap<String, String>>,
}

pub struct SnapshotReconciler<C> {
    client: C,
    timeouts: KindTimeouts,
}

impl<C: BlockStorageApi> SnapshotReconciler<C> {
    pub fn new(client: C, timeouts: &Timeouts) -> Self {
        Self {
            client,
            timeouts: timeouts.snapshot,
        }
    }

    fn probe(&self, id: &str) -> std::result::Result<Observation, ClientError> {
        let snapshot = self.client.get_snapshot(id)?;
        Ok(Observation::Found(ManagedResource::new(id, RawState::Snapshot(snapshot))))
    }
}

impl<C: BlockStorageApi> Reconciler for SnapshotReconciler<C> {
    type Spec = SnapshotCreateOpts;
    type Changes = SnapshotChanges;
    type State = Snapshot;

    fn create(&self, opts: &SnapshotCreateOpts) -> Result<String> {
        let id = self.client.create_snapshot(opts)?.id;
        info!(id = %id, volume = %opts.volume_id, "Snapshot create accepted");

        let wait = settle_spec(KIND, &id, CanonicalStatus::Building, &self.timeouts.create);
        wait_for(&wait, || self.probe(&id))?;
        Ok(id)
    }

    fn read(&self, id: &str) -> Result<Option<Snapshot>> {
        found(self.client.get_snapshot(id))
    }

    /// Snapshot attribute changes take effect immediately; nothing to wait on.
    fn update(&self, id: &str, changes: &SnapshotChanges) -> Result<SequenceReport> {
        let mut plan = StepPlan::new();
        if !changes.attributes.is_empty() {
            plan.push(Step::new("update attributes", move || {
                Ok(self.client.update_snapshot(id, &changes.attributes)?)
            }));
        }
        if let Some(metadata) = changes.metadata.as_ref() {
            plan.push(Step::new("update metadata", move || {
                Ok(self.client.update_snapshot_metadata(id, metadata)?)
            }));
        }
        run_steps(plan)
    }

    fn delete(&self, id: &str) -> Result<()> {
        if !issue_delete(KIND, id, self.client.delete_snapshot(id))? {
            return Ok(());
        }
        wait_for(&gone_spec(KIND, id, &self.timeouts.delete), || self.probe(id))?;
        Ok(())
    }
}
