//! Databases inside an instance or cluster.

use tracing::info;

use super::{Reconciler, found, issue_delete, wait_spec};
use crate::clients::DatabaseApi;
use crate::config::{KindTimeouts, Timeouts};
use crate::error::{ClientError, ReconcileError, Result};
use crate::kind::{ManagedResource, RawState, ResourceKind};
use crate::model::{Database, DbmsType};
use crate::poller::{Observation, wait_for};
use crate::resolver::{Dbms, KindTable, SubResourceId, resolve_dbms};
use crate::sequencer::SequenceReport;
use crate::status::{CanonicalStatus, Direction};

const KIND: ResourceKind = ResourceKind::Database;

#[derive(Debug, Clone)]
pub struct DatabaseSpec {
    pub dbms_id: String,
    pub database: Database,
}

pub struct DatabaseReconciler<C> {
    client: C,
    kinds: KindTable<C>,
    timeouts: KindTimeouts,
}

impl<C: DatabaseApi> DatabaseReconciler<C> {
    pub fn new(client: C, timeouts: &Timeouts) -> Self {
        Self {
            client,
            kinds: KindTable::dbms(),
            timeouts: timeouts.dbms_entity,
        }
    }

    fn dbms(&self, id: &str) -> Result<Dbms> {
        resolve_dbms(&self.kinds, &self.client, id)
    }

    fn lookup(
        &self,
        dbms: DbmsType,
        sub: &SubResourceId,
    ) -> std::result::Result<Option<Database>, ClientError> {
        let databases = self.client.list_databases(dbms, &sub.dbms_id)?;
        Ok(databases.into_iter().find(|d| d.name == sub.name))
    }

    fn probe(
        &self,
        dbms: DbmsType,
        sub: &SubResourceId,
    ) -> std::result::Result<Observation, ClientError> {
        let database = self.lookup(dbms, sub)?;
        Ok(Observation::Found(ManagedResource::new(
            sub.to_string(),
            RawState::Database(database),
        )))
    }
}

impl<C: DatabaseApi> Reconciler for DatabaseReconciler<C> {
    type Spec = DatabaseSpec;
    type Changes = ();
    type State = Database;

    fn create(&self, spec: &DatabaseSpec) -> Result<String> {
        let dbms = self.dbms(&spec.dbms_id)?;
        dbms.ensure_supports_sub_resources()?;

        let sub = SubResourceId::new(dbms.id(), spec.database.name.clone());
        self.client.create_databases(
            dbms.dbms_type(),
            dbms.id(),
            std::slice::from_ref(&spec.database),
        )?;
        info!(id = %sub, "Database create accepted");

        let wait = wait_spec(
            KIND,
            &sub.to_string(),
            [CanonicalStatus::Building],
            [CanonicalStatus::Active],
            &self.timeouts.create,
        );
        wait_for(&wait, || self.probe(dbms.dbms_type(), &sub))?;
        Ok(sub.to_string())
    }

    fn read(&self, id: &str) -> Result<Option<Database>> {
        let sub: SubResourceId = id.parse()?;
        let dbms = match self.dbms(&sub.dbms_id) {
            Ok(dbms) => dbms,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(found(self.lookup(dbms.dbms_type(), &sub))?.flatten())
    }

    fn update(&self, id: &str, _changes: &()) -> Result<SequenceReport> {
        Err(ReconcileError::Unsupported(format!(
            "database {id} cannot be changed in place"
        )))
    }

    fn delete(&self, id: &str) -> Result<()> {
        let sub: SubResourceId = id.parse()?;
        let dbms = match self.dbms(&sub.dbms_id) {
            Ok(dbms) => dbms,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        let dbms_type = dbms.dbms_type();

        let deleted = self.client.delete_database(dbms_type, &sub.dbms_id, &sub.name);
        if !issue_delete(KIND, id, deleted)? {
            return Ok(());
        }

        let wait = wait_spec(
            KIND,
            id,
            [CanonicalStatus::Active],
            [CanonicalStatus::Deleted],
            &self.timeouts.delete,
        )
        .direction(Direction::Shrink);
        wait_for(&wait, || self.probe(dbms_type, &sub))?;
        Ok(())
    }
}
