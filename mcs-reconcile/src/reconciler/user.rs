//! Database users and their database grants.

use tracing::info;

use super::{Reconciler, found, issue_delete, wait_spec};
use crate::clients::DatabaseApi;
use crate::config::{KindTimeouts, Timeouts, WaitTiming};
use crate::delta::compute_delta;
use crate::error::{ClientError, ReconcileError, Result};
use crate::kind::{ManagedResource, RawState, ResourceKind};
use crate::model::{DatabaseRef, DbmsType, User, UserCreateOpts, UserUpdateOpts};
use crate::poller::{Observation, PollSpec, wait_for};
use crate::resolver::{Dbms, KindTable, SubResourceId, resolve_dbms};
use crate::sequencer::{SequenceReport, Step, StepPlan, run_steps};
use crate::status::{CanonicalStatus, Direction};

const KIND: ResourceKind = ResourceKind::User;

#[derive(Debug, Clone)]
pub struct UserSpec {
    pub dbms_id: String,
    pub name: String,
    pub password: String,
    pub host: Option<String>,
    pub databases: Vec<String>,
}

/// Requested user changes. `databases` is the full desired grant list.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub databases: Option<Vec<String>>,
    pub name: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
}

pub struct UserReconciler<C> {
    client: C,
    kinds: KindTable<C>,
    timeouts: KindTimeouts,
}

fn refs(names: &[String]) -> Vec<DatabaseRef> {
    names
        .iter()
        .map(|name| DatabaseRef { name: name.clone() })
        .collect()
}

impl<C: DatabaseApi> UserReconciler<C> {
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
    ) -> std::result::Result<Option<User>, ClientError> {
        let users = self.client.list_users(dbms, &sub.dbms_id)?;
        Ok(users.into_iter().find(|u| u.name == sub.name))
    }

    fn probe(
        &self,
        dbms: DbmsType,
        sub: &SubResourceId,
    ) -> std::result::Result<Observation, ClientError> {
        let user = self.lookup(dbms, sub)?;
        Ok(Observation::Found(ManagedResource::new(
            sub.to_string(),
            RawState::User(user),
        )))
    }

    fn present(sub: &SubResourceId, timing: &WaitTiming) -> PollSpec {
        wait_spec(
            KIND,
            &sub.to_string(),
            [CanonicalStatus::Building],
            [CanonicalStatus::Active],
            timing,
        )
    }
}

impl<C: DatabaseApi> Reconciler for UserReconciler<C> {
    type Spec = UserSpec;
    type Changes = UserChanges;
    type State = User;

    fn create(&self, spec: &UserSpec) -> Result<String> {
        let dbms = self.dbms(&spec.dbms_id)?;
        dbms.ensure_supports_sub_resources()?;

        let opts = UserCreateOpts {
            name: spec.name.clone(),
            password: spec.password.clone(),
            host: spec.host.clone(),
            databases: refs(&spec.databases),
        };
        self.client
            .create_users(dbms.dbms_type(), dbms.id(), std::slice::from_ref(&opts))?;

        let sub = SubResourceId::new(dbms.id(), spec.name.clone());
        info!(id = %sub, "User create accepted");

        let wait = Self::present(&sub, &self.timeouts.create);
        wait_for(&wait, || self.probe(dbms.dbms_type(), &sub))?;
        Ok(sub.to_string())
    }

    fn read(&self, id: &str) -> Result<Option<User>> {
        let sub: SubResourceId = id.parse()?;
        let dbms = match self.dbms(&sub.dbms_id) {
            Ok(dbms) => dbms,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(found(self.lookup(dbms.dbms_type(), &sub))?.flatten())
    }

    /// Grants first (revokes before the batched grant), then the user's
    /// own attributes, waited on under the new name.
    fn update(&self, id: &str, changes: &UserChanges) -> Result<SequenceReport> {
        let sub: SubResourceId = id.parse()?;
        let dbms_type = self.dbms(&sub.dbms_id)?.dbms_type();
        let timing = &self.timeouts.update;
        let mut plan = StepPlan::new();

        if let Some(desired) = changes.databases.as_ref() {
            let observed = self
                .lookup(dbms_type, &sub)?
                .ok_or_else(|| ReconcileError::NotFound {
                    kind: KIND,
                    id: id.to_string(),
                })?
                .database_names();
            let delta = compute_delta(desired, &observed);

            let revoke_only = delta.to_add.is_empty();
            if !delta.to_remove.is_empty() {
                let sub = &sub;
                let to_remove = delta.to_remove.clone();
                let mut step = Step::new("revoke databases", move || {
                    for database in &to_remove {
                        self.client
                            .revoke_database(dbms_type, &sub.dbms_id, &sub.name, database)?;
                    }
                    Ok(())
                });
                // The membership change settles on the last membership step.
                if revoke_only {
                    step = step.then_wait(Self::present(sub, timing), move || {
                        self.probe(dbms_type, sub)
                    });
                }
                plan.push(step);
            }
            if !revoke_only {
                let grants = refs(&delta.to_add);
                let sub_ref = &sub;
                plan.push(
                    Step::new("grant databases", move || {
                        Ok(self.client.grant_databases(
                            dbms_type,
                            &sub_ref.dbms_id,
                            &sub_ref.name,
                            &grants,
                        )?)
                    })
                    .then_wait(Self::present(sub_ref, timing), move || {
                        self.probe(dbms_type, sub_ref)
                    }),
                );
            }
        }

        let opts = UserUpdateOpts {
            name: changes.name.clone().filter(|n| *n != sub.name),
            password: changes.password.clone(),
            host: changes.host.clone(),
        };
        if !opts.is_empty() {
            let renamed = SubResourceId::new(
                sub.dbms_id.clone(),
                opts.name.clone().unwrap_or_else(|| sub.name.clone()),
            );
            let wait = Self::present(&renamed, timing);
            let sub = &sub;
            plan.push(
                Step::new("update user", move || {
                    Ok(self
                        .client
                        .update_user(dbms_type, &sub.dbms_id, &sub.name, &opts)?)
                })
                .then_wait(wait, move || self.probe(dbms_type, &renamed)),
            );
        }

        run_steps(plan)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let sub: SubResourceId = id.parse()?;
        let dbms = match self.dbms(&sub.dbms_id) {
            Ok(dbms) => dbms,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        let dbms_type = dbms.dbms_type();

        let deleted = self.client.delete_user(dbms_type, &sub.dbms_id, &sub.name);
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
