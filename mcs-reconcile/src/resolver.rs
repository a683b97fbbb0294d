//! Resource kind resolution for opaque identifiers.
//!
//! Databases and users are addressed as `<dbms_id>/<name>` with no hint
//! whether `dbms_id` is a single instance or a cluster. The resolver probes
//! each kind in table order and reports which one answered.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::clients::DatabaseApi;
use crate::error::{ClientError, ReconcileError, Result};
use crate::kind::{ManagedResource, RawState, ResourceKind};
use crate::model::{Datastore, DbCluster, DbmsType, Instance};

type Lookup<C> = fn(&C, &str) -> std::result::Result<RawState, ClientError>;

/// Ordered `(kind, lookup)` entries. Built once, passed by reference.
pub struct KindTable<C> {
    entries: Vec<(ResourceKind, Lookup<C>)>,
}

impl<C> KindTable<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, kind: ResourceKind, lookup: Lookup<C>) -> Self {
        self.entries.push((kind, lookup));
        self
    }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.entries.iter().map(|(kind, _)| *kind).collect()
    }
}

impl<C> Default for KindTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: DatabaseApi> KindTable<C> {
    /// Instance first, then cluster.
    pub fn dbms() -> Self {
        Self::new()
            .with(ResourceKind::Instance, |client, id| {
                client.get_instance(id).map(RawState::Instance)
            })
            .with(ResourceKind::Cluster, |client, id| {
                client.get_cluster(id).map(RawState::db_cluster)
            })
    }
}

/// How many kinds may answer for one identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Resolution {
    /// Stop at the first kind that answers.
    #[default]
    FirstMatch,
    /// Probe every kind; more than one answer is an error.
    Exclusive,
}

pub struct Resolver<'t, C> {
    table: &'t KindTable<C>,
    resolution: Resolution,
}

impl<'t, C> Resolver<'t, C> {
    pub fn new(table: &'t KindTable<C>) -> Self {
        Self {
            table,
            resolution: Resolution::default(),
        }
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Find the kind `id` names.
    ///
    /// A 404 moves on to the next kind. Any other error is returned at
    /// once; a transport failure never reads as "wrong kind".
    pub fn resolve(&self, client: &C, id: &str) -> Result<ManagedResource> {
        let mut found: Vec<(ResourceKind, RawState)> = Vec::new();

        for (kind, lookup) in &self.table.entries {
            match lookup(client, id) {
                Ok(raw) => {
                    debug!(id, %kind, "Identifier resolved");
                    found.push((*kind, raw));
                    if self.resolution == Resolution::FirstMatch {
                        break;
                    }
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        match found.len() {
            0 => Err(ReconcileError::NoSuchKind {
                id: id.to_string(),
                kinds: self.table.kinds(),
            }),
            1 => {
                let (_, raw) = found.remove(0);
                Ok(ManagedResource::new(id, raw))
            }
            _ => Err(ReconcileError::AmbiguousKind {
                id: id.to_string(),
                kinds: found.iter().map(|(kind, _)| *kind).collect(),
            }),
        }
    }
}

/// A resolved database management system.
#[derive(Debug, Clone)]
pub enum Dbms {
    Instance(Instance),
    Cluster(DbCluster),
}

impl Dbms {
    pub fn from_resource(resource: ManagedResource) -> Result<Self> {
        match resource.raw {
            RawState::Instance(instance) => Ok(Dbms::Instance(instance)),
            RawState::Cluster(cluster) | RawState::ShardedCluster(cluster) => {
                Ok(Dbms::Cluster(cluster))
            }
            other => Err(ReconcileError::Unsupported(format!(
                "{} {} is not a DBMS",
                other.kind(),
                resource.id
            ))),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Dbms::Instance(instance) => &instance.id,
            Dbms::Cluster(cluster) => &cluster.id,
        }
    }

    pub fn dbms_type(&self) -> DbmsType {
        match self {
            Dbms::Instance(_) => DbmsType::Instance,
            Dbms::Cluster(_) => DbmsType::Cluster,
        }
    }

    pub fn datastore(&self) -> Option<&Datastore> {
        match self {
            Dbms::Instance(instance) => instance.datastore.as_ref(),
            Dbms::Cluster(cluster) => cluster.datastore.as_ref(),
        }
    }

    /// Redis datastores and replicas have no databases or users.
    pub fn ensure_supports_sub_resources(&self) -> Result<()> {
        if self.datastore().is_some_and(Datastore::is_redis) {
            return Err(ReconcileError::Unsupported(format!(
                "databases and users are not available for redis datastore {}",
                self.id()
            )));
        }
        if let Dbms::Instance(Instance {
            replica_of: Some(primary),
            ..
        }) = self
        {
            return Err(ReconcileError::Unsupported(format!(
                "instance {} is a replica of {}",
                self.id(),
                primary.id
            )));
        }
        Ok(())
    }
}

/// Resolve `id` against a DBMS table and unwrap the variant.
pub fn resolve_dbms<C: DatabaseApi>(table: &KindTable<C>, client: &C, id: &str) -> Result<Dbms> {
    let resource = Resolver::new(table).resolve(client, id)?;
    Dbms::from_resource(resource)
}

/// `<dbms_id>/<name>` identifier of a database or user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResourceId {
    pub dbms_id: String,
    pub name: String,
}

impl SubResourceId {
    pub fn new(dbms_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            dbms_id: dbms_id.into(),
            name: name.into(),
        }
    }
}

impl FromStr for SubResourceId {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((dbms_id, name)) if !dbms_id.is_empty() && !name.is_empty() => {
                Ok(Self::new(dbms_id, name))
            }
            _ => Err(ReconcileError::InvalidId(format!(
                "{s}: expected <dbms_id>/<name>"
            ))),
        }
    }
}

impl fmt::Display for SubResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dbms_id, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lookup target keyed by id prefix.
    struct Backend;

    fn answers(id: &str, prefix: &str) -> std::result::Result<(), ClientError> {
        if id.starts_with("boom") {
            return Err(ClientError::Http {
                status: 502,
                method: "GET".to_string(),
                url: id.to_string(),
                body: String::new(),
            });
        }
        if id.starts_with(prefix) || id.starts_with("both") {
            Ok(())
        } else {
            Err(ClientError::NotFound {
                method: "GET".to_string(),
                url: id.to_string(),
                body: String::new(),
            })
        }
    }

    fn instance(id: &str) -> Instance {
        Instance {
            id: id.to_string(),
            name: String::new(),
            status: "ACTIVE".to_string(),
            datastore: None,
            flavor: None,
            volume: None,
            replica_of: None,
            configuration: None,
            created: None,
            updated: None,
        }
    }

    fn cluster(id: &str) -> DbCluster {
        DbCluster {
            id: id.to_string(),
            name: String::new(),
            datastore: None,
            task: None,
            instances: Vec::new(),
            configuration_id: None,
            created: None,
            updated: None,
        }
    }

    fn table() -> KindTable<Backend> {
        KindTable::new()
            .with(ResourceKind::Instance, |_, id| {
                answers(id, "inst").map(|()| RawState::Instance(instance(id)))
            })
            .with(ResourceKind::Cluster, |_, id| {
                answers(id, "clu").map(|()| RawState::db_cluster(cluster(id)))
            })
    }

    #[test]
    fn test_first_match_in_table_order() {
        let table = table();
        let resolved = Resolver::new(&table).resolve(&Backend, "clu-1").unwrap();
        assert_eq!(resolved.kind(), ResourceKind::Cluster);

        let resolved = Resolver::new(&table).resolve(&Backend, "both-1").unwrap();
        assert_eq!(resolved.kind(), ResourceKind::Instance);
    }

    #[test]
    fn test_exclusive_rejects_two_answers() {
        let table = table();
        let err = Resolver::new(&table)
            .resolution(Resolution::Exclusive)
            .resolve(&Backend, "both-1")
            .unwrap_err();
        match err {
            ReconcileError::AmbiguousKind { kinds, .. } => {
                assert_eq!(kinds, vec![ResourceKind::Instance, ResourceKind::Cluster]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_no_kind_answers() {
        let table = table();
        let err = Resolver::new(&table).resolve(&Backend, "x-1").unwrap_err();
        assert!(matches!(err, ReconcileError::NoSuchKind { .. }));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_transport_error_fails_fast() {
        let table = table();
        let err = Resolver::new(&table).resolve(&Backend, "boom").unwrap_err();
        assert!(matches!(err, ReconcileError::Transport(ClientError::Http { status: 502, .. })));
    }

    #[test]
    fn test_dbms_refuses_replicas_and_redis() {
        let mut replica = instance("inst-2");
        replica.replica_of = Some(crate::model::Link {
            id: "inst-1".to_string(),
        });
        assert!(matches!(
            Dbms::Instance(replica).ensure_supports_sub_resources(),
            Err(ReconcileError::Unsupported(_))
        ));

        let mut redis = cluster("clu-1");
        redis.datastore = Some(Datastore {
            kind: "redis".to_string(),
            version: "5".to_string(),
        });
        assert!(Dbms::Cluster(redis).ensure_supports_sub_resources().is_err());
        assert!(Dbms::Instance(instance("inst-1")).ensure_supports_sub_resources().is_ok());
    }

    #[test]
    fn test_sub_resource_id_parsing() {
        let id: SubResourceId = "inst-1/app".parse().unwrap();
        assert_eq!(id, SubResourceId::new("inst-1", "app"));
        assert_eq!(id.to_string(), "inst-1/app");

        let id: SubResourceId = "inst-1/a/b".parse().unwrap();
        assert_eq!(id.name, "a/b");

        assert!("inst-1".parse::<SubResourceId>().is_err());
        assert!("/app".parse::<SubResourceId>().is_err());
        assert!("inst-1/".parse::<SubResourceId>().is_err());
    }
}
