//! Client for the database-as-a-service API.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::RestClient;
use crate::error::ClientError;
use crate::model::{
    AutoExpand, AutoExpandTarget, Database, DatabaseRef, DbCluster, DbClusterAction,
    DbClusterCreateOpts, DbmsType, Instance, InstanceAction, InstanceCreateOpts, RootUser,
    RootUserEnableOpts, User, UserCreateOpts, UserUpdateOpts,
};

/// Operations on database instances, clusters and their databases/users.
pub trait DatabaseApi {
    fn get_instance(&self, id: &str) -> Result<Instance, ClientError>;
    fn create_instance(&self, opts: &InstanceCreateOpts) -> Result<Instance, ClientError>;
    fn delete_instance(&self, id: &str) -> Result<(), ClientError>;
    fn instance_action(&self, id: &str, action: &InstanceAction) -> Result<(), ClientError>;
    fn detach_replica(&self, id: &str) -> Result<(), ClientError>;
    /// `None` detaches the current configuration group.
    fn set_instance_configuration(
        &self,
        id: &str,
        configuration: Option<&str>,
    ) -> Result<(), ClientError>;
    fn update_instance_autoexpand(
        &self,
        id: &str,
        target: AutoExpandTarget,
        settings: &AutoExpand,
    ) -> Result<(), ClientError>;

    fn get_cluster(&self, id: &str) -> Result<DbCluster, ClientError>;
    fn create_cluster(&self, opts: &DbClusterCreateOpts) -> Result<DbCluster, ClientError>;
    fn delete_cluster(&self, id: &str) -> Result<(), ClientError>;
    fn cluster_action(&self, id: &str, action: &DbClusterAction) -> Result<(), ClientError>;
    fn update_cluster_autoexpand(&self, id: &str, settings: &AutoExpand)
    -> Result<(), ClientError>;

    fn enable_root(
        &self,
        dbms: DbmsType,
        id: &str,
        opts: &RootUserEnableOpts,
    ) -> Result<RootUser, ClientError>;
    fn disable_root(&self, dbms: DbmsType, id: &str) -> Result<(), ClientError>;

    fn list_databases(&self, dbms: DbmsType, id: &str) -> Result<Vec<Database>, ClientError>;
    fn create_databases(
        &self,
        dbms: DbmsType,
        id: &str,
        databases: &[Database],
    ) -> Result<(), ClientError>;
    fn delete_database(&self, dbms: DbmsType, id: &str, name: &str) -> Result<(), ClientError>;

    fn list_users(&self, dbms: DbmsType, id: &str) -> Result<Vec<User>, ClientError>;
    fn create_users(
        &self,
        dbms: DbmsType,
        id: &str,
        users: &[UserCreateOpts],
    ) -> Result<(), ClientError>;
    fn update_user(
        &self,
        dbms: DbmsType,
        id: &str,
        name: &str,
        opts: &UserUpdateOpts,
    ) -> Result<(), ClientError>;
    fn delete_user(&self, dbms: DbmsType, id: &str, name: &str) -> Result<(), ClientError>;
    fn grant_databases(
        &self,
        dbms: DbmsType,
        id: &str,
        user: &str,
        databases: &[DatabaseRef],
    ) -> Result<(), ClientError>;
    fn revoke_database(
        &self,
        dbms: DbmsType,
        id: &str,
        user: &str,
        database: &str,
    ) -> Result<(), ClientError>;
}

#[derive(Deserialize)]
struct InstanceEnvelope {
    instance: Instance,
}

#[derive(Deserialize)]
struct ClusterEnvelope {
    cluster: DbCluster,
}

#[derive(Deserialize)]
struct RootEnvelope {
    user: RootUser,
}

#[derive(Serialize, Deserialize)]
struct Databases<D> {
    databases: D,
}

#[derive(Serialize, Deserialize)]
struct Users<U> {
    users: U,
}

/// HTTP implementation of [`DatabaseApi`].
#[derive(Debug, Clone)]
pub struct DatabaseClient {
    rest: RestClient,
}

impl DatabaseClient {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

fn dbms_path(dbms: DbmsType, id: &str) -> String {
    format!("{}/{id}", dbms.path_segment())
}

// Database and user names are free text and go into the path encoded.
fn database_path(dbms: DbmsType, id: &str, name: &str) -> String {
    format!("{}/databases/{}", dbms_path(dbms, id), urlencoding::encode(name))
}

fn user_path(dbms: DbmsType, id: &str, user: &str) -> String {
    format!("{}/users/{}", dbms_path(dbms, id), urlencoding::encode(user))
}

impl DatabaseApi for DatabaseClient {
    fn get_instance(&self, id: &str) -> Result<Instance, ClientError> {
        let env: InstanceEnvelope = self.rest.get(&format!("instances/{id}"))?;
        Ok(env.instance)
    }

    fn create_instance(&self, opts: &InstanceCreateOpts) -> Result<Instance, ClientError> {
        debug!(name = %opts.name, "Creating database instance");
        let env: InstanceEnvelope = self.rest.post("instances", &json!({ "instance": opts }))?;
        Ok(env.instance)
    }

    fn delete_instance(&self, id: &str) -> Result<(), ClientError> {
        self.rest.delete(&format!("instances/{id}"))
    }

    fn instance_action(&self, id: &str, action: &InstanceAction) -> Result<(), ClientError> {
        self.rest
            .post_empty(&format!("instances/{id}/action"), &action.body())
    }

    fn detach_replica(&self, id: &str) -> Result<(), ClientError> {
        self.rest.patch(
            &format!("instances/{id}"),
            &json!({ "instance": { "replica_of": "" } }),
        )
    }

    fn set_instance_configuration(
        &self,
        id: &str,
        configuration: Option<&str>,
    ) -> Result<(), ClientError> {
        self.rest.put(
            &format!("instances/{id}"),
            &json!({ "instance": { "configuration": configuration.unwrap_or_default() } }),
        )
    }

    fn update_instance_autoexpand(
        &self,
        id: &str,
        target: AutoExpandTarget,
        settings: &AutoExpand,
    ) -> Result<(), ClientError> {
        let body = match target {
            AutoExpandTarget::Data => json!({ "instance": settings.body() }),
            AutoExpandTarget::Wal => json!({ "instance": { "wal_volume": settings.body() } }),
        };
        self.rest.put(&format!("instances/{id}"), &body)
    }

    fn get_cluster(&self, id: &str) -> Result<DbCluster, ClientError> {
        let env: ClusterEnvelope = self.rest.get(&format!("clusters/{id}"))?;
        Ok(env.cluster)
    }

    fn create_cluster(&self, opts: &DbClusterCreateOpts) -> Result<DbCluster, ClientError> {
        debug!(name = %opts.name, members = opts.instances.len(), "Creating database cluster");
        let env: ClusterEnvelope = self.rest.post("clusters", &opts.body())?;
        Ok(env.cluster)
    }

    fn delete_cluster(&self, id: &str) -> Result<(), ClientError> {
        self.rest.delete(&format!("clusters/{id}"))
    }

    fn cluster_action(&self, id: &str, action: &DbClusterAction) -> Result<(), ClientError> {
        self.rest
            .post_empty(&format!("clusters/{id}/action"), &action.body())
    }

    fn update_cluster_autoexpand(
        &self,
        id: &str,
        settings: &AutoExpand,
    ) -> Result<(), ClientError> {
        self.rest.put(
            &format!("clusters/{id}"),
            &json!({ "cluster": settings.body() }),
        )
    }

    fn enable_root(
        &self,
        dbms: DbmsType,
        id: &str,
        opts: &RootUserEnableOpts,
    ) -> Result<RootUser, ClientError> {
        let env: RootEnvelope = self
            .rest
            .post(&format!("{}/root", dbms_path(dbms, id)), opts)?;
        Ok(env.user)
    }

    fn disable_root(&self, dbms: DbmsType, id: &str) -> Result<(), ClientError> {
        self.rest.delete(&format!("{}/root", dbms_path(dbms, id)))
    }

    fn list_databases(&self, dbms: DbmsType, id: &str) -> Result<Vec<Database>, ClientError> {
        let list: Databases<Vec<Database>> = self
            .rest
            .get(&format!("{}/databases", dbms_path(dbms, id)))?;
        Ok(list.databases)
    }

    fn create_databases(
        &self,
        dbms: DbmsType,
        id: &str,
        databases: &[Database],
    ) -> Result<(), ClientError> {
        self.rest.post_empty(
            &format!("{}/databases", dbms_path(dbms, id)),
            &Databases { databases },
        )
    }

    fn delete_database(&self, dbms: DbmsType, id: &str, name: &str) -> Result<(), ClientError> {
        self.rest.delete(&database_path(dbms, id, name))
    }

    fn list_users(&self, dbms: DbmsType, id: &str) -> Result<Vec<User>, ClientError> {
        let list: Users<Vec<User>> = self.rest.get(&format!("{}/users", dbms_path(dbms, id)))?;
        Ok(list.users)
    }

    fn create_users(
        &self,
        dbms: DbmsType,
        id: &str,
        users: &[UserCreateOpts],
    ) -> Result<(), ClientError> {
        self.rest
            .post_empty(&format!("{}/users", dbms_path(dbms, id)), &Users { users })
    }

    fn update_user(
        &self,
        dbms: DbmsType,
        id: &str,
        name: &str,
        opts: &UserUpdateOpts,
    ) -> Result<(), ClientError> {
        self.rest
            .put(&user_path(dbms, id, name), &json!({ "user": opts }))
    }

    fn delete_user(&self, dbms: DbmsType, id: &str, name: &str) -> Result<(), ClientError> {
        self.rest.delete(&user_path(dbms, id, name))
    }

    fn grant_databases(
        &self,
        dbms: DbmsType,
        id: &str,
        user: &str,
        databases: &[DatabaseRef],
    ) -> Result<(), ClientError> {
        self.rest.put(
            &format!("{}/databases", user_path(dbms, id, user)),
            &Databases { databases },
        )
    }

    fn revoke_database(
        &self,
        dbms: DbmsType,
        id: &str,
        user: &str,
        database: &str,
    ) -> Result<(), ClientError> {
        self.rest.delete(&format!(
            "{}/databases/{}",
            user_path(dbms, id, user),
            urlencoding::encode(database)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_encoded_as_one_segment() {
        assert_eq!(
            user_path(DbmsType::Instance, "inst-1", "a/b"),
            "instances/inst-1/users/a%2Fb"
        );
        assert_eq!(
            database_path(DbmsType::Cluster, "clu-1", "my db"),
            "clusters/clu-1/databases/my%20db"
        );
        assert_eq!(
            user_path(DbmsType::Instance, "inst-1", "app"),
            "instances/inst-1/users/app"
        );
    }
}
