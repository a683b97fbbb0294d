//! Clients for the MCS service APIs.
//!
//! One trait per service category, each with an HTTP implementation over
//! the shared [`RestClient`]:
//! - container-infra: Kubernetes clusters and node groups
//! - database: instances, clusters, databases, users
//! - block-storage: volumes and snapshots

pub mod block_storage;
pub mod container_infra;
pub mod database;
pub mod rest;

pub use block_storage::{BlockStorageApi, BlockStorageClient};
pub use container_infra::{ContainerInfraApi, ContainerInfraClient};
pub use database::{DatabaseApi, DatabaseClient};
pub use rest::RestClient;

use crate::config::{ProviderConfig, ServiceCategory};
use crate::error::ClientError;

/// Hands out region-scoped clients per service category.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    config: ProviderConfig,
}

impl ClientFactory {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    pub fn region(&self) -> &str {
        &self.config.region
    }

    /// Same credentials, another region.
    pub fn for_region(&self, region: impl Into<String>) -> Self {
        let mut config = self.config.clone();
        config.region = region.into();
        Self { config }
    }

    pub fn rest_client(&self, category: ServiceCategory) -> Result<RestClient, ClientError> {
        let base_url = self.config.endpoint(category);
        if base_url.is_empty() {
            return Err(ClientError::Endpoint(format!("no endpoint for {category:?}")));
        }
        let headers: &[(&'static str, &str)] = match category {
            ServiceCategory::ContainerInfra => &[container_infra::API_VERSION_HEADER],
            ServiceCategory::Database | ServiceCategory::BlockStorage => &[],
        };
        RestClient::new(base_url, &self.config, headers)
    }

    pub fn container_infra(&self) -> Result<ContainerInfraClient, ClientError> {
        self.rest_client(ServiceCategory::ContainerInfra)
            .map(ContainerInfraClient::new)
    }

    pub fn database(&self) -> Result<DatabaseClient, ClientError> {
        self.rest_client(ServiceCategory::Database)
            .map(DatabaseClient::new)
    }

    pub fn block_storage(&self) -> Result<BlockStorageClient, ClientError> {
        self.rest_client(ServiceCategory::BlockStorage)
            .map(BlockStorageClient::new)
    }
}
